//! Core data model types for mastery.
//!
//! These are the fundamental types shared by the catalog, the ledger, the
//! evaluators, and the progression engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the synthetic review unit sampled from every regular unit.
pub const MILESTONE_UNIT: &str = "Milestone";

/// A normalized student identity.
///
/// Two logins with differently cased or padded names resolve to the same
/// `StudentId`; see [`crate::identity::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId {
    pub first_name: String,
    pub last_name: String,
    pub block: String,
}

impl StudentId {
    /// "First Last", for display only. Different identities can share a
    /// display name, so never key anything on it.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.first_name, self.last_name, self.block)
    }
}

/// A single vocabulary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabTerm {
    /// Unit the term was loaded from (for Milestone terms, the source unit).
    pub unit: String,
    pub term: String,
    pub definition: String,
    #[serde(default)]
    pub example: String,
}

/// A named, ordered set of vocabulary terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub terms: Vec<VocabTerm>,
}

impl Unit {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains_term(&self, term: &str) -> bool {
        self.terms.iter().any(|t| t.term == term)
    }
}

/// Durable fact that a student mastered a term in a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasteryRecord {
    #[serde(flatten)]
    pub student: StudentId,
    pub unit: String,
    pub term: String,
    pub mastered: bool,
    pub timestamp: DateTime<Utc>,
}

/// Last login for a student in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRecord {
    #[serde(flatten)]
    pub student: StudentId,
    pub last_login: DateTime<Utc>,
}

/// Outcome of judging a student's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Mastered,
    Partial,
    Incorrect,
}

impl Verdict {
    pub fn is_mastered(self) -> bool {
        matches!(self, Verdict::Mastered)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Mastered => write!(f, "mastered"),
            Verdict::Partial => write!(f, "partial"),
            Verdict::Incorrect => write!(f, "incorrect"),
        }
    }
}

/// Who said a line of the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Student,
    Tutor,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Student => write!(f, "student"),
            Speaker::Tutor => write!(f, "tutor"),
        }
    }
}

/// One line of a session transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn student(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Student,
            text: text.into(),
        }
    }

    pub fn tutor(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Tutor,
            text: text.into(),
        }
    }
}
