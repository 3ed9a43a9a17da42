//! Core trait definitions for evaluators, tutor models, and the ledger.
//!
//! The progression engine depends only on these traits. Tutor models are
//! implemented by the `mastery-providers` crate; evaluators and ledgers
//! ship with this crate.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EvaluatorError, PersistenceError};
use crate::model::{LoginRecord, MasteryRecord, StudentId, Turn, Verdict, VocabTerm};

// ---------------------------------------------------------------------------
// Evaluator trait
// ---------------------------------------------------------------------------

/// A verdict plus the text shown back to the student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub feedback: String,
}

/// Judges whether a student's answers show understanding of a term.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Short name used in logs (e.g. "local").
    fn name(&self) -> &str;

    /// Judge the transcript for `term`. The last student turn is the answer
    /// being judged; earlier turns are conversation context.
    async fn evaluate(
        &self,
        term: &VocabTerm,
        transcript: &[Turn],
    ) -> Result<Evaluation, EvaluatorError>;
}

// ---------------------------------------------------------------------------
// Tutor model trait
// ---------------------------------------------------------------------------

/// Structured request sent to a natural-language tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorRequest {
    /// Model identifier (e.g. "gpt-4.1-mini").
    pub model: String,
    pub term: String,
    pub definition: String,
    #[serde(default)]
    pub example: String,
    /// Conversation about the current term, oldest first.
    #[serde(default)]
    pub transcript: Vec<Turn>,
    /// Optional system prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Free-text reply from a tutor model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorReply {
    pub content: String,
    /// Model that actually answered.
    pub model: String,
    pub latency_ms: u64,
}

/// External natural-language collaborator that converses about a term.
#[async_trait]
pub trait TutorModel: Send + Sync {
    /// Human-readable backend name (e.g. "openai").
    fn name(&self) -> &str;

    async fn reply(&self, request: &TutorRequest) -> anyhow::Result<TutorReply>;
}

/// Default system prompt for tutor models.
pub const DEFAULT_TUTOR_PROMPT: &str = "You are a patient U.S. history vocabulary tutor talking with a student about one term. You are given the term, its definition, an example sentence, and the conversation so far. If the student's latest answer shows they understand the term, say \"Correct\" and \"Let's move on\". Otherwise do not use the word correct; give a short hint or ask a guiding question. Keep replies under three sentences.";

/// Render a tutor request as a single user message for chat-style APIs.
pub fn render_tutor_prompt(request: &TutorRequest) -> String {
    let mut prompt = format!(
        "Term: {}\nDefinition: {}\n",
        request.term, request.definition
    );
    if !request.example.is_empty() {
        prompt.push_str(&format!("Example: {}\n", request.example));
    }
    prompt.push_str("\nConversation so far:\n");
    for turn in &request.transcript {
        prompt.push_str(&format!("{}: {}\n", turn.speaker, turn.text));
    }
    prompt
}

// ---------------------------------------------------------------------------
// Ledger trait
// ---------------------------------------------------------------------------

/// Everything in the ledger at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub records: Vec<MasteryRecord>,
    pub logins: Vec<LoginRecord>,
}

/// Durable store of mastery facts and logins.
///
/// Writes are upserts keyed by `(student, unit, term)` for mastery and by
/// `student` for logins, where `student` is the full normalized identity
/// (first name, last name, block). A write for one key never affects a
/// different key.
#[async_trait]
pub trait MasteryLedger: Send + Sync {
    /// Mark a term mastered. Idempotent; the stored timestamp is the later
    /// of the existing and the new one.
    async fn record_mastery(
        &self,
        student: &StudentId,
        unit: &str,
        term: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MasteryRecord, PersistenceError>;

    /// Terms the student has mastered in a unit.
    async fn mastered_terms(
        &self,
        student: &StudentId,
        unit: &str,
    ) -> Result<BTreeSet<String>, PersistenceError>;

    /// All of a student's records keyed by `(unit, term)`.
    async fn all_records(
        &self,
        student: &StudentId,
    ) -> Result<BTreeMap<(String, String), MasteryRecord>, PersistenceError>;

    /// Upsert the student's last login.
    async fn record_login(
        &self,
        student: &StudentId,
        timestamp: DateTime<Utc>,
    ) -> Result<LoginRecord, PersistenceError>;

    /// Read every record and login, for reporting.
    async fn snapshot(&self) -> Result<LedgerSnapshot, PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_term_context_and_transcript() {
        let request = TutorRequest {
            model: "m".into(),
            term: "doctrine".into(),
            definition: "a set of beliefs taught by a group".into(),
            example: "The Monroe Doctrine".into(),
            transcript: vec![
                Turn::tutor("What do you think `doctrine` means?"),
                Turn::student("rules?"),
            ],
            system_prompt: None,
            max_tokens: 200,
            temperature: 0.2,
        };
        let prompt = render_tutor_prompt(&request);
        assert!(prompt.starts_with("Term: doctrine\n"));
        assert!(prompt.contains("Example: The Monroe Doctrine"));
        assert!(prompt.contains("student: rules?"));
        assert!(prompt.contains("tutor: What do you think"));
    }

    #[test]
    fn prompt_omits_missing_example() {
        let request = TutorRequest {
            model: "m".into(),
            term: "tariff".into(),
            definition: "a tax on imports".into(),
            example: String::new(),
            transcript: vec![],
            system_prompt: None,
            max_tokens: 200,
            temperature: 0.2,
        };
        assert!(!render_tutor_prompt(&request).contains("Example:"));
    }
}
