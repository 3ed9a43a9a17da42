//! Per-student unit sessions.
//!
//! A [`Session`] is a plain value: the engine takes it by value and hands
//! it back from every transition, so there is no shared mutable session
//! state. [`SessionDesk`] parks sessions between requests for callers that
//! serve several students at once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{ProgressionEngine, Reply};
use crate::error::EngineError;
use crate::model::{StudentId, Turn, VocabTerm};

/// Where a session is in the progression state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Prompted,
    WaitingInput,
    Evaluating,
    Advancing,
    Complete,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Init => "init",
            SessionState::Prompted => "prompted",
            SessionState::WaitingInput => "waiting_input",
            SessionState::Evaluating => "evaluating",
            SessionState::Advancing => "advancing",
            SessionState::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// One student's pass through one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub student: StudentId,
    pub unit: String,
    pub started_at: DateTime<Utc>,
    pub(crate) terms: Vec<VocabTerm>,
    pub(crate) current_term_index: usize,
    pub(crate) transcript: Vec<Turn>,
    /// Transcript index of the prompt for the current term.
    pub(crate) term_started_at: usize,
    pub(crate) state: SessionState,
}

impl Session {
    pub(crate) fn new(student: StudentId, unit: String, terms: Vec<VocabTerm>) -> Self {
        Self {
            id: Uuid::new_v4(),
            student,
            unit,
            started_at: Utc::now(),
            terms,
            current_term_index: 0,
            transcript: Vec::new(),
            term_started_at: 0,
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_term_index(&self) -> usize {
        self.current_term_index
    }

    /// The term being asked about, or `None` once the unit is complete.
    pub fn current_term(&self) -> Option<&VocabTerm> {
        self.terms.get(self.current_term_index)
    }

    /// Terms this session walks through, in order.
    pub fn terms(&self) -> &[VocabTerm] {
        &self.terms
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Turns since the current term was prompted.
    pub fn current_exchange(&self) -> &[Turn] {
        let start = self.term_started_at.min(self.transcript.len());
        &self.transcript[start..]
    }

    pub fn remaining(&self) -> usize {
        self.terms.len().saturating_sub(self.current_term_index)
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }
}

/// Summary returned when a session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub unit: String,
    pub terms_total: usize,
    pub terms_mastered: usize,
    pub complete: bool,
}

// ---------------------------------------------------------------------------
// Session desk
// ---------------------------------------------------------------------------

enum Slot {
    Idle(Session),
    Busy,
}

/// Holds one active session per student identity.
///
/// Submitting checks the session out for the duration of the evaluation;
/// a second submission for the same student meanwhile is refused with
/// [`EngineError::SessionBusy`]. Students never share a slot.
#[derive(Default)]
pub struct SessionDesk {
    slots: Mutex<HashMap<StudentId, Slot>>,
}

/// A checked-out slot. Until [`Checkout::finish`] runs, dropping it (for
/// example when the submitting future is cancelled) parks the session as it
/// was before the submission.
struct Checkout<'a> {
    desk: &'a SessionDesk,
    before: Option<Session>,
}

impl Checkout<'_> {
    fn finish(mut self, session: Session) {
        self.before = None;
        self.desk.check_in(session);
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.before.take() {
            tracing::warn!(student = %session.student, "submission abandoned; session restored");
            self.desk.check_in(session);
        }
    }
}

impl SessionDesk {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<StudentId, Slot>> {
        // a panic while holding the lock cannot leave a slot half-written
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Park a session, replacing (and discarding) any previous one for
    /// the same student.
    pub fn insert(&self, session: Session) {
        self.slots()
            .insert(session.student.clone(), Slot::Idle(session));
    }

    /// Take the student's session out, marking the slot busy.
    pub fn check_out(&self, student: &StudentId) -> Result<Session, EngineError> {
        let mut slots = self.slots();
        match slots.remove(student) {
            Some(Slot::Idle(session)) => {
                slots.insert(student.clone(), Slot::Busy);
                Ok(session)
            }
            Some(Slot::Busy) => {
                slots.insert(student.clone(), Slot::Busy);
                Err(EngineError::SessionBusy(student.display_name()))
            }
            None => Err(EngineError::InvalidState {
                action: "submit",
                state: "without an active unit".into(),
            }),
        }
    }

    /// Return a checked-out session. Dropped if the student logged out
    /// while it was busy.
    pub fn check_in(&self, session: Session) {
        let mut slots = self.slots();
        if matches!(slots.get(&session.student), Some(Slot::Busy)) {
            slots.insert(session.student.clone(), Slot::Idle(session));
        }
    }

    /// Remove the student's session (logout or leaving the unit).
    pub fn remove(&self, student: &StudentId) -> Option<Session> {
        match self.slots().remove(student) {
            Some(Slot::Idle(session)) => Some(session),
            _ => None,
        }
    }

    pub fn is_busy(&self, student: &StudentId) -> bool {
        matches!(self.slots().get(student), Some(Slot::Busy))
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    /// Submit an answer for the student's parked session.
    ///
    /// If the returned future is dropped before it completes, the slot is
    /// released and holds the session as it was before this submission.
    pub async fn submit(
        &self,
        engine: &ProgressionEngine,
        student: &StudentId,
        text: &str,
    ) -> Result<Reply, EngineError> {
        let session = self.check_out(student)?;
        let checkout = Checkout {
            desk: self,
            before: Some(session.clone()),
        };
        let transition = engine.submit_response(session, text).await;
        checkout.finish(transition.session);
        Ok(transition.reply)
    }

    /// Move the student's parked session from a fresh prompt to waiting.
    pub fn advance(&self, engine: &ProgressionEngine, student: &StudentId) -> Result<Reply, EngineError> {
        let session = self.check_out(student)?;
        let transition = engine.advance(session);
        self.check_in(transition.session);
        Ok(transition.reply)
    }
}
