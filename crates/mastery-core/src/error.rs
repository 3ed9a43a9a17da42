//! Error taxonomy for the progression engine.
//!
//! Every failure a student can hit is recovered at the session boundary:
//! the engine hands the session back unchanged and attaches one of these
//! errors, and [`EngineError::user_message`] gives the inline text to show.

use thiserror::Error;

/// The vocabulary source for a unit is missing or corrupt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// No unit with this name exists in the catalog.
    #[error("unit not found: {0}")]
    UnknownUnit(String),

    /// The unit's source failed to load; other units are unaffected.
    #[error("unit '{unit}' is unavailable: {reason}")]
    Unavailable { unit: String, reason: String },

    /// A catalog file could not be read or parsed.
    #[error("failed to load catalog source {source_path}: {reason}")]
    Source { source_path: String, reason: String },
}

/// The evaluator could not produce a verdict.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluatorError {
    #[error("evaluator timed out after {0}s")]
    Timeout(u64),

    #[error("evaluator unreachable: {0}")]
    Transport(String),

    #[error("evaluator returned a malformed reply: {0}")]
    Malformed(String),
}

/// A ledger read or write failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt ledger record at {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Missing or invalid input from the student.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("unknown block '{given}', expected one of: {}", .allowed.join(", "))]
    UnknownBlock { given: String, allowed: Vec<String> },

    #[error("answer is empty")]
    EmptyAnswer,
}

/// Errors surfaced by the progression engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The event is not accepted in the session's current state.
    #[error("cannot {action} while session is {state}")]
    InvalidState { action: &'static str, state: String },

    /// Another submission for this session is still being evaluated.
    #[error("a submission for {0} is already in progress")]
    SessionBusy(String),
}

impl EngineError {
    /// Short inline message for the student, specific to the error kind.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Catalog(CatalogError::UnknownUnit(unit)) => {
                format!("There is no unit called '{unit}'. Pick another unit.")
            }
            EngineError::Catalog(CatalogError::Unavailable { unit, .. }) => {
                format!("The word list for '{unit}' could not be loaded. Pick another unit.")
            }
            EngineError::Catalog(CatalogError::Source { .. }) => {
                "The vocabulary list could not be loaded.".to_string()
            }
            EngineError::Evaluator(_) => {
                "I couldn't check that answer just now. Please try again.".to_string()
            }
            EngineError::Persistence(_) => {
                "Your progress could not be saved. Please answer again so we can retry."
                    .to_string()
            }
            EngineError::Validation(ValidationError::MissingField(field)) => {
                format!("Please enter your {field}.")
            }
            EngineError::Validation(ValidationError::UnknownBlock { allowed, .. }) => {
                format!("Please choose your block: {}.", allowed.join(", "))
            }
            EngineError::Validation(ValidationError::EmptyAnswer) => {
                "Type an answer before submitting.".to_string()
            }
            EngineError::InvalidState { .. } => {
                "That action isn't available right now.".to_string()
            }
            EngineError::SessionBusy(_) => {
                "Still checking your last answer. Hold on a moment.".to_string()
            }
        }
    }

    /// Returns `true` if the student can simply try the same action again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Evaluator(_) | EngineError::Persistence(_) | EngineError::SessionBusy(_)
        )
    }
}
