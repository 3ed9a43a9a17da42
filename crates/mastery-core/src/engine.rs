//! Progression engine.
//!
//! Drives a [`Session`] through a unit one term at a time:
//!
//! ```text
//! INIT -> PROMPTED -> WAITING_INPUT -> EVALUATING -> WAITING_INPUT (not yet)
//!                                                 -> ADVANCING -> PROMPTED | COMPLETE
//! ```
//!
//! Every handler takes the session by value and returns it inside a
//! [`Transition`]. Failures never advance the session; they come back as
//! [`Reply::error`] with the session left on the same term.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::catalog::VocabCatalog;
use crate::error::{EngineError, PersistenceError, ValidationError};
use crate::identity;
use crate::model::{StudentId, Turn, VocabTerm, MILESTONE_UNIT};
use crate::sampling::MilestoneConfig;
use crate::session::{Session, SessionState, SessionSummary};
use crate::traits::{Evaluator, MasteryLedger};

/// Shown in place of evaluator feedback when the evaluator fails.
pub const RETRY_MESSAGE: &str = "I couldn't check that answer just now. Please try again.";

/// Shown when the mastery record could not be saved.
pub const SAVE_FAILED_MESSAGE: &str =
    "Your answer was right, but your progress could not be saved. Please answer again.";

/// Shown when the last term of a unit is mastered.
pub const COMPLETE_MESSAGE: &str = "You've completed all words in this unit!";

/// The question asked for each term.
pub fn prompt_for(term: &VocabTerm) -> String {
    format!("What do you think `{}` means?", term.term)
}

/// Configuration for the progression engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ask again about terms the student already mastered.
    #[serde(default)]
    pub retest_mastered: bool,
    /// Extra attempts when a ledger write fails.
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,
    /// First backoff delay between ledger write attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Blocks a student may log in under; empty accepts any. Set from the
    /// top-level `blocks` config key rather than the `[engine]` table.
    #[serde(skip)]
    pub blocks: Vec<String>,
    /// Set from the top-level `[milestone]` table.
    #[serde(skip)]
    pub milestone: MilestoneConfig,
}

fn default_persist_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    200
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retest_mastered: false,
            persist_retries: default_persist_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            blocks: identity::DEFAULT_BLOCKS.iter().map(|b| b.to_string()).collect(),
            milestone: MilestoneConfig::default(),
        }
    }
}

/// What the caller shows after a transition.
#[derive(Debug, Default)]
pub struct Reply {
    /// Tutor text responding to the student's last action.
    pub feedback_text: String,
    /// True when this transition committed a mastery record.
    pub mastered: bool,
    /// Question to show next, if the student is now being asked one.
    pub prompt: Option<String>,
    /// True once every term in the unit is done.
    pub complete: bool,
    /// Set when the transition could not go ahead.
    pub error: Option<EngineError>,
}

impl Reply {
    fn rejected(error: EngineError) -> Self {
        Self {
            feedback_text: error.user_message(),
            error: Some(error),
            ..Default::default()
        }
    }
}

/// A session plus the reply produced by moving it.
#[derive(Debug)]
pub struct Transition {
    pub session: Session,
    pub reply: Reply,
}

/// The progression engine.
pub struct ProgressionEngine {
    catalog: Arc<VocabCatalog>,
    ledger: Arc<dyn MasteryLedger>,
    evaluator: Arc<dyn Evaluator>,
    config: EngineConfig,
}

impl ProgressionEngine {
    pub fn new(
        catalog: Arc<VocabCatalog>,
        ledger: Arc<dyn MasteryLedger>,
        evaluator: Arc<dyn Evaluator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            ledger,
            evaluator,
            config,
        }
    }

    pub fn catalog(&self) -> &VocabCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Normalize login fields and record the login.
    pub async fn login(
        &self,
        first_name: &str,
        last_name: &str,
        block: &str,
    ) -> Result<StudentId, EngineError> {
        let student = identity::normalize(first_name, last_name, block, &self.config.blocks)?;
        let now = Utc::now();
        self.with_retries("record login", || self.ledger.record_login(&student, now))
        .await?;
        tracing::info!(student = %student, "logged in");
        Ok(student)
    }

    /// Term sequence for a unit: catalog order, or the Milestone sample.
    pub fn term_sequence(&self, student: &StudentId, unit: &str) -> Result<Vec<VocabTerm>, EngineError> {
        if unit == MILESTONE_UNIT {
            Ok(self.config.milestone.sample(&self.catalog, student))
        } else {
            Ok(self.catalog.unit(unit)?.terms.clone())
        }
    }

    /// Enter a unit. Already-mastered terms are skipped unless
    /// `retest_mastered` is set; a unit with nothing left starts complete.
    pub async fn start_unit(&self, student: &StudentId, unit: &str) -> Result<Transition, EngineError> {
        let mut terms = self.term_sequence(student, unit)?;

        if !self.config.retest_mastered {
            let mastered = self
                .ledger
                .mastered_terms(student, unit)
                .await?;
            terms.retain(|t| !mastered.contains(&t.term));
        }

        let mut session = Session::new(student.clone(), unit.to_string(), terms);
        tracing::info!(
            student = %student,
            unit,
            remaining = session.terms.len(),
            "starting unit"
        );

        if session.terms.is_empty() {
            session.state = SessionState::Complete;
            session.transcript.push(Turn::tutor(COMPLETE_MESSAGE));
            return Ok(Transition {
                session,
                reply: Reply {
                    feedback_text: COMPLETE_MESSAGE.to_string(),
                    complete: true,
                    ..Default::default()
                },
            });
        }

        let prompt = Self::prompt_current(&mut session);
        session.state = SessionState::WaitingInput;
        Ok(Transition {
            session,
            reply: Reply {
                prompt: Some(prompt),
                ..Default::default()
            },
        })
    }

    /// Put the current term's question into the transcript.
    fn prompt_current(session: &mut Session) -> String {
        let prompt = session
            .current_term()
            .map(prompt_for)
            .unwrap_or_default();
        session.term_started_at = session.transcript.len();
        session.transcript.push(Turn::tutor(prompt.clone()));
        session.state = SessionState::Prompted;
        prompt
    }

    /// Move from a freshly shown prompt to waiting for the answer.
    pub fn advance(&self, mut session: Session) -> Transition {
        if session.state != SessionState::Prompted {
            let error = EngineError::InvalidState {
                action: "advance",
                state: session.state.to_string(),
            };
            return Transition {
                session,
                reply: Reply::rejected(error),
            };
        }
        session.state = SessionState::WaitingInput;
        let prompt = session.current_term().map(prompt_for);
        Transition {
            session,
            reply: Reply {
                prompt,
                ..Default::default()
            },
        }
    }

    /// Judge an answer for the current term.
    pub async fn submit_response(&self, mut session: Session, text: &str) -> Transition {
        if session.state != SessionState::WaitingInput {
            let error = EngineError::InvalidState {
                action: "submit an answer",
                state: session.state.to_string(),
            };
            return Transition {
                session,
                reply: Reply::rejected(error),
            };
        }
        if text.trim().is_empty() {
            return Transition {
                session,
                reply: Reply::rejected(ValidationError::EmptyAnswer.into()),
            };
        }
        let Some(term) = session.current_term().cloned() else {
            session.state = SessionState::Complete;
            return Transition {
                session,
                reply: Reply {
                    complete: true,
                    ..Default::default()
                },
            };
        };

        session.transcript.push(Turn::student(text));
        session.state = SessionState::Evaluating;

        let evaluation = self
            .evaluator
            .evaluate(&term, session.current_exchange())
            .await;

        let evaluation = match evaluation {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::warn!(
                    student = %session.student,
                    term = %term.term,
                    evaluator = self.evaluator.name(),
                    "evaluation failed: {e}"
                );
                session.transcript.push(Turn::tutor(RETRY_MESSAGE));
                session.state = SessionState::WaitingInput;
                return Transition {
                    session,
                    reply: Reply {
                        feedback_text: RETRY_MESSAGE.to_string(),
                        error: Some(e.into()),
                        ..Default::default()
                    },
                };
            }
        };

        if !evaluation.verdict.is_mastered() {
            session.transcript.push(Turn::tutor(evaluation.feedback.clone()));
            session.state = SessionState::WaitingInput;
            return Transition {
                session,
                reply: Reply {
                    feedback_text: evaluation.feedback,
                    ..Default::default()
                },
            };
        }

        let now = Utc::now();
        let committed = self
            .with_retries("record mastery", || {
                self.ledger
                    .record_mastery(&session.student, &session.unit, &term.term, now)
            })
            .await;

        if let Err(e) = committed {
            tracing::error!(
                student = %session.student,
                unit = %session.unit,
                term = %term.term,
                "mastery not saved: {e}"
            );
            session.transcript.push(Turn::tutor(SAVE_FAILED_MESSAGE));
            session.state = SessionState::WaitingInput;
            return Transition {
                session,
                reply: Reply {
                    feedback_text: SAVE_FAILED_MESSAGE.to_string(),
                    error: Some(e.into()),
                    ..Default::default()
                },
            };
        }

        tracing::info!(
            student = %session.student,
            unit = %session.unit,
            term = %term.term,
            "term mastered"
        );
        session.transcript.push(Turn::tutor(evaluation.feedback.clone()));
        session.state = SessionState::Advancing;
        session.current_term_index += 1;

        if session.current_term_index < session.terms.len() {
            let prompt = Self::prompt_current(&mut session);
            Transition {
                session,
                reply: Reply {
                    feedback_text: evaluation.feedback,
                    mastered: true,
                    prompt: Some(prompt),
                    ..Default::default()
                },
            }
        } else {
            session.transcript.push(Turn::tutor(COMPLETE_MESSAGE));
            session.state = SessionState::Complete;
            Transition {
                session,
                reply: Reply {
                    feedback_text: evaluation.feedback,
                    mastered: true,
                    complete: true,
                    ..Default::default()
                },
            }
        }
    }

    /// End a session (logout, leaving the unit, or after completion).
    pub fn end_session(&self, session: Session) -> SessionSummary {
        let summary = SessionSummary {
            unit: session.unit.clone(),
            terms_total: session.terms.len(),
            terms_mastered: session.current_term_index,
            complete: session.is_complete(),
        };
        tracing::info!(
            student = %session.student,
            unit = %summary.unit,
            mastered = summary.terms_mastered,
            total = summary.terms_total,
            "session ended"
        );
        summary
    }

    /// Run a ledger operation, retrying with exponential backoff.
    async fn with_retries<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, PersistenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PersistenceError>>,
    {
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.persist_retries => {
                    attempt += 1;
                    tracing::warn!("{what} failed (attempt {attempt}): {e}");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(5));
                }
                Err(e) => return Err(e),
            }
        }
    }
}
