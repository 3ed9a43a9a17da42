//! Local and delegated evaluators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::EvaluatorError;
use crate::model::{Speaker, Turn, Verdict, VocabTerm};
use crate::traits::{Evaluation, Evaluator, TutorModel, TutorRequest};

// ---------------------------------------------------------------------------
// Local heuristic
// ---------------------------------------------------------------------------

/// Loose substring check used by [`LocalEvaluator`].
///
/// Both strings are trimmed and lower-cased. The answer counts when the
/// whole answer occurs in the definition, or when any single
/// whitespace-separated word of it does. This accepts answers like "the"
/// for most definitions; that looseness is intended behavior.
pub fn is_loosely_correct(response: &str, definition: &str) -> bool {
    let response = response.trim().to_lowercase();
    let definition = definition.trim().to_lowercase();

    definition.contains(response.as_str())
        || response
            .split_whitespace()
            .any(|token| definition.contains(token))
}

/// Deterministic evaluator that never leaves the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEvaluator;

impl LocalEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous form of [`Evaluator::evaluate`].
    pub fn judge(&self, term: &VocabTerm, response: &str) -> Evaluation {
        if is_loosely_correct(response, &term.definition) {
            Evaluation {
                verdict: Verdict::Mastered,
                feedback: format!(
                    "Great job! '{}' is correct. Let's move to the next word.",
                    term.term
                ),
            }
        } else {
            Evaluation {
                verdict: Verdict::Incorrect,
                feedback: format!(
                    "Not quite. '{}' actually means: {}. Let's talk more. Can you explain how this applies to history?",
                    term.term, term.definition
                ),
            }
        }
    }
}

#[async_trait]
impl Evaluator for LocalEvaluator {
    fn name(&self) -> &str {
        "local"
    }

    async fn evaluate(
        &self,
        term: &VocabTerm,
        transcript: &[Turn],
    ) -> Result<Evaluation, EvaluatorError> {
        let response = latest_student_turn(transcript).unwrap_or_default();
        Ok(self.judge(term, response))
    }
}

fn latest_student_turn(transcript: &[Turn]) -> Option<&str> {
    transcript
        .iter()
        .rev()
        .find(|t| t.speaker == Speaker::Student)
        .map(|t| t.text.as_str())
}

// ---------------------------------------------------------------------------
// Delegated evaluator
// ---------------------------------------------------------------------------

/// Settings for [`DelegatedEvaluator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedConfig {
    /// Phrases that mark a reply as affirming mastery (case-insensitive).
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum number of most recent turns sent with each request.
    #[serde(default = "default_transcript_window")]
    pub transcript_window: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_markers() -> Vec<String> {
    vec![
        "correct".to_string(),
        "you got it".to_string(),
        "let's move on".to_string(),
    ]
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_transcript_window() -> usize {
    8
}
fn default_max_tokens() -> u32 {
    300
}
fn default_temperature() -> f64 {
    0.3
}

impl Default for DelegatedConfig {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            timeout_secs: default_timeout_secs(),
            transcript_window: default_transcript_window(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: None,
        }
    }
}

/// Classify a tutor reply by scanning for affirmation markers.
///
/// Plain substring matching, so "incorrect" also contains "correct". Tutor
/// prompts steer models away from that word when the answer is wrong.
pub fn classify_reply(reply: &str, markers: &[String]) -> Verdict {
    let reply = reply.to_lowercase();
    if markers
        .iter()
        .any(|m| !m.is_empty() && reply.contains(&m.to_lowercase()))
    {
        Verdict::Mastered
    } else {
        Verdict::Partial
    }
}

/// Evaluator that hands the conversation to a [`TutorModel`].
pub struct DelegatedEvaluator {
    tutor: Arc<dyn TutorModel>,
    model: String,
    config: DelegatedConfig,
}

impl DelegatedEvaluator {
    pub fn new(tutor: Arc<dyn TutorModel>, model: impl Into<String>, config: DelegatedConfig) -> Self {
        Self {
            tutor,
            model: model.into(),
            config,
        }
    }

    fn build_request(&self, term: &VocabTerm, transcript: &[Turn]) -> TutorRequest {
        let start = transcript.len().saturating_sub(self.config.transcript_window);
        TutorRequest {
            model: self.model.clone(),
            term: term.term.clone(),
            definition: term.definition.clone(),
            example: term.example.clone(),
            transcript: transcript[start..].to_vec(),
            system_prompt: self.config.system_prompt.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

#[async_trait]
impl Evaluator for DelegatedEvaluator {
    fn name(&self) -> &str {
        self.tutor.name()
    }

    #[instrument(skip(self, term, transcript), fields(term = %term.term))]
    async fn evaluate(
        &self,
        term: &VocabTerm,
        transcript: &[Turn],
    ) -> Result<Evaluation, EvaluatorError> {
        let request = self.build_request(term, transcript);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let reply = tokio::time::timeout(timeout, self.tutor.reply(&request))
            .await
            .map_err(|_| EvaluatorError::Timeout(self.config.timeout_secs))?
            .map_err(|e| EvaluatorError::Transport(format!("{e:#}")))?;

        let content = reply.content.trim();
        if content.is_empty() {
            return Err(EvaluatorError::Malformed("empty reply".into()));
        }

        let verdict = classify_reply(content, &self.config.markers);
        tracing::debug!(%verdict, latency_ms = reply.latency_ms, "tutor replied");

        Ok(Evaluation {
            verdict,
            feedback: reply.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TutorReply;
    use std::sync::Mutex;

    fn doctrine() -> VocabTerm {
        VocabTerm {
            unit: "Unit 1".into(),
            term: "doctrine".into(),
            definition: "a set of beliefs taught by a group".into(),
            example: String::new(),
        }
    }

    #[test]
    fn whole_response_substring_is_correct() {
        assert!(is_loosely_correct("beliefs taught", "A set of beliefs taught by a group"));
        assert!(is_loosely_correct("  BELIEFS ", "a set of beliefs"));
    }

    #[test]
    fn any_token_substring_is_correct() {
        assert!(is_loosely_correct("group rules", "a set of beliefs taught by a group"));
        // loose on purpose: "the" matches inside "theory"
        assert!(is_loosely_correct("the", "a theory"));
    }

    #[test]
    fn unrelated_response_is_incorrect() {
        assert!(!is_loosely_correct("xylophone", "a set of beliefs"));
    }

    #[test]
    fn substring_property_holds_for_every_slice() {
        let definition = "a tax on imported goods";
        for start in 0..definition.len() {
            for end in start + 1..=definition.len() {
                let slice = &definition[start..end];
                assert!(
                    is_loosely_correct(slice, definition),
                    "slice {slice:?} should be correct"
                );
            }
        }
    }

    #[tokio::test]
    async fn local_evaluator_judges_latest_student_turn() {
        let transcript = vec![
            Turn::tutor("What do you think `doctrine` means?"),
            Turn::student("xylophone"),
            Turn::tutor("Not quite."),
            Turn::student("beliefs"),
        ];
        let eval = LocalEvaluator::new()
            .evaluate(&doctrine(), &transcript)
            .await
            .unwrap();
        assert_eq!(eval.verdict, Verdict::Mastered);
        assert!(eval.feedback.contains("Great job"));
    }

    #[tokio::test]
    async fn local_evaluator_miss_repeats_definition() {
        let eval = LocalEvaluator::new()
            .evaluate(&doctrine(), &[Turn::student("xylophone")])
            .await
            .unwrap();
        assert_eq!(eval.verdict, Verdict::Incorrect);
        assert!(eval.feedback.contains("a set of beliefs taught by a group"));
    }

    #[test]
    fn classify_reply_markers() {
        let markers = default_markers();
        assert_eq!(classify_reply("Correct! Nice work.", &markers), Verdict::Mastered);
        assert_eq!(classify_reply("YOU GOT IT", &markers), Verdict::Mastered);
        assert_eq!(classify_reply("Great, let's move on.", &markers), Verdict::Mastered);
        assert_eq!(
            classify_reply("Close. What group taught it?", &markers),
            Verdict::Partial
        );
        assert_eq!(classify_reply("anything", &[]), Verdict::Partial);
    }

    struct StubTutor {
        reply: Option<String>,
        delay: Duration,
        last: Mutex<Option<TutorRequest>>,
    }

    impl StubTutor {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                delay: Duration::ZERO,
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TutorModel for StubTutor {
        fn name(&self) -> &str {
            "stub"
        }

        async fn reply(&self, request: &TutorRequest) -> anyhow::Result<TutorReply> {
            *self.last.lock().unwrap() = Some(request.clone());
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Some(content) => Ok(TutorReply {
                    content: content.clone(),
                    model: request.model.clone(),
                    latency_ms: 1,
                }),
                None => anyhow::bail!("connection refused"),
            }
        }
    }

    #[tokio::test]
    async fn delegated_affirmation_is_mastered_and_verbatim() {
        let tutor = Arc::new(StubTutor::replying("You got it! Let's move on."));
        let evaluator = DelegatedEvaluator::new(tutor, "mock-model", DelegatedConfig::default());
        let eval = evaluator
            .evaluate(&doctrine(), &[Turn::student("shared beliefs")])
            .await
            .unwrap();
        assert_eq!(eval.verdict, Verdict::Mastered);
        assert_eq!(eval.feedback, "You got it! Let's move on.");
    }

    #[tokio::test]
    async fn delegated_without_marker_is_partial() {
        let tutor = Arc::new(StubTutor::replying("Close! Who teaches it?"));
        let evaluator = DelegatedEvaluator::new(tutor, "mock-model", DelegatedConfig::default());
        let eval = evaluator
            .evaluate(&doctrine(), &[Turn::student("rules")])
            .await
            .unwrap();
        assert_eq!(eval.verdict, Verdict::Partial);
    }

    #[tokio::test]
    async fn delegated_sends_only_window() {
        let tutor = Arc::new(StubTutor::replying("Keep going"));
        let config = DelegatedConfig {
            transcript_window: 2,
            ..Default::default()
        };
        let evaluator = DelegatedEvaluator::new(tutor.clone(), "mock-model", config);
        let transcript = vec![
            Turn::tutor("q1"),
            Turn::student("a1"),
            Turn::tutor("q2"),
            Turn::student("a2"),
        ];
        evaluator.evaluate(&doctrine(), &transcript).await.unwrap();

        let sent = tutor.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.transcript, transcript[2..].to_vec());
        assert_eq!(sent.term, "doctrine");
        assert_eq!(sent.model, "mock-model");
    }

    #[tokio::test]
    async fn delegated_transport_failure_is_error() {
        let tutor = Arc::new(StubTutor {
            reply: None,
            delay: Duration::ZERO,
            last: Mutex::new(None),
        });
        let evaluator = DelegatedEvaluator::new(tutor, "m", DelegatedConfig::default());
        let err = evaluator
            .evaluate(&doctrine(), &[Turn::student("beliefs")])
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::Transport(_)));
    }

    #[tokio::test]
    async fn delegated_empty_reply_is_malformed() {
        let tutor = Arc::new(StubTutor::replying("   "));
        let evaluator = DelegatedEvaluator::new(tutor, "m", DelegatedConfig::default());
        let err = evaluator
            .evaluate(&doctrine(), &[Turn::student("beliefs")])
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::Malformed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn delegated_timeout_is_error_not_mastery() {
        let tutor = Arc::new(StubTutor {
            reply: Some("Correct!".into()),
            delay: Duration::from_secs(120),
            last: Mutex::new(None),
        });
        let config = DelegatedConfig {
            timeout_secs: 5,
            ..Default::default()
        };
        let evaluator = DelegatedEvaluator::new(tutor, "m", config);
        let err = evaluator
            .evaluate(&doctrine(), &[Turn::student("beliefs")])
            .await
            .unwrap_err();
        assert_eq!(err, EvaluatorError::Timeout(5));
    }
}
