//! Scripted tutor for tests and offline demos.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use mastery_core::traits::{TutorModel, TutorReply, TutorRequest};

/// One scripted step.
#[derive(Debug, Clone)]
pub enum MockStep {
    Reply(String),
    Fail(String),
}

/// A tutor that plays back scripted replies without network access.
///
/// Steps are consumed in order; once the script runs out every call gets
/// the default reply.
pub struct MockTutor {
    script: Mutex<VecDeque<MockStep>>,
    default_reply: String,
    delay: Option<Duration>,
    call_count: AtomicU32,
    last_request: Mutex<Option<TutorRequest>>,
}

impl MockTutor {
    pub fn new(script: Vec<MockStep>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default_reply: "Not quite. What else do you know about it?".to_string(),
            delay: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A mock that always returns the same reply.
    pub fn with_fixed_reply(reply: &str) -> Self {
        Self::new(vec![]).default_reply(reply)
    }

    /// Replies played in order before falling back to the default.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| MockStep::Reply(r.into())).collect())
    }

    pub fn default_reply(mut self, reply: &str) -> Self {
        self.default_reply = reply.to_string();
        self
    }

    /// Sleep before answering, to exercise evaluator timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<TutorRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl TutorModel for MockTutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn reply(&self, request: &TutorRequest) -> anyhow::Result<TutorReply> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match step {
            Some(MockStep::Fail(message)) => anyhow::bail!("{message}"),
            Some(MockStep::Reply(content)) => Ok(TutorReply {
                content,
                model: request.model.clone(),
                latency_ms: 1,
            }),
            None => Ok(TutorReply {
                content: self.default_reply.clone(),
                model: request.model.clone(),
                latency_ms: 1,
            }),
        }
    }
}
