//! Anthropic Messages API tutor.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use mastery_core::traits::{
    render_tutor_prompt, TutorModel, TutorReply, TutorRequest, DEFAULT_TUTOR_PROMPT,
};

use crate::error::{check_status, http_client, ProviderError};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const API_VERSION: &str = "2023-06-01";

/// Tutor backed by the Anthropic Messages API.
pub struct AnthropicTutor {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicTutor {
    pub fn new(api_key: &str, base_url: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: http_client(DEFAULT_TIMEOUT_SECS)?,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    system: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl TutorModel for AnthropicTutor {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, request), fields(model = %request.model, term = %request.term))]
    async fn reply(&self, request: &TutorRequest) -> anyhow::Result<TutorReply> {
        let start = Instant::now();

        let body = MessagesRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_TUTOR_PROMPT.to_string()),
            messages: vec![Message {
                role: "user",
                content: render_tutor_prompt(request),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_send(e, DEFAULT_TIMEOUT_SECS))?;

        let response = match check_status(response, &request.model).await {
            Err(ProviderError::ApiError { status, message }) => {
                let message = serde_json::from_str::<ErrorEnvelope>(&message)
                    .map(|e| e.error.message)
                    .unwrap_or(message);
                return Err(ProviderError::ApiError { status, message }.into());
            }
            other => other?,
        };

        let api_response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = api_response
            .content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(TutorReply {
            content,
            model: api_response.model,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
