//! Provider error types.

use thiserror::Error;

/// Errors that can occur when talking to a tutor model backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ProviderError {
    /// Map a transport-level reqwest error.
    pub(crate) fn from_send(e: reqwest::Error, timeout_secs: u64) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(timeout_secs)
        } else {
            ProviderError::NetworkError(e.to_string())
        }
    }
}

/// Build a reqwest client with a request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::Client(e.to_string()))
}

/// Turn non-success HTTP statuses into a [`ProviderError`].
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    match status {
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                * 1000;
            Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            })
        }
        401 | 403 => {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::AuthenticationFailed(body))
        }
        404 => Err(ProviderError::ModelNotFound(model.to_string())),
        s if s >= 400 => {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::ApiError {
                status,
                message: body,
            })
        }
        _ => Ok(response),
    }
}
