use thiserror::Error;

/// Outcome classification for every outbound provider call.
///
/// Callers decide whether to surface or retry; nothing in this workspace
/// retries automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network failure, timeout, HTTP 429 or 5xx.
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// Any other non-2xx answer.
    #[error("Provider rejected request (HTTP {status}): {body}")]
    Permanent { status: u16, body: String },

    /// 2xx answer whose body could not be decoded.
    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Missing callback parameter: {0}")]
    MissingParameter(&'static str),

    #[error("OAuth state does not match the pending authorization")]
    StateMismatch,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Operation not supported by {0}")]
    Unsupported(&'static str),
}

impl ProviderError {
    /// Map a non-success HTTP status to a transient or permanent failure.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == 429 || status >= 500 {
            ProviderError::Transient(format!("HTTP {}: {}", status, body))
        } else {
            ProviderError::Permanent { status, body }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// 401/403 from the provider, usually an expired or revoked token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ProviderError::Permanent { status: 401, .. }
                | ProviderError::Permanent { status: 403, .. }
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::from_status(status.as_u16(), err.to_string())
        } else {
            ProviderError::Transient(err.to_string())
        }
    }
}

/// Turn a non-2xx response into a classified error, passing successes through.
pub async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status.as_u16(), body))
}
