//! LLM error types.

use thiserror::Error;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Empty response from model {model}")]
    EmptyResponse { model: String },

    #[error("Failed to parse model output: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("All retries exhausted: {0}")]
    Exhausted(String),
}

impl LlmError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Transient failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::Timeout(_) | LlmError::EmptyResponse { .. } => true,
            LlmError::Provider { status, .. } => {
                *status == 429 || *status == 500 || *status == 502 || *status == 503
            }
            _ => false,
        }
    }

    /// The provider rejected the structured-output schema. Detected by
    /// message substrings, as the provider has no dedicated error code.
    pub fn is_schema_incompatible(&self) -> bool {
        let msg = self.to_string().to_lowercase();
        msg.contains("response_schema") || msg.contains("additional_properties")
    }
}
