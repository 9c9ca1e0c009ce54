//! Refiner error taxonomy.

use thiserror::Error;

pub type AnimResult<T> = Result<T, AnimError>;

#[derive(Debug, Error)]
pub enum AnimError {
    /// Stage 1 could not produce a usable plan.
    #[error("Choreography failed: {0}")]
    Choreography(String),

    /// Stage 2 yielded empty or structurally unusable code.
    #[error("Implementation failed: {0}")]
    Implementation(String),

    /// Stage 3 could not stabilize the scene within the attempt budget.
    #[error("Refinement failed: {0}")]
    Refinement(String),

    /// The renderer timed out, exited non-zero, or produced no output.
    #[error("Rendering failed: {0}")]
    Rendering(String),

    #[error("LLM error: {0}")]
    Llm(#[from] lectio_llm::LlmError),

    #[error("Media error: {0}")]
    Media(#[from] lectio_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnimError {
    pub fn choreography(msg: impl Into<String>) -> Self {
        Self::Choreography(msg.into())
    }

    pub fn implementation(msg: impl Into<String>) -> Self {
        Self::Implementation(msg.into())
    }

    pub fn refinement(msg: impl Into<String>) -> Self {
        Self::Refinement(msg.into())
    }

    pub fn rendering(msg: impl Into<String>) -> Self {
        Self::Rendering(msg.into())
    }

    /// Stage errors that the outer retry loop may absorb by re-running the
    /// pipeline at a higher temperature.
    pub fn is_stage_retryable(&self) -> bool {
        matches!(
            self,
            AnimError::Choreography(_)
                | AnimError::Implementation(_)
                | AnimError::Rendering(_)
                | AnimError::Llm(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_retryability() {
        assert!(AnimError::choreography("x").is_stage_retryable());
        assert!(AnimError::rendering("x").is_stage_retryable());
        assert!(!AnimError::refinement("x").is_stage_retryable());
    }
}
