//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Script generation failed: {0}")]
    ScriptFailed(String),

    #[error("Section {index} failed: {message}")]
    SectionFailed { index: usize, message: String },

    #[error("Composite failed: {0}")]
    CompositeFailed(String),

    #[error("Runtime check failed: {0}")]
    RuntimeCheck(String),

    #[error("Store error: {0}")]
    Store(#[from] lectio_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] lectio_media::MediaError),

    #[error("LLM error: {0}")]
    Llm(#[from] lectio_llm::LlmError),

    #[error("Animation error: {0}")]
    Anim(#[from] lectio_anim::AnimError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn section_failed(index: usize, message: impl Into<String>) -> Self {
        Self::SectionFailed {
            index,
            message: message.into(),
        }
    }

    /// One human-readable sentence for the job's `message` field.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
