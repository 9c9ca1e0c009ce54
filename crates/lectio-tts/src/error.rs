//! TTS error types.

use thiserror::Error;

pub type TtsResult<T> = Result<T, TtsError>;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("TTS provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TTS provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("No audio in TTS response")]
    NoAudio,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio conversion failed: {0}")]
    Conversion(#[from] lectio_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TtsError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
