//! The TTS engine seam.

use async_trait::async_trait;
use std::path::Path;
use tracing::warn;

use crate::error::TtsResult;

/// Speech synthesis backend.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Synthesize `text` into `output_path` and return the measured
    /// duration in seconds.
    async fn synthesize(&self, text: &str, output_path: &Path, voice: &str) -> TtsResult<f64>;

    /// Whether this engine can synthesize a whole section in one call with
    /// pause markers between segments.
    fn whole_section_tts(&self) -> bool {
        false
    }
}

/// Synthesize with a placeholder-silence fallback.
///
/// A provider failure degrades to silent audio of the estimated duration
/// (≈0.4 s/word, min 1 s) so downstream timing still works.
pub async fn synthesize_with_fallback(
    engine: &dyn TtsEngine,
    text: &str,
    output_path: &Path,
    voice: &str,
) -> f64 {
    match engine.synthesize(text, output_path, voice).await {
        Ok(duration) => duration,
        Err(e) => {
            warn!(
                error = %e,
                output = %output_path.display(),
                "TTS failed, generating placeholder silence"
            );
            match lectio_media::generate_placeholder_silence(text, output_path).await {
                Ok(duration) => duration,
                Err(media_err) => {
                    warn!(error = %media_err, "Placeholder generation failed too");
                    lectio_media::audio::estimate_speech_duration(text)
                }
            }
        }
    }
}

#[cfg(test)]
pub mod test_support {
    //! A scripted engine for section-worker tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine that "synthesizes" by writing a stub file and returning a
    /// fixed per-call duration.
    pub struct FakeTtsEngine {
        pub whole_section: bool,
        pub duration_per_call: f64,
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl FakeTtsEngine {
        pub fn new(whole_section: bool, duration_per_call: f64) -> Self {
            Self {
                whole_section,
                duration_per_call,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                whole_section: false,
                duration_per_call: 0.0,
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TtsEngine for FakeTtsEngine {
        async fn synthesize(
            &self,
            _text: &str,
            output_path: &Path,
            _voice: &str,
        ) -> TtsResult<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(crate::error::TtsError::NoAudio);
            }
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(output_path, b"audio")?;
            Ok(self.duration_per_call)
        }

        fn whole_section_tts(&self) -> bool {
            self.whole_section
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeTtsEngine;
    use super::*;

    #[tokio::test]
    async fn test_fake_engine_writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = FakeTtsEngine::new(false, 3.5);
        let path = tmp.path().join("seg.mp3");
        let duration = engine.synthesize("hello", &path, "Charon").await.unwrap();
        assert!((duration - 3.5).abs() < f64::EPSILON);
        assert!(path.exists());
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_estimates_duration_when_everything_fails() {
        // No ffmpeg interaction is guaranteed here; the word-count estimate
        // is the last resort either way.
        let tmp = tempfile::tempdir().unwrap();
        let engine = FakeTtsEngine::failing();
        let duration = synthesize_with_fallback(
            &engine,
            "one two three four five",
            &tmp.path().join("x.mp3"),
            "Charon",
        )
        .await;
        assert!(duration >= 1.0);
    }
}
