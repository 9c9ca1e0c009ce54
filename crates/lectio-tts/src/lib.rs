//! Text-to-speech adapter.
//!
//! [`TtsEngine`] is the seam the section worker talks to: synthesize text
//! to a file and report the measured duration, plus a capability flag for
//! whole-section synthesis. The Gemini engine sits behind a token-bucket
//! RPM limiter; provider failures degrade to placeholder silence so the
//! pipeline still produces a timed video.

pub mod clean;
pub mod engine;
pub mod error;
pub mod gemini;

pub use clean::{clean_narration_for_tts, join_segments_with_pauses, PAUSE_MARKER};
pub use engine::{synthesize_with_fallback, TtsEngine};
pub use error::{TtsError, TtsResult};
pub use gemini::GeminiTtsEngine;
