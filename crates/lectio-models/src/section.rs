//! Section-level processing records.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Exact timing for one synthesized narration segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentAudio {
    pub segment_index: usize,
    pub text: String,
    /// Per-segment audio file, when the section audio was split
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    /// Measured duration in seconds
    pub duration: f64,
    /// Offset from section start
    pub start_time: f64,
    pub end_time: f64,
}

/// What a section worker hands back to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionMediaResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    pub segments: Vec<SegmentAudio>,
    pub total_duration: f64,
}

impl SectionMediaResult {
    /// A section is usable only when both media files materialized.
    pub fn is_complete(&self) -> bool {
        self.video_path.is_some() && self.audio_path.is_some()
    }

    pub fn empty() -> Self {
        Self {
            video_path: None,
            audio_path: None,
            segments: Vec::new(),
            total_duration: 0.0,
        }
    }
}

/// Live per-section state written to `sections/<i>/status.json`.
///
/// Single-writer (the section's worker). Readers must tolerate a missing or
/// partially written file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SectionStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub audio_ready: bool,
    #[serde(default)]
    pub video_ready: bool,
}

impl SectionStatus {
    pub fn phase(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_result_completeness() {
        let mut result = SectionMediaResult::empty();
        assert!(!result.is_complete());

        result.video_path = Some(PathBuf::from("a.mp4"));
        assert!(!result.is_complete());

        result.audio_path = Some(PathBuf::from("a.mp3"));
        assert!(result.is_complete());
    }

    #[test]
    fn test_section_status_tolerates_partial_json() {
        let status: SectionStatus = serde_json::from_str("{\"phase\": \"audio\"}").unwrap();
        assert_eq!(status.phase, "audio");
        assert_eq!(status.attempt, 0);
        assert!(!status.video_ready);
    }
}
