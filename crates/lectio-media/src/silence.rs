//! Silence detection for pause-based audio segmentation.
//!
//! Whole-section TTS inserts pauses between narration segments; the split
//! points are recovered by running the audio through ffmpeg's
//! `silencedetect` filter and taking the midpoint of each detected window.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Minimum silence length considered a deliberate pause.
const MIN_SILENCE_DURATION: f64 = 0.3;
/// Detection threshold in dB.
const SILENCE_NOISE_DB: i32 = -35;

static SILENCE_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"silence_start:\s*([\d.]+)").expect("valid regex"));
static SILENCE_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"silence_end:\s*([\d.]+)").expect("valid regex"));

/// One detected silence window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceWindow {
    pub start: f64,
    pub end: f64,
}

impl SilenceWindow {
    /// The split point this window implies.
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// Run silencedetect over `audio_path` and return the midpoints of the
/// detected silence windows, in order.
pub async fn detect_silence_boundaries(audio_path: impl AsRef<Path>) -> MediaResult<Vec<f64>> {
    let cmd = FfmpegCommand::new(audio_path.as_ref(), "/dev/null")
        .log_level("info")
        .audio_filter(format!(
            "silencedetect=noise={SILENCE_NOISE_DB}dB:d={MIN_SILENCE_DURATION}"
        ))
        .output_args(["-f", "null"]);
    let stderr = FfmpegRunner::new().run_capture_stderr(&cmd).await?;
    Ok(parse_silence_output(&stderr)
        .into_iter()
        .map(|w| w.midpoint())
        .collect())
}

/// Parse silencedetect stderr into windows. Unterminated trailing silence
/// (no matching `silence_end`) is dropped.
pub fn parse_silence_output(stderr: &str) -> Vec<SilenceWindow> {
    let mut windows = Vec::new();
    let mut pending_start: Option<f64> = None;

    for line in stderr.lines() {
        if let Some(caps) = SILENCE_START_RE.captures(line) {
            pending_start = caps[1].parse::<f64>().ok();
        } else if let Some(caps) = SILENCE_END_RE.captures(line) {
            if let (Some(start), Ok(end)) = (pending_start.take(), caps[1].parse::<f64>()) {
                if end > start {
                    windows.push(SilenceWindow { start, end });
                }
            }
        }
    }
    windows
}

/// Distribute `total_duration` across `texts` proportionally to character
/// count. Fallback when silence detection under-delivers; the returned
/// durations sum exactly to the total.
pub fn proportional_durations(texts: &[String], total_duration: f64) -> Vec<f64> {
    if texts.is_empty() {
        return Vec::new();
    }
    let total_chars: usize = texts.iter().map(|t| t.chars().count().max(1)).sum();
    let mut durations: Vec<f64> = texts
        .iter()
        .map(|t| total_duration * (t.chars().count().max(1) as f64) / (total_chars as f64))
        .collect();
    // Absorb rounding drift into the final segment.
    let assigned: f64 = durations.iter().take(texts.len() - 1).sum();
    if let Some(last) = durations.last_mut() {
        *last = total_duration - assigned;
    }
    durations
}
