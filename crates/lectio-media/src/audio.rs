//! Audio slicing, stitching, and placeholder synthesis.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::concat::build_concat_list;
use crate::error::{MediaError, MediaResult};

/// Extract `[start, end)` from `input` into `output` with stream copy.
pub async fn slice_audio(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start: f64,
    end: f64,
) -> MediaResult<()> {
    if end <= start {
        return Err(MediaError::InvalidMedia(format!(
            "invalid slice window {start:.2}..{end:.2}"
        )));
    }
    let cmd = FfmpegCommand::new(input.as_ref(), output.as_ref())
        .seek(start)
        .duration(end - start)
        .codec_copy();
    FfmpegRunner::new().run(&cmd).await
}

/// Concatenate audio files into `output` via the concat demuxer.
pub async fn concatenate_audio(inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
    if inputs.is_empty() {
        return Err(MediaError::InvalidMedia(
            "no input audio to concatenate".to_string(),
        ));
    }
    for input in inputs {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.clone()));
        }
    }

    let list_path = output.with_extension("concat.txt");
    tokio::fs::write(&list_path, build_concat_list(inputs)).await?;

    let cmd = FfmpegCommand::new(&list_path, output)
        .input_args(["-f", "concat", "-safe", "0"])
        .codec_copy();
    let result = FfmpegRunner::new().run(&cmd).await;
    tokio::fs::remove_file(&list_path).await.ok();
    result
}

/// Words-per-second rate used to estimate placeholder durations.
const PLACEHOLDER_SECONDS_PER_WORD: f64 = 0.4;
const PLACEHOLDER_MIN_SECONDS: f64 = 1.0;

/// Estimated spoken duration for `text` when synthesis is unavailable.
pub fn estimate_speech_duration(text: &str) -> f64 {
    let words = text.split_whitespace().count();
    (words as f64 * PLACEHOLDER_SECONDS_PER_WORD).max(PLACEHOLDER_MIN_SECONDS)
}

/// Write silent audio of the estimated duration for `text`. Used when the
/// TTS provider fails so the pipeline can still produce a timed video.
pub async fn generate_placeholder_silence(text: &str, output: &Path) -> MediaResult<f64> {
    let duration = estimate_speech_duration(text);
    debug!(
        duration,
        output = %output.display(),
        "Generating placeholder silence"
    );
    let cmd = FfmpegCommand::without_input(output)
        .input_args(["-f", "lavfi", "-i", "anullsrc=r=24000:cl=mono"])
        .duration(duration)
        .output_args(["-q:a", "9"]);
    FfmpegRunner::new().run(&cmd).await?;
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_speech_duration() {
        // 10 words at 0.4 s/word
        let text = "one two three four five six seven eight nine ten";
        assert!((estimate_speech_duration(text) - 4.0).abs() < 1e-9);
        // Floor of one second
        assert!((estimate_speech_duration("hi") - 1.0).abs() < 1e-9);
        assert!((estimate_speech_duration("") - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_slice_rejects_empty_window() {
        let err = slice_audio("in.mp3", "out.mp3", 5.0, 5.0).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidMedia(_)));
    }

    #[tokio::test]
    async fn test_concat_audio_rejects_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let err = concatenate_audio(
            &[tmp.path().join("missing.mp3")],
            &tmp.path().join("out.mp3"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
