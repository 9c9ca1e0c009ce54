//! Stream-copy concatenation via the concat demuxer.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Concatenate MP4 files into `output` using a concat list file and
/// `-c copy`. The list file is written next to the output and removed on
/// success.
pub async fn concatenate_videos(
    inputs: &[PathBuf],
    list_path: &Path,
    output: &Path,
) -> MediaResult<()> {
    if inputs.is_empty() {
        return Err(MediaError::InvalidMedia(
            "no input videos to concatenate".to_string(),
        ));
    }
    for input in inputs {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.clone()));
        }
    }

    tokio::fs::write(list_path, build_concat_list(inputs)).await?;

    let cmd = FfmpegCommand::new(list_path, output)
        .input_args(["-f", "concat", "-safe", "0"])
        .codec_copy();
    FfmpegRunner::new().run(&cmd).await?;

    if !output.exists() {
        return Err(MediaError::ffmpeg_failed(
            format!("concat produced no output at {}", output.display()),
            None,
            None,
        ));
    }

    info!(
        inputs = inputs.len(),
        output = %output.display(),
        "Concatenated section videos"
    );

    tokio::fs::remove_file(list_path).await.ok();
    Ok(())
}

/// Build the concat demuxer list, escaping single quotes per its quoting
/// rules.
pub fn build_concat_list(inputs: &[PathBuf]) -> String {
    let mut list = String::new();
    for input in inputs {
        let escaped = input.to_string_lossy().replace('\'', "'\\''");
        list.push_str(&format!("file '{escaped}'\n"));
    }
    list
}
