//! Thumbnail generation.

use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

const THUMBNAIL_SCALE_WIDTH: u32 = 480;

/// Extract a single scaled frame at `timestamp` seconds.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    timestamp: f64,
) -> MediaResult<()> {
    let filter = format!("scale={THUMBNAIL_SCALE_WIDTH}:-2");
    let cmd = FfmpegCommand::new(video_path.as_ref(), output_path.as_ref())
        .seek(timestamp.max(0.0))
        .single_frame()
        .video_filter(filter);
    FfmpegRunner::new().run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_args() {
        let cmd = FfmpegCommand::new("v.mp4", "t.jpg")
            .seek(5.0)
            .single_frame()
            .video_filter(format!("scale={THUMBNAIL_SCALE_WIDTH}:-2"));
        let args = cmd.build_args();
        assert!(args.contains(&"-vframes".to_string()));
        assert!(args.iter().any(|a| a.contains("480")));
    }
}
