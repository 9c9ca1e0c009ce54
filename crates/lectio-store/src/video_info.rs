//! `video_info.json` persistence.
//!
//! The one artifact that outlives cleanup: gallery-facing metadata for a
//! finished video, written when a job completes.

use std::path::Path;

use lectio_models::VideoInfo;

use crate::atomic::write_json_atomic;
use crate::error::StoreResult;
use crate::paths::StoreLayout;

/// Persist the video record into the job's output directory.
pub fn save_video_info(layout: &StoreLayout, info: &VideoInfo) -> StoreResult<()> {
    let path = layout.job_workspace(&info.video_id).video_info_path();
    write_json_atomic(&path, info)
}

/// Load the video record for a job, if present and readable.
pub fn load_video_info(layout: &StoreLayout, video_id: &str) -> Option<VideoInfo> {
    let path = layout.job_workspace(video_id).video_info_path();
    load_from_path(&path)
}

pub fn video_info_exists(layout: &StoreLayout, video_id: &str) -> bool {
    layout.job_workspace(video_id).video_info_path().exists()
}

/// All videos with a readable `video_info.json` under the outputs root.
pub fn list_all_videos(layout: &StoreLayout) -> Vec<VideoInfo> {
    let Ok(entries) = std::fs::read_dir(&layout.outputs_root) else {
        return Vec::new();
    };
    let mut videos: Vec<VideoInfo> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| load_from_path(&e.path().join("video_info.json")))
        .collect();
    videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    videos
}

fn load_from_path(path: &Path) -> Option<VideoInfo> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectio_models::{VideoChapter, VideoInfo};

    fn layout() -> (tempfile::TempDir, StoreLayout) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(
            tmp.path().join("outputs"),
            tmp.path().join("uploads"),
            tmp.path().join("jobs"),
        );
        layout.ensure_dirs().unwrap();
        (tmp, layout)
    }

    fn info(id: &str) -> VideoInfo {
        VideoInfo {
            video_id: id.into(),
            title: "T".into(),
            duration: 10.0,
            chapters: vec![VideoChapter {
                title: "c".into(),
                start_time: 0.0,
                duration: 10.0,
            }],
            created_at: Some(chrono::Utc::now()),
            thumbnail_url: None,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (_tmp, layout) = layout();
        save_video_info(&layout, &info("v1")).unwrap();
        assert!(video_info_exists(&layout, "v1"));

        let loaded = load_video_info(&layout, "v1").unwrap();
        assert_eq!(loaded.video_id, "v1");
        assert_eq!(loaded.chapters.len(), 1);
    }

    #[test]
    fn test_list_skips_dirs_without_info() {
        let (_tmp, layout) = layout();
        save_video_info(&layout, &info("v1")).unwrap();
        std::fs::create_dir_all(layout.outputs_root.join("incomplete")).unwrap();

        let all = list_all_videos(&layout);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].video_id, "v1");
    }
}
