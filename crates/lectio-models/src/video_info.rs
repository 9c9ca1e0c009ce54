//! Persistent video metadata.
//!
//! `video_info.json` is the durable post-job artifact: written once when a
//! job completes and kept through every cleanup pass, independent of the
//! job record's lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::VideoResult;

/// A chapter marker in a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoChapter {
    pub title: String,
    pub start_time: f64,
    pub duration: f64,
}

/// Metadata for a completed video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub video_id: String,
    pub title: String,
    pub duration: f64,
    #[serde(default)]
    pub chapters: Vec<VideoChapter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl VideoInfo {
    /// Build the durable record from a job's result payload.
    pub fn from_result(video_id: impl Into<String>, result: &VideoResult) -> Self {
        Self {
            video_id: video_id.into(),
            title: result.title.clone(),
            duration: result.duration,
            chapters: result.chapters.clone(),
            created_at: Some(Utc::now()),
            thumbnail_url: result.thumbnail_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_result_copies_chapters() {
        let result = VideoResult {
            video_id: "v1".into(),
            title: "Linear Algebra".into(),
            duration: 120.5,
            chapters: vec![VideoChapter {
                title: "Intro".into(),
                start_time: 0.0,
                duration: 30.0,
            }],
            download_url: "/outputs/v1/final_video.mp4".into(),
            thumbnail_url: Some("/outputs/v1/thumbnail.jpg".into()),
        };
        let info = VideoInfo::from_result("v1", &result);
        assert_eq!(info.title, "Linear Algebra");
        assert_eq!(info.chapters.len(), 1);
        assert!(info.created_at.is_some());
    }
}
