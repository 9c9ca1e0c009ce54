//! Job records for video generation tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::video_info::VideoChapter;

/// Unique identifier for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a generation job.
///
/// The first six states are "active"; `Completed` and `Failed` are terminal.
/// Status only moves forward through this enum, except that any active state
/// may be forced to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created, not yet picked up
    #[default]
    Pending,
    /// Analyzing the uploaded material
    Analyzing,
    /// Generating the video script
    GeneratingScript,
    /// Producing section animations
    CreatingAnimations,
    /// Synthesizing narration audio
    SynthesizingAudio,
    /// Concatenating sections into the final video
    ComposingVideo,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Analyzing => "analyzing",
            JobStatus::GeneratingScript => "generating_script",
            JobStatus::CreatingAnimations => "creating_animations",
            JobStatus::SynthesizingAudio => "synthesizing_audio",
            JobStatus::ComposingVideo => "composing_video",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Non-terminal states, including `Pending`. Active jobs are never
    /// evicted from the manager cache and their directories are never
    /// touched by cleanup.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Actively processing states. Excludes `Pending`.
    pub fn is_in_progress(&self) -> bool {
        !matches!(
            self,
            JobStatus::Pending | JobStatus::Completed | JobStatus::Failed
        )
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The single result record attached to a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResult {
    pub video_id: String,
    pub title: String,
    /// Total duration in seconds
    pub duration: f64,
    pub chapters: Vec<VideoChapter>,
    pub download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// A video generation job.
///
/// Persisted as `<job_data_root>/<id>.json` by the job manager; every field
/// change reaches disk before the mutating call returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Current lifecycle state
    #[serde(default)]
    pub status: JobStatus,

    /// Overall progress (0-100)
    #[serde(default)]
    pub progress: f64,

    /// Human-readable status line
    #[serde(default)]
    pub message: String,

    /// Result records (one entry on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<VideoResult>>,

    /// Error detail (may hold a traceback-style dump)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a fresh pending job.
    pub fn new(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0.0,
            message: "Job created".to_string(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job counts as interrupted work on restart.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// A partial update applied through the job manager.
///
/// `None` fields are left untouched; `updated_at` is stamped by the manager.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub result: Option<Vec<VideoResult>>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_result(mut self, result: Vec<VideoResult>) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
