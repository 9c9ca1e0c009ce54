//! Shared data model for the lectio video generation pipeline.
//!
//! Every entity that crosses a crate boundary lives here: jobs and their
//! status enum, the video script (plan), per-segment audio records,
//! validation issues produced by the animation refiner, choreography plans,
//! and the persistent video metadata that survives job cleanup.

pub mod job;
pub mod plan;
pub mod script;
pub mod section;
pub mod validation;
pub mod video_info;

pub use job::{Job, JobId, JobStatus, JobUpdate, VideoResult};
pub use plan::{ChoreographyPlan, PlanObject, SceneSpec, TimelineEvent};
pub use script::{NarrationSegment, Script, Section, VideoMode, WrappedScript};
pub use section::{SectionMediaResult, SectionStatus, SegmentAudio};
pub use validation::{
    dedup_frame_captures, Confidence, FrameCapture, IssueCategory, Severity, ValidationIssue,
    ValidationResult,
};
pub use video_info::{VideoChapter, VideoInfo};
