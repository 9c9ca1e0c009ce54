//! The generation pipeline: per-job orchestration from analysis through the
//! final composite, plus the background services around it (cleanup,
//! startup recovery, progress tracking).

pub mod analyzer;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod progress;
pub mod script_gen;
pub mod section_worker;

pub use analyzer::{Analyzer, AnalysisRecord, AnalysisRepository};
pub use cleanup::{CleanupConfig, CleanupSummary, OutputCleanupService};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use lifecycle::{LifecycleManager, RuntimeReport};
pub use orchestrator::{GenerationParams, VideoGenerator};
pub use progress::{JobProgress, ProgressTracker, StageProgress};
pub use script_gen::ScriptGenerator;
pub use section_worker::SectionWorker;
