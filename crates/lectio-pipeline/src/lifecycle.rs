//! Startup recovery and background-task lifecycle.
//!
//! On startup: verify runtime tools, run one cleanup pass and schedule the
//! periodic one, then replay interrupted jobs — composing jobs whose
//! sections all finished, and failing the rest with a resume hint. On
//! shutdown: stop the background tasks.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use lectio_models::{JobStatus, JobUpdate};
use lectio_store::{JobManager, StoreLayout};

use crate::cleanup::OutputCleanupService;
use crate::error::{PipelineError, PipelineResult};
use crate::orchestrator::composite_job;
use crate::progress::ProgressTracker;

/// Presence report for the external tools the pipeline shells out to.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeReport {
    pub renderer: bool,
    pub ffmpeg: bool,
    pub ffprobe: bool,
}

impl RuntimeReport {
    pub fn probe() -> Self {
        Self {
            renderer: which::which(lectio_anim::render::RENDERER_BIN).is_ok(),
            ffmpeg: lectio_media::check_ffmpeg().is_ok(),
            ffprobe: lectio_media::check_ffprobe().is_ok(),
        }
    }

    pub fn all_present(&self) -> bool {
        self.renderer && self.ffmpeg && self.ffprobe
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.renderer {
            missing.push(lectio_anim::render::RENDERER_BIN);
        }
        if !self.ffmpeg {
            missing.push("ffmpeg");
        }
        if !self.ffprobe {
            missing.push("ffprobe");
        }
        missing
    }
}

pub struct LifecycleManager {
    layout: StoreLayout,
    job_manager: Arc<JobManager>,
    cleanup: Arc<OutputCleanupService>,
    strict_runtime_checks: bool,
    cleanup_task: Option<JoinHandle<()>>,
}

impl LifecycleManager {
    pub fn new(
        layout: StoreLayout,
        job_manager: Arc<JobManager>,
        cleanup: Arc<OutputCleanupService>,
        strict_runtime_checks: bool,
    ) -> Self {
        Self {
            layout,
            job_manager,
            cleanup,
            strict_runtime_checks,
            cleanup_task: None,
        }
    }

    /// Run startup tasks. Returns the runtime-tool report.
    pub async fn run_startup(&mut self) -> PipelineResult<RuntimeReport> {
        let report = RuntimeReport::probe();
        info!(?report, "Runtime tool check");
        if self.strict_runtime_checks && !report.all_present() {
            return Err(PipelineError::RuntimeCheck(format!(
                "missing required binaries: {}",
                report.missing().join(", ")
            )));
        }

        // Cleanup: once now, then on a ticker.
        let cleanup = Arc::clone(&self.cleanup);
        tokio::task::spawn_blocking(move || cleanup.run_once())
            .await
            .map_err(|e| PipelineError::RuntimeCheck(e.to_string()))?;
        self.cleanup_task = Some(tokio::spawn(Arc::clone(&self.cleanup).run_periodic()));

        self.recover_interrupted().await;
        Ok(report)
    }

    /// Cancel background tasks.
    pub async fn run_shutdown(&mut self) {
        if let Some(task) = self.cleanup_task.take() {
            task.abort();
            let _ = task.await;
        }
        info!("Lifecycle shutdown complete");
    }

    /// Replay jobs that were mid-flight when the process last stopped.
    async fn recover_interrupted(&self) {
        let interrupted = self.job_manager.get_interrupted();
        if interrupted.is_empty() {
            return;
        }
        info!(count = interrupted.len(), "Recovering interrupted jobs");

        for job in interrupted {
            let tracker = ProgressTracker::new(&self.layout, job.id.as_str());
            let progress = tracker.check_existing_progress();

            if progress.all_sections_complete() {
                // Everything rendered; only the composite is missing.
                info!(job_id = %job.id, "All sections on disk, composing standalone");
                let script = progress.script.clone().expect("complete progress has script");
                match composite_job(&self.layout, job.id.as_str(), &script).await {
                    Ok(result) => {
                        let update = JobUpdate::status(JobStatus::Completed)
                            .with_progress(100.0)
                            .with_message("Video generation complete!")
                            .with_result(vec![result]);
                        if let Err(e) = self.job_manager.update(&job.id, update) {
                            error!(job_id = %job.id, error = %e, "Failed to persist recovery result");
                        }
                    }
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "Standalone composite failed");
                        self.fail_job(&job.id, format!("Failed to combine: {e}"));
                    }
                }
            } else {
                let message = format!(
                    "Interrupted: {}/{} sections complete. Use resume to continue.",
                    progress.completed_sections.len(),
                    progress.total_sections
                );
                self.fail_job(&job.id, message);
            }
        }
    }

    fn fail_job(&self, job_id: &lectio_models::JobId, message: String) {
        if let Err(e) = self
            .job_manager
            .update(job_id, JobUpdate::status(JobStatus::Failed).with_message(message))
        {
            error!(job_id = %job_id, error = %e, "Failed to mark job failed");
        }
    }
}
