//! Retention cleanup for outputs, uploads, and job records.
//!
//! Runs once at startup and then on a periodic ticker. Active jobs are
//! never touched; completed jobs in keep-only-final mode are pruned down
//! to their durable artifacts; orphans and expired failures are removed
//! wholesale; upload deletions are bounded per tick.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{debug, info, warn};

use lectio_models::{JobId, JobStatus};
use lectio_store::{JobManager, JobWorkspace, StoreLayout};

use crate::config::{env_bool, env_u64, env_usize};

/// Retention knobs, all overridable from the environment.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub keep_only_final: bool,
    pub output_retention_hours: u64,
    pub failed_output_retention_hours: u64,
    pub orphan_output_retention_hours: u64,
    pub job_metadata_retention_hours: u64,
    pub upload_cleanup_enabled: bool,
    pub upload_retention_hours: u64,
    pub upload_max_deletions_per_tick: usize,
    pub tick_interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keep_only_final: true,
            output_retention_hours: 24,
            failed_output_retention_hours: 72,
            orphan_output_retention_hours: 24,
            job_metadata_retention_hours: 24 * 7,
            upload_cleanup_enabled: true,
            upload_retention_hours: 48,
            upload_max_deletions_per_tick: 100,
            tick_interval: Duration::from_secs(3600),
        }
    }
}

impl CleanupConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_bool("OUTPUT_CLEANUP_ENABLED", defaults.enabled),
            keep_only_final: env_bool("OUTPUT_KEEP_ONLY_FINAL", defaults.keep_only_final),
            output_retention_hours: env_u64(
                "OUTPUT_RETENTION_HOURS",
                defaults.output_retention_hours,
            ),
            failed_output_retention_hours: env_u64(
                "FAILED_OUTPUT_RETENTION_HOURS",
                defaults.failed_output_retention_hours,
            ),
            orphan_output_retention_hours: env_u64(
                "ORPHAN_OUTPUT_RETENTION_HOURS",
                defaults.orphan_output_retention_hours,
            ),
            job_metadata_retention_hours: env_u64(
                "JOB_METADATA_RETENTION_HOURS",
                defaults.job_metadata_retention_hours,
            ),
            upload_cleanup_enabled: env_bool(
                "UPLOAD_CLEANUP_ENABLED",
                defaults.upload_cleanup_enabled,
            ),
            upload_retention_hours: env_u64(
                "UPLOAD_RETENTION_HOURS",
                defaults.upload_retention_hours,
            ),
            upload_max_deletions_per_tick: env_usize(
                "UPLOAD_CLEANUP_MAX_DELETIONS",
                defaults.upload_max_deletions_per_tick,
            ),
            tick_interval: defaults.tick_interval,
        }
    }
}

/// What one pass did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CleanupSummary {
    pub deleted_output_dirs: usize,
    pub pruned_output_dirs: usize,
    pub deleted_uploads: usize,
    pub deleted_job_records: usize,
}

pub struct OutputCleanupService {
    layout: StoreLayout,
    job_manager: Arc<JobManager>,
    config: CleanupConfig,
}

impl OutputCleanupService {
    pub fn new(layout: StoreLayout, job_manager: Arc<JobManager>, config: CleanupConfig) -> Self {
        Self {
            layout,
            job_manager,
            config,
        }
    }

    /// One cleanup pass.
    pub fn run_once(&self) -> CleanupSummary {
        let mut summary = CleanupSummary::default();
        if !self.config.enabled {
            return summary;
        }

        self.clean_outputs(&mut summary);
        self.clean_job_records(&mut summary);
        if self.config.upload_cleanup_enabled {
            self.clean_uploads(&mut summary);
        }

        info!(
            deleted = summary.deleted_output_dirs,
            pruned = summary.pruned_output_dirs,
            uploads = summary.deleted_uploads,
            records = summary.deleted_job_records,
            "Cleanup pass complete"
        );
        summary
    }

    /// Run forever on the configured interval. Abort the task to stop.
    pub async fn run_periodic(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick duplicates the startup pass; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let service = Arc::clone(&self);
            if let Err(e) = tokio::task::spawn_blocking(move || service.run_once()).await {
                warn!(error = %e, "Cleanup tick panicked");
            }
        }
    }

    fn clean_outputs(&self, summary: &mut CleanupSummary) {
        let Ok(entries) = std::fs::read_dir(&self.layout.outputs_root) else {
            return;
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(job_id) = path.file_name().and_then(|n| n.to_str()).map(String::from)
            else {
                continue;
            };

            match self.job_manager.get(&JobId::from_string(&job_id)) {
                Some(job) if job.status.is_active() => {
                    // Never touch a live job's directory.
                    continue;
                }
                Some(job) if job.status == JobStatus::Completed => {
                    if self.config.keep_only_final
                        && older_than(&path, self.config.output_retention_hours)
                    {
                        self.prune_to_final(&path);
                        summary.pruned_output_dirs += 1;
                    }
                }
                Some(_) => {
                    // Failed terminal state.
                    if older_than(&path, self.config.failed_output_retention_hours) {
                        if remove_dir(&path) {
                            summary.deleted_output_dirs += 1;
                        }
                    }
                }
                None => {
                    if older_than(&path, self.config.orphan_output_retention_hours) {
                        if remove_dir(&path) {
                            summary.deleted_output_dirs += 1;
                        }
                    }
                }
            }
        }
    }

    /// Keep only the durable artifacts in a completed job's directory.
    fn prune_to_final(&self, job_dir: &Path) {
        let Ok(entries) = std::fs::read_dir(job_dir) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if JobWorkspace::is_protected_entry(name) {
                continue;
            }
            let path = entry.path();
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path).is_ok()
            } else {
                std::fs::remove_file(&path).is_ok()
            };
            if removed {
                debug!(path = %path.display(), "Pruned intermediate");
            }
        }
    }

    fn clean_job_records(&self, summary: &mut CleanupSummary) {
        for job in self.job_manager.list_all() {
            if !job.status.is_terminal() {
                continue;
            }
            let age_hours = (chrono::Utc::now() - job.updated_at).num_hours().max(0) as u64;
            if age_hours >= self.config.job_metadata_retention_hours {
                match self.job_manager.delete(&job.id) {
                    Ok(_) => summary.deleted_job_records += 1,
                    Err(e) => warn!(job_id = %job.id, error = %e, "Record cleanup failed"),
                }
            }
        }
    }

    fn clean_uploads(&self, summary: &mut CleanupSummary) {
        let Ok(entries) = std::fs::read_dir(&self.layout.uploads_root) else {
            return;
        };
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| older_than(p, self.config.upload_retention_hours))
            .collect();
        candidates.sort();

        // Bounded per tick to avoid stalling on a huge backlog.
        for path in candidates
            .into_iter()
            .take(self.config.upload_max_deletions_per_tick)
        {
            if std::fs::remove_file(&path).is_ok() {
                summary.deleted_uploads += 1;
            }
        }
    }
}

fn older_than(path: &Path, hours: u64) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age >= Duration::from_secs(hours * 3600),
        Err(_) => false,
    }
}

fn remove_dir(path: &Path) -> bool {
    match std::fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Directory removal failed");
            false
        }
    }
}
