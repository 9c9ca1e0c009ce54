//! Durable job registry with a bounded in-memory cache.
//!
//! Disk is the source of truth: every mutation is written to
//! `job_data_root/<id>.json` before the call returns. The cache holds at
//! most `cache_limit` records; eviction removes non-active records oldest
//! `updated_at` first. Active records are never evicted, so the limit may
//! be exceeded transiently when everything in memory is still running.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, warn};

use lectio_models::{Job, JobId, JobStatus, JobUpdate};

use crate::atomic::write_json_atomic;
use crate::error::StoreResult;

/// Default cache bound; overridable via `JOB_MANAGER_CACHE_LIMIT`.
const DEFAULT_CACHE_LIMIT: usize = 200;
/// Floor for the configured cache bound.
const MIN_CACHE_LIMIT: usize = 25;

struct ManagerState {
    jobs: HashMap<JobId, Job>,
    known_ids: BTreeSet<JobId>,
}

/// File-backed job manager.
///
/// All operations serialize through one lock held across the full
/// read-modify-write, including the disk write, so concurrent updaters
/// cannot interleave and the durability contract holds.
pub struct JobManager {
    storage_dir: PathBuf,
    cache_limit: usize,
    state: Mutex<ManagerState>,
}

impl JobManager {
    /// Open (or create) the registry at `storage_dir` and index existing
    /// records without loading their payloads.
    pub fn new(storage_dir: impl Into<PathBuf>, cache_limit: Option<usize>) -> StoreResult<Self> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir)?;

        let cache_limit = cache_limit
            .or_else(env_cache_limit)
            .unwrap_or(DEFAULT_CACHE_LIMIT)
            .max(MIN_CACHE_LIMIT);

        let mut known_ids = BTreeSet::new();
        for entry in std::fs::read_dir(&storage_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    known_ids.insert(JobId::from_string(stem));
                }
            }
        }

        debug!(
            dir = %storage_dir.display(),
            indexed = known_ids.len(),
            cache_limit,
            "Job manager opened"
        );

        Ok(Self {
            storage_dir,
            cache_limit,
            state: Mutex::new(ManagerState {
                jobs: HashMap::new(),
                known_ids,
            }),
        })
    }

    fn job_file(&self, job_id: &JobId) -> PathBuf {
        self.storage_dir.join(format!("{}.json", job_id.as_str()))
    }

    fn load_from_disk(&self, job_id: &JobId) -> Option<Job> {
        let path = self.job_file(job_id);
        if !path.exists() {
            return None;
        }
        match std::fs::read(&path).map_err(|e| e.to_string()).and_then(|b| {
            serde_json::from_slice::<Job>(&b).map_err(|e| e.to_string())
        }) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to load job record");
                None
            }
        }
    }

    fn save(&self, state: &mut ManagerState, job: &Job) -> StoreResult<()> {
        write_json_atomic(&self.job_file(&job.id), job)?;
        state.known_ids.insert(job.id.clone());
        Ok(())
    }

    fn cache(&self, state: &mut ManagerState, job: Job) {
        state.jobs.insert(job.id.clone(), job);
        self.prune_cache(state);
    }

    fn prune_cache(&self, state: &mut ManagerState) {
        if state.jobs.len() <= self.cache_limit {
            return;
        }
        let mut evictable: Vec<(JobId, chrono::DateTime<Utc>)> = state
            .jobs
            .values()
            .filter(|j| !j.status.is_active())
            .map(|j| (j.id.clone(), j.updated_at))
            .collect();
        evictable.sort_by_key(|(_, updated)| *updated);

        let mut evictable = evictable.into_iter();
        while state.jobs.len() > self.cache_limit {
            match evictable.next() {
                Some((id, _)) => {
                    state.jobs.remove(&id);
                }
                // Only active records remain; exceeding the limit is
                // preferable to dropping live state.
                None => break,
            }
        }
    }

    /// Create a fresh `pending` job, persist it, and cache it.
    pub fn create(&self, job_id: &JobId) -> StoreResult<Job> {
        let mut state = self.state.lock().expect("job manager lock poisoned");
        let job = Job::new(job_id.clone());
        self.save(&mut state, &job)?;
        self.cache(&mut state, job.clone());
        Ok(job)
    }

    /// Look up a job: cache first, then disk. Unknown ids are forgotten.
    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        let mut state = self.state.lock().expect("job manager lock poisoned");
        if let Some(job) = state.jobs.get(job_id) {
            return Some(job.clone());
        }
        if !state.known_ids.contains(job_id) {
            return None;
        }
        match self.load_from_disk(job_id) {
            Some(job) => {
                if job.status.is_active() || state.jobs.len() < self.cache_limit {
                    self.cache(&mut state, job.clone());
                }
                Some(job)
            }
            None => {
                state.known_ids.remove(job_id);
                None
            }
        }
    }

    /// Apply non-nil deltas, stamp `updated_at`, persist, re-cache.
    ///
    /// Unknown job ids are ignored (the job may have been deleted by a
    /// concurrent cleanup pass).
    pub fn update(&self, job_id: &JobId, update: JobUpdate) -> StoreResult<()> {
        let mut state = self.state.lock().expect("job manager lock poisoned");

        let mut job = match state.jobs.get(job_id).cloned() {
            Some(job) => job,
            None => {
                if !state.known_ids.contains(job_id) {
                    return Ok(());
                }
                match self.load_from_disk(job_id) {
                    Some(job) => job,
                    None => {
                        state.known_ids.remove(job_id);
                        return Ok(());
                    }
                }
            }
        };

        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(progress) = update.progress {
            job.progress = progress.clamp(0.0, 100.0);
        }
        if let Some(message) = update.message {
            job.message = message;
        }
        if let Some(result) = update.result {
            job.result = Some(result);
        }
        if let Some(error) = update.error {
            job.error = Some(error);
        }
        job.updated_at = Utc::now();

        self.save(&mut state, &job)?;
        self.cache(&mut state, job);
        Ok(())
    }

    /// Remove a job record, returning its last state.
    pub fn delete(&self, job_id: &JobId) -> StoreResult<Option<Job>> {
        let mut state = self.state.lock().expect("job manager lock poisoned");

        let job = state
            .jobs
            .get(job_id)
            .cloned()
            .or_else(|| {
                if state.known_ids.contains(job_id) {
                    self.load_from_disk(job_id)
                } else {
                    None
                }
            });

        state.jobs.remove(job_id);
        state.known_ids.remove(job_id);

        let path = self.job_file(job_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(job)
    }

    /// All known jobs, sorted by id.
    pub fn list_all(&self) -> Vec<Job> {
        let ids: Vec<JobId> = {
            let state = self.state.lock().expect("job manager lock poisoned");
            state.known_ids.iter().cloned().collect()
        };
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Jobs whose persisted status is in the active set — work that was
    /// running when the process last stopped.
    pub fn get_interrupted(&self) -> Vec<Job> {
        let mut state = self.state.lock().expect("job manager lock poisoned");
        let ids: Vec<JobId> = state.known_ids.iter().cloned().collect();
        let mut interrupted = Vec::new();
        for id in ids {
            let job = state
                .jobs
                .get(&id)
                .cloned()
                .or_else(|| self.load_from_disk(&id));
            let Some(job) = job else { continue };
            if job.status.is_active() {
                self.cache(&mut state, job.clone());
                interrupted.push(job);
            }
        }
        interrupted
    }

    /// Force every interrupted job to `failed`.
    pub fn mark_interrupted_failed(&self) -> StoreResult<usize> {
        let interrupted = self.get_interrupted();
        let count = interrupted.len();
        for job in interrupted {
            self.update(
                &job.id,
                JobUpdate::status(JobStatus::Failed)
                    .with_message("Job was interrupted by server restart"),
            )?;
        }
        Ok(count)
    }

    /// Number of records currently cached (test hook).
    pub fn cached_count(&self) -> usize {
        self.state.lock().expect("job manager lock poisoned").jobs.len()
    }

    pub fn cache_limit(&self) -> usize {
        self.cache_limit
    }
}

fn env_cache_limit() -> Option<usize> {
    std::env::var("JOB_MANAGER_CACHE_LIMIT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(limit: usize) -> (tempfile::TempDir, JobManager) {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = JobManager::new(tmp.path(), Some(limit)).unwrap();
        (tmp, mgr)
    }

    #[test]
    fn test_create_persists_to_disk() {
        let (tmp, mgr) = manager(50);
        let id = JobId::from_string("j1");
        mgr.create(&id).unwrap();
        assert!(tmp.path().join("j1.json").exists());

        let job = mgr.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_update_stamps_updated_at_and_persists() {
        let (tmp, mgr) = manager(50);
        let id = JobId::from_string("j1");
        let created = mgr.create(&id).unwrap();

        mgr.update(
            &id,
            JobUpdate::status(JobStatus::Analyzing)
                .with_progress(5.0)
                .with_message("Analyzing material..."),
        )
        .unwrap();

        let job = mgr.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Analyzing);
        assert!(job.updated_at >= created.updated_at);

        // On-disk record reflects the update before the call returned
        let raw = std::fs::read(tmp.path().join("j1.json")).unwrap();
        let on_disk: Job = serde_json::from_slice(&raw).unwrap();
        assert_eq!(on_disk.status, JobStatus::Analyzing);
        assert!((on_disk.progress - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_update_clamps_progress() {
        let (_tmp, mgr) = manager(50);
        let id = JobId::from_string("j1");
        mgr.create(&id).unwrap();
        mgr.update(&id, JobUpdate::default().with_progress(250.0))
            .unwrap();
        assert!((mgr.get(&id).unwrap().progress - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let (_tmp, mgr) = manager(50);
        mgr.update(
            &JobId::from_string("ghost"),
            JobUpdate::status(JobStatus::Failed),
        )
        .unwrap();
        assert!(mgr.get(&JobId::from_string("ghost")).is_none());
    }

    #[test]
    fn test_get_survives_cache_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let id = JobId::from_string("j1");
        {
            let mgr = JobManager::new(tmp.path(), Some(50)).unwrap();
            mgr.create(&id).unwrap();
        }
        // A fresh manager indexes the record from disk.
        let mgr = JobManager::new(tmp.path(), Some(50)).unwrap();
        assert!(mgr.get(&id).is_some());
    }

    #[test]
    fn test_delete_returns_last_state() {
        let (tmp, mgr) = manager(50);
        let id = JobId::from_string("j1");
        mgr.create(&id).unwrap();
        mgr.update(&id, JobUpdate::status(JobStatus::Completed))
            .unwrap();

        let last = mgr.delete(&id).unwrap().unwrap();
        assert_eq!(last.status, JobStatus::Completed);
        assert!(!tmp.path().join("j1.json").exists());
        assert!(mgr.get(&id).is_none());
        assert!(mgr.delete(&id).unwrap().is_none());
    }

    #[test]
    fn test_list_all_sorted_by_id() {
        let (_tmp, mgr) = manager(50);
        for id in ["b", "a", "c"] {
            mgr.create(&JobId::from_string(id)).unwrap();
        }
        let ids: Vec<String> = mgr
            .list_all()
            .into_iter()
            .map(|j| j.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cache_evicts_terminal_records_oldest_first() {
        let (_tmp, mgr) = manager(25);
        // 30 terminal jobs against a limit of 25
        for i in 0..30 {
            let id = JobId::from_string(format!("j{i:02}"));
            mgr.create(&id).unwrap();
            mgr.update(&id, JobUpdate::status(JobStatus::Completed))
                .unwrap();
        }
        assert!(mgr.cached_count() <= mgr.cache_limit());
        // Evicted records are still reachable from disk
        assert!(mgr.get(&JobId::from_string("j00")).is_some());
    }

    #[test]
    fn test_cache_never_evicts_active_records() {
        let (_tmp, mgr) = manager(25);
        for i in 0..30 {
            let id = JobId::from_string(format!("j{i:02}"));
            mgr.create(&id).unwrap();
            mgr.update(&id, JobUpdate::status(JobStatus::CreatingAnimations))
                .unwrap();
        }
        // All records are active: the limit is exceeded by design.
        assert_eq!(mgr.cached_count(), 30);
    }

    #[test]
    fn test_interrupted_jobs_and_forced_failure() {
        let (_tmp, mgr) = manager(50);
        let running = JobId::from_string("running");
        let done = JobId::from_string("done");
        mgr.create(&running).unwrap();
        mgr.update(&running, JobUpdate::status(JobStatus::ComposingVideo))
            .unwrap();
        mgr.create(&done).unwrap();
        mgr.update(&done, JobUpdate::status(JobStatus::Completed))
            .unwrap();

        let interrupted = mgr.get_interrupted();
        // Pending jobs count as active too
        assert_eq!(interrupted.len(), 1);
        assert_eq!(interrupted[0].id, running);

        mgr.mark_interrupted_failed().unwrap();
        let job = mgr.get(&running).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.message, "Job was interrupted by server restart");
        assert_eq!(mgr.get(&done).unwrap().status, JobStatus::Completed);
    }
}
