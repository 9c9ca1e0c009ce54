//! Filesystem-derived job progress.
//!
//! Nothing here is authoritative state: the snapshot is recomputed from
//! artifact presence (`script.json`, per-section MP4s, `final_video.mp4`)
//! every time, which is what makes resume idempotent.

use std::collections::BTreeSet;

use lectio_models::{JobStatus, Script};
use lectio_store::{scripts, JobWorkspace, StoreLayout};
use tracing::debug;

/// A progress report forwarded to the job manager.
#[derive(Debug, Clone)]
pub struct StageProgress {
    pub status: JobStatus,
    /// Overall 0..100
    pub progress: f64,
    pub message: String,
}

/// Callback the orchestrator reports through.
pub type ProgressCallback = dyn Fn(StageProgress) + Send + Sync;

/// Disk-derived snapshot of one job's progress.
#[derive(Debug, Clone, Default)]
pub struct JobProgress {
    pub job_id: String,
    pub has_script: bool,
    pub script: Option<Script>,
    pub completed_sections: BTreeSet<usize>,
    pub has_final_video: bool,
    pub total_sections: usize,
}

impl JobProgress {
    /// Resume is possible with a script, at least one finished section,
    /// and no final video yet.
    pub fn is_resumable(&self) -> bool {
        self.has_script && !self.completed_sections.is_empty() && !self.has_final_video
    }

    pub fn remaining_sections(&self) -> Vec<usize> {
        (0..self.total_sections)
            .filter(|i| !self.completed_sections.contains(i))
            .collect()
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total_sections == 0 {
            return 0.0;
        }
        self.completed_sections.len() as f64 / self.total_sections as f64 * 100.0
    }

    pub fn all_sections_complete(&self) -> bool {
        self.total_sections > 0 && self.completed_sections.len() == self.total_sections
    }
}

/// Progress tracker for one job.
pub struct ProgressTracker {
    job_id: String,
    workspace: JobWorkspace,
    callback: Option<Box<ProgressCallback>>,
}

impl ProgressTracker {
    pub fn new(layout: &StoreLayout, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        Self {
            workspace: layout.job_workspace(&job_id),
            job_id,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: Box<ProgressCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn workspace(&self) -> &JobWorkspace {
        &self.workspace
    }

    /// Reconstruct the job's progress from disk.
    pub fn check_existing_progress(&self) -> JobProgress {
        let mut progress = JobProgress {
            job_id: self.job_id.clone(),
            ..Default::default()
        };

        let script_path = self.workspace.script_path();
        if script_path.exists() {
            if let Ok(script) = scripts::load_script(&script_path) {
                progress.total_sections = script.sections.len();
                progress.has_script = true;
                progress.script = Some(script);
            }
        }

        for index in 0..progress.total_sections {
            if self.workspace.find_section_video(index).is_some() {
                progress.completed_sections.insert(index);
            }
        }

        progress.has_final_video = self.workspace.final_video_path().exists();

        debug!(
            job_id = %self.job_id,
            total = progress.total_sections,
            completed = progress.completed_sections.len(),
            final_video = progress.has_final_video,
            "Progress snapshot"
        );
        progress
    }

    /// Map a stage-local 0..100 into the overall job progress and forward
    /// it: analysis and script share 0..10, sections span 10..90, and the
    /// composite takes 90..100.
    pub fn report_stage_progress(&self, stage: &str, stage_progress: f64, message: &str) {
        let report = map_stage(stage, stage_progress, message);
        if let Some(callback) = &self.callback {
            callback(report);
        }
    }

    /// Section-count shorthand for the sections stage.
    pub fn report_section_progress(&self, completed: usize, total: usize) {
        let stage_progress = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        self.report_stage_progress(
            "sections",
            stage_progress,
            &format!("Sections: {completed}/{total} complete"),
        );
    }
}

/// Inverse of the stage mapping: the stage name a status reports under.
pub fn stage_for_status(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Analyzing => "analysis",
        JobStatus::GeneratingScript => "script",
        JobStatus::ComposingVideo => "combining",
        _ => "sections",
    }
}

/// The stage → overall mapping.
pub fn map_stage(stage: &str, stage_progress: f64, message: &str) -> StageProgress {
    let stage_progress = stage_progress.clamp(0.0, 100.0);
    let (status, overall) = match stage {
        "analysis" => (JobStatus::Analyzing, stage_progress * 0.1),
        "script" => (JobStatus::GeneratingScript, stage_progress * 0.1),
        "sections" => (JobStatus::CreatingAnimations, 10.0 + stage_progress * 0.8),
        "combining" => (JobStatus::ComposingVideo, 90.0 + stage_progress * 0.1),
        _ => (JobStatus::CreatingAnimations, stage_progress),
    };
    StageProgress {
        status,
        progress: overall,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectio_models::Section;
    use std::sync::{Arc, Mutex};

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

    fn write_script(layout: &StoreLayout, job_id: &str, sections: usize) {
        let script = Script {
            title: "T".into(),
            sections: (0..sections)
                .map(|i| Section {
                    id: format!("s{i}"),
                    duration_seconds: Some(10.0),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let ws = layout.job_workspace(job_id);
        std::fs::create_dir_all(&ws.job_dir).unwrap();
        scripts::save_script(&ws.script_path(), &script).unwrap();
    }

    #[test]
    fn test_empty_job_snapshot() {
        let (_tmp, layout) = layout();
        let tracker = ProgressTracker::new(&layout, "none");
        let progress = tracker.check_existing_progress();
        assert!(!progress.has_script);
        assert_eq!(progress.total_sections, 0);
        assert!(!progress.is_resumable());
        assert_eq!(progress.completion_percentage(), 0.0);
    }

    #[test]
    fn test_snapshot_with_completed_sections_including_legacy() {
        let (_tmp, layout) = layout();
        write_script(&layout, "j1", 3);
        let ws = layout.job_workspace("j1");

        // Section 0 in legacy location, section 2 in the current one
        std::fs::create_dir_all(ws.sections_dir()).unwrap();
        std::fs::write(ws.legacy_section_video_path(0), b"v").unwrap();
        std::fs::create_dir_all(ws.section_dir(2)).unwrap();
        std::fs::write(ws.section_video_path(2), b"v").unwrap();

        let tracker = ProgressTracker::new(&layout, "j1");
        let progress = tracker.check_existing_progress();
        assert!(progress.has_script);
        assert_eq!(progress.total_sections, 3);
        assert_eq!(
            progress.completed_sections,
            BTreeSet::from([0usize, 2usize])
        );
        assert!(progress.is_resumable());
        assert_eq!(progress.remaining_sections(), vec![1]);
        assert!((progress.completion_percentage() - 66.666).abs() < 0.1);
    }

    #[test]
    fn test_final_video_blocks_resume() {
        let (_tmp, layout) = layout();
        write_script(&layout, "j1", 2);
        let ws = layout.job_workspace("j1");
        std::fs::create_dir_all(ws.section_dir(0)).unwrap();
        std::fs::write(ws.section_video_path(0), b"v").unwrap();
        std::fs::write(ws.final_video_path(), b"v").unwrap();

        let tracker = ProgressTracker::new(&layout, "j1");
        let progress = tracker.check_existing_progress();
        assert!(progress.has_final_video);
        assert!(!progress.is_resumable());
    }

    #[test]
    fn test_stage_mapping() {
        let report = map_stage("analysis", 50.0, "m");
        assert_eq!(report.status, JobStatus::Analyzing);
        assert!((report.progress - 5.0).abs() < 1e-9);

        let report = map_stage("script", 100.0, "m");
        assert_eq!(report.status, JobStatus::GeneratingScript);
        assert!((report.progress - 10.0).abs() < 1e-9);

        let report = map_stage("sections", 50.0, "m");
        assert_eq!(report.status, JobStatus::CreatingAnimations);
        assert!((report.progress - 50.0).abs() < 1e-9);

        let report = map_stage("sections", 100.0, "m");
        assert!((report.progress - 90.0).abs() < 1e-9);

        let report = map_stage("combining", 100.0, "m");
        assert_eq!(report.status, JobStatus::ComposingVideo);
        assert!((report.progress - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_stage_status_roundtrip() {
        for status in [
            JobStatus::Analyzing,
            JobStatus::GeneratingScript,
            JobStatus::CreatingAnimations,
            JobStatus::ComposingVideo,
        ] {
            let report = map_stage(stage_for_status(status), 50.0, "m");
            assert_eq!(report.status, status);
        }
    }

    #[test]
    fn test_report_section_progress_through_callback() {
        let (_tmp, layout) = layout();
        let seen: Arc<Mutex<Vec<StageProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let tracker = ProgressTracker::new(&layout, "j1")
            .with_callback(Box::new(move |p| seen_clone.lock().unwrap().push(p)));

        tracker.report_section_progress(3, 10);
        let reports = seen.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, JobStatus::CreatingAnimations);
        // 30% of the sections band: 10 + 0.8 * 30 = 34
        assert!((reports[0].progress - 34.0).abs() < 1e-9);
        assert!(reports[0].message.contains("3/10"));
    }
}
