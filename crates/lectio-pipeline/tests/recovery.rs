//! Crash-recovery and resume flow against real on-disk state.
//!
//! Exercises the restart path without external binaries: a job is killed
//! mid-flight with partial section output, a fresh process indexes it,
//! marks it failed with a resume hint, and the progress tracker reports it
//! resumable with exactly the missing sections remaining.

use std::sync::Arc;

use lectio_models::{JobId, JobStatus, JobUpdate, Script, Section};
use lectio_pipeline::{
    CleanupConfig, LifecycleManager, OutputCleanupService, ProgressTracker,
};
use lectio_store::{scripts, JobManager, StoreLayout};

struct World {
    _tmp: tempfile::TempDir,
    layout: StoreLayout,
}

fn world() -> World {
    let tmp = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(
        tmp.path().join("outputs"),
        tmp.path().join("uploads"),
        tmp.path().join("jobs"),
    );
    layout.ensure_dirs().unwrap();
    World { _tmp: tmp, layout }
}

fn script_with_sections(count: usize) -> Script {
    Script {
        title: "Integrals".into(),
        sections: (0..count)
            .map(|i| Section {
                id: format!("s{i}"),
                title: format!("Part {i}"),
                duration_seconds: Some(20.0),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn seed_interrupted_job(world: &World, job_id: &str, done: usize, total: usize) {
    // First process: job created and mid-flight when "killed".
    let manager = JobManager::new(&world.layout.job_data_root, Some(50)).unwrap();
    let id = JobId::from_string(job_id);
    manager.create(&id).unwrap();
    manager
        .update(
            &id,
            JobUpdate::status(JobStatus::CreatingAnimations)
                .with_progress(42.0)
                .with_message("Sections: 2/3 complete"),
        )
        .unwrap();

    let ws = world.layout.job_workspace(job_id);
    std::fs::create_dir_all(&ws.job_dir).unwrap();
    scripts::save_script(&ws.script_path(), &script_with_sections(total)).unwrap();
    for i in 0..done {
        std::fs::create_dir_all(ws.section_dir(i)).unwrap();
        std::fs::write(ws.section_video_path(i), b"mp4").unwrap();
        std::fs::write(ws.section_audio_path(i), b"mp3").unwrap();
    }
}

fn lifecycle_for(world: &World, manager: Arc<JobManager>) -> LifecycleManager {
    let cleanup = Arc::new(OutputCleanupService::new(
        world.layout.clone(),
        Arc::clone(&manager),
        CleanupConfig {
            enabled: false,
            ..Default::default()
        },
    ));
    LifecycleManager::new(world.layout.clone(), manager, cleanup, false)
}

#[tokio::test]
async fn restart_marks_partial_job_failed_and_resumable() {
    let world = world();
    seed_interrupted_job(&world, "job-a", 2, 3);

    // Second process over the same data directories.
    let manager = Arc::new(JobManager::new(&world.layout.job_data_root, Some(50)).unwrap());
    let interrupted = manager.get_interrupted();
    assert_eq!(interrupted.len(), 1);

    let mut lifecycle = lifecycle_for(&world, Arc::clone(&manager));
    lifecycle.run_startup().await.unwrap();

    let job = manager.get(&JobId::from_string("job-a")).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.message.contains("2/3 sections complete"));

    // Resume decision mirrors what GET /jobs/{id}/resume reports.
    let progress = ProgressTracker::new(&world.layout, "job-a").check_existing_progress();
    assert!(progress.is_resumable());
    assert_eq!(progress.remaining_sections(), vec![2]);
    assert_eq!(progress.completed_sections.len(), 2);

    // Completed section artifacts survived recovery untouched.
    let ws = world.layout.job_workspace("job-a");
    assert!(ws.section_video_path(0).exists());
    assert!(ws.section_video_path(1).exists());
    assert!(ws.script_path().exists());

    lifecycle.run_shutdown().await;
}

#[tokio::test]
async fn restart_is_idempotent_across_repeated_startups() {
    let world = world();
    seed_interrupted_job(&world, "job-b", 1, 3);

    for _ in 0..2 {
        let manager = Arc::new(JobManager::new(&world.layout.job_data_root, Some(50)).unwrap());
        let mut lifecycle = lifecycle_for(&world, Arc::clone(&manager));
        lifecycle.run_startup().await.unwrap();
        lifecycle.run_shutdown().await;
    }

    let manager = JobManager::new(&world.layout.job_data_root, Some(50)).unwrap();
    let job = manager.get(&JobId::from_string("job-b")).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    // A failed job is no longer interrupted on the next startup.
    assert!(manager.get_interrupted().is_empty());
}

#[tokio::test]
async fn terminal_jobs_and_their_artifacts_survive_restart() {
    let world = world();

    let manager = JobManager::new(&world.layout.job_data_root, Some(50)).unwrap();
    let id = JobId::from_string("job-done");
    manager.create(&id).unwrap();
    manager
        .update(
            &id,
            JobUpdate::status(JobStatus::Completed)
                .with_progress(100.0)
                .with_message("Video generated successfully!"),
        )
        .unwrap();
    let ws = world.layout.job_workspace("job-done");
    std::fs::create_dir_all(&ws.job_dir).unwrap();
    std::fs::write(ws.final_video_path(), b"mp4").unwrap();
    std::fs::write(ws.video_info_path(), b"{}").unwrap();

    let manager = Arc::new(JobManager::new(&world.layout.job_data_root, Some(50)).unwrap());
    let mut lifecycle = lifecycle_for(&world, Arc::clone(&manager));
    lifecycle.run_startup().await.unwrap();
    lifecycle.run_shutdown().await;

    let job = manager.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!((job.progress - 100.0).abs() < f64::EPSILON);
    assert!(ws.final_video_path().exists());
    assert!(ws.video_info_path().exists());
}
