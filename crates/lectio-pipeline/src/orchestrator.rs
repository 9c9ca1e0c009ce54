//! Per-job pipeline driver: analyze → script → sections → composite.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use lectio_anim::{AnimationRefiner, RefinerConfig};
use lectio_llm::LlmClient;
use lectio_media::{concatenate_videos, generate_thumbnail, get_duration};
use lectio_models::{Script, VideoChapter, VideoInfo, VideoMode, VideoResult};
use lectio_store::{scripts, video_info, JobWorkspace, StoreLayout};
use lectio_tts::TtsEngine;

use crate::analyzer::{Analyzer, AnalysisRepository};
use crate::error::{PipelineError, PipelineResult};
use crate::progress::ProgressTracker;
use crate::script_gen::{validate_script, ScriptGenerator};
use crate::section_worker::SectionWorker;

/// Inputs for one generation run.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub job_id: String,
    pub material_path: Option<PathBuf>,
    /// Topic payload resolved from a persisted analysis; absent on resume
    /// runs that already have a script on disk.
    pub topic_payload: Option<Value>,
    pub voice: String,
    pub style: String,
    pub language: String,
    pub video_mode: VideoMode,
    pub content_focus: String,
    pub document_context: String,
    pub resume: bool,
}

/// The per-job pipeline driver.
pub struct VideoGenerator {
    layout: StoreLayout,
    llm: Arc<dyn LlmClient>,
    tts: Arc<dyn TtsEngine>,
    refiner_config: RefinerConfig,
    analysis_repo: Arc<AnalysisRepository>,
    section_parallelism: usize,
}

impl VideoGenerator {
    pub fn new(
        layout: StoreLayout,
        llm: Arc<dyn LlmClient>,
        tts: Arc<dyn TtsEngine>,
        refiner_config: RefinerConfig,
        analysis_repo: Arc<AnalysisRepository>,
        section_parallelism: usize,
    ) -> Self {
        Self {
            layout,
            llm,
            tts,
            refiner_config,
            analysis_repo,
            section_parallelism: section_parallelism.max(1),
        }
    }

    /// Drive one job to a final video. Artifacts stay on disk for resume
    /// when any stage fails.
    pub async fn generate_video(
        &self,
        params: GenerationParams,
        tracker: Arc<ProgressTracker>,
    ) -> PipelineResult<VideoResult> {
        let workspace = self.layout.job_workspace(&params.job_id);
        tokio::fs::create_dir_all(&workspace.job_dir).await?;

        let snapshot = tracker.check_existing_progress();

        // Stage 1+2: analysis and script, skipped entirely when resuming
        // onto an existing script.
        let script = if params.resume && snapshot.has_script {
            info!(job_id = %params.job_id, "Resuming with existing script");
            tracker.report_stage_progress("script", 100.0, "Reusing existing script");
            snapshot.script.clone().expect("snapshot with has_script")
        } else {
            self.produce_script(&params, &workspace, &tracker).await?
        };
        validate_script(&script)?;

        // Stage 3: sections, bounded-parallel, resume-aware.
        let completed = if params.resume {
            snapshot.completed_sections.clone()
        } else {
            Default::default()
        };
        let total = script.sections.len();
        let video_mode = script.video_mode.unwrap_or(params.video_mode);

        let pending: Vec<usize> = (0..total).filter(|i| !completed.contains(i)).collect();
        info!(
            job_id = %params.job_id,
            total,
            cached = completed.len(),
            pending = pending.len(),
            "Starting section stage"
        );
        tracker.report_section_progress(completed.len(), total);

        let refiner = Arc::new(AnimationRefiner::new(
            Arc::clone(&self.llm),
            self.refiner_config.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.section_parallelism));
        let done_counter = Arc::new(AtomicUsize::new(completed.len()));

        let mut handles = Vec::new();
        for index in pending {
            let section = script.sections[index].clone();
            let worker = SectionWorker::new(
                Arc::clone(&self.tts),
                Arc::clone(&refiner),
                self.layout.job_workspace(&params.job_id),
                params.voice.clone(),
                params.language.clone(),
            );
            let semaphore = Arc::clone(&semaphore);
            let tracker = Arc::clone(&tracker);
            let done = Arc::clone(&done_counter);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("section semaphore closed");
                let result = worker.process(&section, index, video_mode).await;
                if result.is_ok() {
                    let completed_now = done.fetch_add(1, Ordering::SeqCst) + 1;
                    tracker.report_section_progress(completed_now, total);
                }
                (index, result)
            }));
        }

        let mut first_failure: Option<PipelineError> = None;
        for handle in handles {
            match handle.await {
                Ok((_, Ok(_))) => {}
                Ok((index, Err(e))) => {
                    warn!(section = index, error = %e, "Section worker failed");
                    first_failure.get_or_insert(e);
                }
                Err(join_err) => {
                    first_failure
                        .get_or_insert(PipelineError::section_failed(0, join_err.to_string()));
                }
            }
        }
        if let Some(e) = first_failure {
            return Err(e);
        }

        // Stage 4: composite.
        tracker.report_stage_progress("combining", 0.0, "Combining sections...");
        let result = composite_job(&self.layout, &params.job_id, &script).await?;
        tracker.report_stage_progress("combining", 100.0, "Video generation complete!");

        // Success-path prune: keep only the durable artifacts.
        prune_after_success(&workspace).await;

        Ok(result)
    }

    async fn produce_script(
        &self,
        params: &GenerationParams,
        workspace: &JobWorkspace,
        tracker: &ProgressTracker,
    ) -> PipelineResult<Script> {
        // Analysis stage: already persisted when the topic payload carries
        // a matching analysis_id; only analyze here when the caller sent a
        // bare document.
        tracker.report_stage_progress("analysis", 0.0, "Analyzing material...");
        let topic_payload = match &params.topic_payload {
            Some(payload) => {
                let known = payload["analysis_id"]
                    .as_str()
                    .map(|id| self.analysis_repo.get(id).is_some())
                    .unwrap_or(false);
                if !known {
                    warn!(job_id = %params.job_id, "Topic payload has no persisted analysis, proceeding with payload as-is");
                }
                payload.clone()
            }
            None => {
                let material = params.material_path.as_ref().ok_or_else(|| {
                    PipelineError::invalid_input(
                        "generation needs either a topic payload or a source document",
                    )
                })?;
                let analyzer = Analyzer::new(self.llm.as_ref());
                let record = analyzer
                    .analyze("adhoc", material, &params.language)
                    .await?;
                self.analysis_repo.save(&record)?;
                let all: Vec<usize> = (0..record.suggested_topics.len()).collect();
                crate::analyzer::resolve_topic_payload(&record, &all)?
            }
        };
        tracker.report_stage_progress("analysis", 100.0, "Analysis ready");

        tracker.report_stage_progress("script", 0.0, "Generating script...");
        let generator = ScriptGenerator::new(self.llm.as_ref());
        let script = generator
            .generate(
                &topic_payload,
                &params.content_focus,
                &params.document_context,
                &params.language,
                params.video_mode,
            )
            .await?;
        scripts::save_script(&workspace.script_path(), &script)?;
        tracker.report_stage_progress("script", 100.0, "Script ready");
        Ok(script)
    }
}

/// Concatenate finished section videos into the final MP4, compute
/// chapters, write the thumbnail and the durable `video_info.json`, and
/// return the job result record.
///
/// Also used standalone by startup recovery when every section is already
/// on disk.
pub async fn composite_job(
    layout: &StoreLayout,
    job_id: &str,
    script: &Script,
) -> PipelineResult<VideoResult> {
    let workspace = layout.job_workspace(job_id);

    let mut inputs = Vec::new();
    let mut chapter_durations = Vec::new();
    for (index, section) in script.sections.iter().enumerate() {
        let Some(video) = workspace.find_section_video(index) else {
            return Err(PipelineError::CompositeFailed(format!(
                "section {index} video missing"
            )));
        };
        // Prefer measured durations; fall back to the planned ones.
        let duration = get_duration(&video)
            .await
            .unwrap_or_else(|_| section.planned_duration());
        chapter_durations.push(duration);
        inputs.push(video);
    }
    if inputs.is_empty() {
        return Err(PipelineError::CompositeFailed(
            "no section videos to combine".to_string(),
        ));
    }

    let final_path = workspace.final_video_path();
    concatenate_videos(&inputs, &workspace.concat_list_path(), &final_path).await?;

    let total_duration = get_duration(&final_path)
        .await
        .unwrap_or_else(|_| chapter_durations.iter().sum());

    let mut chapters = Vec::new();
    let mut cursor = 0.0;
    for (section, duration) in script.sections.iter().zip(&chapter_durations) {
        chapters.push(VideoChapter {
            title: section.title.clone(),
            start_time: cursor,
            duration: *duration,
        });
        cursor += duration;
    }

    let thumbnail_url = match generate_thumbnail(
        &final_path,
        workspace.thumbnail_path(),
        (total_duration / 2.0).min(5.0),
    )
    .await
    {
        Ok(()) => Some(format!("/outputs/{job_id}/thumbnail.jpg")),
        Err(e) => {
            warn!(error = %e, "Thumbnail generation failed");
            None
        }
    };

    let result = VideoResult {
        video_id: job_id.to_string(),
        title: if script.title.is_empty() {
            "Educational Video".to_string()
        } else {
            script.title.clone()
        },
        duration: total_duration,
        chapters,
        download_url: format!("/outputs/{job_id}/final_video.mp4"),
        thumbnail_url,
    };

    let info = VideoInfo::from_result(job_id, &result);
    video_info::save_video_info(layout, &info)?;

    info!(job_id, duration = total_duration, "Composite complete");
    Ok(result)
}

/// Remove intermediates after a successful run, keeping the final video,
/// its metadata, the thumbnail, and translations.
pub async fn prune_after_success(workspace: &JobWorkspace) {
    for path in [
        workspace.sections_dir(),
        workspace.job_dir.join("qc_frames"),
    ] {
        if path.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                warn!(path = %path.display(), error = %e, "Success-path prune failed");
            }
        }
    }
    for path in [workspace.script_path(), workspace.concat_list_path()] {
        if path.exists() {
            tokio::fs::remove_file(&path).await.ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectio_models::Section;

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

    #[tokio::test]
    async fn test_composite_fails_on_missing_section_video() {
        let (_tmp, layout) = layout();
        let script = Script {
            sections: vec![Section::default()],
            ..Default::default()
        };
        let err = composite_job(&layout, "j1", &script).await.unwrap_err();
        assert!(matches!(err, PipelineError::CompositeFailed(_)));
    }

    #[tokio::test]
    async fn test_prune_keeps_protected_artifacts() {
        let (_tmp, layout) = layout();
        let ws = layout.job_workspace("j1");
        std::fs::create_dir_all(ws.section_dir(0)).unwrap();
        std::fs::create_dir_all(ws.translations_dir().join("es")).unwrap();
        std::fs::write(ws.script_path(), b"{}").unwrap();
        std::fs::write(ws.final_video_path(), b"v").unwrap();
        std::fs::write(ws.video_info_path(), b"{}").unwrap();
        std::fs::write(ws.thumbnail_path(), b"t").unwrap();
        std::fs::write(ws.concat_list_path(), b"l").unwrap();

        prune_after_success(&ws).await;

        assert!(!ws.sections_dir().exists());
        assert!(!ws.script_path().exists());
        assert!(!ws.concat_list_path().exists());
        assert!(ws.final_video_path().exists());
        assert!(ws.video_info_path().exists());
        assert!(ws.thumbnail_path().exists());
        assert!(ws.translations_dir().join("es").exists());
    }
}
