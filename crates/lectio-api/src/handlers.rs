//! Route handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use lectio_models::{Job, JobId, JobStatus, JobUpdate, SectionStatus, VideoMode};
use lectio_pipeline::{
    analyzer::resolve_topic_payload, Analyzer, GenerationParams, ProgressTracker,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const ALLOWED_EXTENSIONS: &[&str] = &[".pdf", ".png", ".jpg", ".jpeg", ".txt", ".md"];

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let ext = std::path::Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ApiError::bad_request(format!(
                "unsupported file extension '{ext}'; allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {e}")))?;
        let file_id = Uuid::new_v4().to_string();
        let path = state.layout.uploads_root.join(format!("{file_id}{ext}"));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ApiError::internal(format!("failed to store upload: {e}")))?;

        info!(%file_id, size = bytes.len(), "Upload stored");
        return Ok(Json(UploadResponse {
            file_id,
            filename,
            size: bytes.len() as u64,
            content_type,
        }));
    }
    Err(ApiError::bad_request("multipart body has no 'file' field"))
}

// ---------------------------------------------------------------------------
// Analyze
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub file_id: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<Value>> {
    let file_path = state
        .layout
        .find_upload(&request.file_id)
        .ok_or_else(|| ApiError::not_found(format!("upload {} not found", request.file_id)))?;

    let analyzer = Analyzer::new(state.llm.as_ref());
    let record = analyzer
        .analyze(&request.file_id, &file_path, &request.language)
        .await?;
    state.analysis_repo.save(&record)?;

    Ok(Json(serde_json::to_value(&record).map_err(|e| {
        ApiError::internal(format!("serialization failed: {e}"))
    })?))
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct GenerateRequestBody {
    pub file_id: String,
    #[serde(default)]
    pub analysis_id: String,
    #[serde(default)]
    pub selected_topics: Vec<usize>,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub video_mode: Option<String>,
    #[serde(default)]
    pub content_focus: Option<String>,
    #[serde(default)]
    pub document_context: Option<String>,
    #[serde(default)]
    pub resume_job_id: Option<String>,
}

fn default_voice() -> String {
    "Charon".to_string()
}

fn default_style() -> String {
    "dark".to_string()
}

#[derive(Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub status: String,
    pub progress: f64,
    pub message: String,
}

fn parse_video_mode(raw: Option<&str>) -> VideoMode {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("comprehensive") => VideoMode::Comprehensive,
        _ => VideoMode::Overview,
    }
}

fn normalize_content_focus(raw: Option<&str>) -> String {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some(value @ ("practice" | "theory" | "as_document")) => value.to_string(),
        _ => "as_document".to_string(),
    }
}

fn normalize_document_context(raw: Option<&str>) -> String {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("part-of-series") | Some("series") => "series".to_string(),
        Some("standalone") => "standalone".to_string(),
        _ => "auto".to_string(),
    }
}

pub async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequestBody>,
) -> ApiResult<Json<JobResponse>> {
    // Select or create the job.
    let (job_id, resume) = match body
        .resume_job_id
        .as_deref()
        .map(JobId::from_string)
        .and_then(|id| state.job_manager.get(&id).map(|_| id))
    {
        Some(existing) => {
            state.job_manager.update(
                &existing,
                JobUpdate::status(JobStatus::Analyzing)
                    .with_progress(0.0)
                    .with_message("Resuming generation..."),
            )?;
            (existing, true)
        }
        None => {
            let id = JobId::new();
            state.job_manager.create(&id)?;
            (id, false)
        }
    };

    let tracker = ProgressTracker::new(&state.layout, job_id.as_str());
    let has_script = tracker.check_existing_progress().has_script;

    // Resolve the upload; optional only for resumes with a script on disk.
    let material_path = state.layout.find_upload(&body.file_id);
    if material_path.is_none() && !(resume && has_script) {
        return Err(ApiError::bad_request(
            "uploaded file not found; upload again or resume a job with an existing script",
        ));
    }

    // Topic payload from the persisted analysis, unless resuming onto an
    // existing script.
    let topic_payload: Option<Value> = if resume && has_script {
        None
    } else {
        let analysis = state.analysis_repo.get(&body.analysis_id).ok_or_else(|| {
            ApiError::bad_request(
                "Analysis not found for provided analysis_id. Please analyze the file again before generating.",
            )
        })?;
        if analysis.file_id != body.file_id {
            return Err(ApiError::bad_request("analysis_id does not match file_id"));
        }
        Some(resolve_topic_payload(&analysis, &body.selected_topics)?)
    };

    let params = GenerationParams {
        job_id: job_id.as_str().to_string(),
        material_path,
        topic_payload,
        voice: body.voice,
        style: body.style,
        language: body.language,
        video_mode: parse_video_mode(body.video_mode.as_deref()),
        content_focus: normalize_content_focus(body.content_focus.as_deref()),
        document_context: normalize_document_context(body.document_context.as_deref()),
        resume,
    };

    spawn_generation(state.clone(), job_id.clone(), params);

    Ok(Json(JobResponse {
        job_id: job_id.as_str().to_string(),
        status: if resume { "resuming" } else { "pending" }.to_string(),
        progress: 0.0,
        message: if resume {
            "Resuming video generation..."
        } else {
            "Video generation started"
        }
        .to_string(),
    }))
}

/// Run the pipeline in a background task, forwarding progress into the job
/// manager and recording the terminal state.
fn spawn_generation(state: AppState, job_id: JobId, params: GenerationParams) {
    tokio::spawn(async move {
        let manager = Arc::clone(&state.job_manager);
        let callback_manager = Arc::clone(&manager);
        let callback_job = job_id.clone();
        let tracker = Arc::new(
            ProgressTracker::new(&state.layout, job_id.as_str()).with_callback(Box::new(
                move |report| {
                    let update = JobUpdate::status(report.status)
                        .with_progress(report.progress)
                        .with_message(report.message);
                    if let Err(e) = callback_manager.update(&callback_job, update) {
                        error!(job_id = %callback_job, error = %e, "Progress update failed");
                    }
                },
            )),
        );

        match state.generator.generate_video(params, tracker).await {
            Ok(result) => {
                let update = JobUpdate::status(JobStatus::Completed)
                    .with_progress(100.0)
                    .with_message("Video generated successfully!")
                    .with_result(vec![result]);
                if let Err(e) = manager.update(&job_id, update) {
                    error!(job_id = %job_id, error = %e, "Failed to persist completion");
                }
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Generation failed");
                let update = JobUpdate::status(JobStatus::Failed)
                    .with_progress(0.0)
                    .with_message(e.user_message())
                    .with_error(format!("{e:?}"));
                if let Err(persist_err) = manager.update(&job_id, update) {
                    error!(job_id = %job_id, error = %persist_err, "Failed to persist failure");
                }
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: Job,
    pub sections: BTreeMap<usize, SectionStatus>,
    pub completed_sections: usize,
    pub total_sections: usize,
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobDetail>> {
    let id = JobId::from_string(&job_id);
    let job = state
        .job_manager
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;

    let tracker = ProgressTracker::new(&state.layout, &job_id);
    let progress = tracker.check_existing_progress();

    // Live per-section state; tolerate missing or partial files.
    let workspace = state.layout.job_workspace(&job_id);
    let mut sections = BTreeMap::new();
    for index in 0..progress.total_sections {
        let path = workspace.section_status_path(index);
        if let Ok(bytes) = std::fs::read(&path) {
            if let Ok(status) = serde_json::from_slice::<SectionStatus>(&bytes) {
                sections.insert(index, status);
            }
        }
    }

    Ok(Json(JobDetail {
        job,
        sections,
        completed_sections: progress.completed_sections.len(),
        total_sections: progress.total_sections,
    }))
}

#[derive(Serialize)]
pub struct ResumeInfo {
    pub can_resume: bool,
    pub completed_sections: usize,
    pub total_sections: usize,
}

pub async fn get_resume_info(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ResumeInfo>> {
    let id = JobId::from_string(&job_id);
    let job = state
        .job_manager
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;

    let progress = ProgressTracker::new(&state.layout, &job_id).check_existing_progress();
    let can_resume =
        job.status == JobStatus::Failed && progress.has_script && !progress.has_final_video;

    Ok(Json(ResumeInfo {
        can_resume,
        completed_sections: progress.completed_sections.len(),
        total_sections: progress.total_sections,
    }))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = JobId::from_string(&job_id);
    let last = state
        .job_manager
        .delete(&id)?
        .ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;
    Ok(Json(serde_json::to_value(&last).map_err(|e| {
        ApiError::internal(format!("serialization failed: {e}"))
    })?))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.job_manager.list_all())
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_mode() {
        assert_eq!(
            parse_video_mode(Some("comprehensive")),
            VideoMode::Comprehensive
        );
        assert_eq!(parse_video_mode(Some("OVERVIEW")), VideoMode::Overview);
        assert_eq!(parse_video_mode(Some("garbage")), VideoMode::Overview);
        assert_eq!(parse_video_mode(None), VideoMode::Overview);
    }

    #[test]
    fn test_normalize_content_focus() {
        assert_eq!(normalize_content_focus(Some("Practice")), "practice");
        assert_eq!(normalize_content_focus(Some("theory")), "theory");
        assert_eq!(normalize_content_focus(Some("whatever")), "as_document");
        assert_eq!(normalize_content_focus(None), "as_document");
    }

    #[test]
    fn test_normalize_document_context() {
        assert_eq!(
            normalize_document_context(Some("part-of-series")),
            "series"
        );
        assert_eq!(normalize_document_context(Some("standalone")), "standalone");
        assert_eq!(normalize_document_context(Some("x")), "auto");
        assert_eq!(normalize_document_context(None), "auto");
    }
}
