//! Stage 3 driver: the validate → repair loop around the plan and
//! implementation stages.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use lectio_llm::{Content, FunctionCall, GenerateRequest, LlmClient, Part};
use lectio_models::{Section, SegmentAudio, ValidationIssue, ValidationResult};

use crate::choreographer::Choreographer;
use crate::error::{AnimError, AnimResult};
use crate::fixer::{fix_issues, fix_known_patterns};
use crate::implementer::Implementer;
use crate::inject::inject_spatial_checks;
use crate::qc::VisionQc;
use crate::render::{parse_stderr_issues, render, RenderRequest};
use crate::scene_file::{find_scene_class, Quality, SceneFileManager};
use crate::timing::adjust_to_duration;
use crate::tools::{inspect_frames_declaration, search_replace, search_replace_declaration};
use crate::validate::{check_balance, validate_static};

/// Refiner tuning knobs.
#[derive(Debug, Clone)]
pub struct RefinerConfig {
    /// Inner repair attempts per pipeline pass
    pub max_attempts: u32,
    /// Full pipeline passes (plan → implement → refine)
    pub max_clean_retries: u32,
    pub base_temperature: f64,
    /// Added per outer pass; capped at 0.5
    pub temperature_increment: f64,
    /// Wall-clock budget per renderer invocation
    pub render_timeout_secs: u64,
    pub final_quality: Quality,
    /// Scene background from the style theme
    pub background_color: String,
    /// Turns allowed in one surgical-edit conversation
    pub max_edit_turns: u32,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_clean_retries: 2,
            base_temperature: 0.7,
            temperature_increment: 0.3,
            render_timeout_secs: 600,
            final_quality: Quality::Medium,
            background_color: "#101418".to_string(),
            max_edit_turns: 3,
        }
    }
}

impl RefinerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(timeout) = std::env::var("RENDER_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.render_timeout_secs = timeout;
        }
        config
    }

    fn temperature_for_pass(&self, pass: u32) -> f64 {
        (self.base_temperature + pass as f64 * self.temperature_increment.min(0.5)).min(2.0)
    }
}

/// Everything the refiner needs about one section.
#[derive(Debug, Clone)]
pub struct SectionContext {
    pub section: Section,
    pub section_index: usize,
    pub segments: Vec<SegmentAudio>,
    pub audio_duration: f64,
    pub section_dir: PathBuf,
    pub language: String,
}

/// A finished section animation.
#[derive(Debug, Clone)]
pub struct AnimationOutput {
    pub video_path: PathBuf,
    pub scene_code: String,
    pub scene_code_path: PathBuf,
    pub choreography_plan_path: PathBuf,
    pub validation: ValidationResult,
}

struct LoopOutcome {
    code: String,
    validation: ValidationResult,
    /// Low-confidence issues deferred to vision QC against real frames
    parked: Vec<ValidationIssue>,
}

pub struct AnimationRefiner {
    client: Arc<dyn LlmClient>,
    config: RefinerConfig,
}

impl AnimationRefiner {
    pub fn new(client: Arc<dyn LlmClient>, config: RefinerConfig) -> Self {
        Self { client, config }
    }

    /// Produce the scene video for one section.
    pub async fn generate(&self, ctx: &SectionContext) -> AnimResult<AnimationOutput> {
        let files = SceneFileManager::new(&ctx.section_dir, ctx.section_index);
        let mut whitelist: HashSet<String> = HashSet::new();
        let mut last_error: Option<AnimError> = None;

        for pass in 0..=self.config.max_clean_retries {
            let temperature = self.config.temperature_for_pass(pass);
            info!(
                section = ctx.section_index,
                pass, temperature, "Starting animation pipeline pass"
            );
            match self
                .attempt_pipeline(ctx, &files, temperature, &mut whitelist)
                .await
            {
                Ok(output) => return Ok(output),
                Err(e) => {
                    warn!(
                        section = ctx.section_index,
                        pass,
                        error = %e,
                        "Animation pass failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Err(AnimError::refinement(format!(
            "section {} did not stabilize after {} passes: {detail}",
            ctx.section_index,
            self.config.max_clean_retries + 1
        )))
    }

    async fn attempt_pipeline(
        &self,
        ctx: &SectionContext,
        files: &SceneFileManager,
        temperature: f64,
        whitelist: &mut HashSet<String>,
    ) -> AnimResult<AnimationOutput> {
        // Stage 1: plan.
        let choreographer = Choreographer::new(self.client.as_ref());
        let (plan, raw_plan) = choreographer
            .plan(&ctx.section, &ctx.segments, ctx.audio_duration, temperature)
            .await?;
        let plan_path = files.write_plan(&raw_plan).await?;

        // Stage 2: implement.
        let implementer = Implementer::new(self.client.as_ref());
        let code = implementer
            .implement(
                &ctx.section,
                &plan,
                ctx.audio_duration,
                &self.config.background_color,
                &ctx.language,
                temperature,
            )
            .await?;

        // Stage 3: refine until no critical issues remain.
        let outcome = self.refine_loop(code, ctx, files, whitelist).await?;
        let mut code = outcome.code;
        let mut validation = outcome.validation;

        // Final render at full quality.
        let mut video_path = self.final_render(&code, ctx, files).await?;

        // Vision QC: verify parked low-confidence issues against real
        // frames; confirmed ones re-open the loop exactly once.
        if !outcome.parked.is_empty() {
            let qc = VisionQc::new(self.client.as_ref());
            let duration = lectio_media::get_duration(&video_path)
                .await
                .unwrap_or(ctx.audio_duration);
            let verdicts = qc
                .verify(
                    &video_path,
                    duration,
                    &ctx.section.title,
                    outcome.parked,
                    &ctx.section_dir.join("qc_frames"),
                )
                .await;

            for cleared in &verdicts.whitelisted {
                if let Some(key) = &cleared.whitelist_key {
                    whitelist.insert(key.clone());
                }
            }

            if !verdicts.confirmed.is_empty() {
                info!(
                    confirmed = verdicts.confirmed.len(),
                    "Vision QC confirmed issues, re-opening repair once"
                );
                let repaired = self
                    .repair_once(&code, verdicts.confirmed, ctx, Some(&video_path))
                    .await;
                if repaired != code {
                    code = adjust_to_duration(&code_with_patterns(&repaired), ctx.audio_duration);
                    video_path = self.final_render(&code, ctx, files).await?;
                }
                validation = validate_static(&code);
            }
        }

        let scene_code_path = files.write_scene(&code).await?;
        Ok(AnimationOutput {
            video_path,
            scene_code: code,
            scene_code_path,
            choreography_plan_path: plan_path,
            validation,
        })
    }

    async fn refine_loop(
        &self,
        code: String,
        ctx: &SectionContext,
        files: &SceneFileManager,
        whitelist: &HashSet<String>,
    ) -> AnimResult<LoopOutcome> {
        let mut code = code;
        let mut parked: Vec<ValidationIssue> = Vec::new();
        let mut parked_keys: HashSet<String> = HashSet::new();

        for attempt in 0..self.config.max_attempts {
            // Deterministic ground work on every pass.
            code = code_with_patterns(&code);
            code = adjust_to_duration(&code, ctx.audio_duration);

            // Static validation plus deterministic fixes for what it found.
            let static_issues: Vec<ValidationIssue> = validate_static(&code)
                .issues
                .into_iter()
                .filter(|i| !whitelist.contains(&i.dedup_key()))
                .collect();
            let (fixed, mut issues, fix_count) = fix_issues(&code, static_issues);
            code = fixed;
            if fix_count > 0 {
                debug!(attempt, fix_count, "Deterministic fixes applied");
            }

            // Runtime probe with the injected spatial checker.
            let probe_issues = self.runtime_probe(&code, ctx, files).await?;
            issues.extend(
                probe_issues
                    .into_iter()
                    .filter(|i| !whitelist.contains(&i.dedup_key())),
            );

            // Park what needs verification; act on the rest.
            let (to_verify, actionable): (Vec<_>, Vec<_>) =
                issues.into_iter().partition(|i| i.needs_verification());
            for issue in to_verify {
                if parked_keys.insert(issue.dedup_key()) {
                    parked.push(issue);
                }
            }

            let result = ValidationResult::from_issues(actionable.clone());
            if result.valid {
                info!(
                    section = ctx.section_index,
                    attempt, "Scene converged with no critical issues"
                );
                return Ok(LoopOutcome {
                    code,
                    validation: result,
                    parked,
                });
            }

            // Repair: deterministic first, then surgical LLM edits.
            let (after_fix, remaining, _) = fix_issues(&code, actionable);
            code = after_fix;
            let llm_targets: Vec<ValidationIssue> = remaining
                .into_iter()
                .filter(|i| i.requires_llm())
                .collect();
            if !llm_targets.is_empty() {
                code = self.repair_once(&code, llm_targets, ctx, None).await;
            }
        }

        Err(AnimError::refinement(format!(
            "critical issues persisted through {} repair attempts",
            self.config.max_attempts
        )))
    }

    /// Dry-run render: executes `construct` (and the injected checker)
    /// without assembling video. Stderr is triaged into issues even when
    /// the process exits zero.
    async fn runtime_probe(
        &self,
        code: &str,
        ctx: &SectionContext,
        files: &SceneFileManager,
    ) -> AnimResult<Vec<ValidationIssue>> {
        let probed = inject_spatial_checks(code);
        let scene_class = find_scene_class(&probed)
            .ok_or_else(|| AnimError::implementation("scene class disappeared during probe"))?;

        let probe_path = ctx
            .section_dir
            .join(format!("probe_scene_{}.py", ctx.section_index));
        tokio::fs::create_dir_all(&ctx.section_dir).await?;
        tokio::fs::write(&probe_path, &probed).await?;

        let outcome = render(&RenderRequest {
            scene_file: probe_path.clone(),
            scene_class,
            quality: Quality::Low,
            media_dir: files.probe_media_dir(),
            dry_run: true,
            timeout_secs: self.config.render_timeout_secs,
        })
        .await?;

        tokio::fs::remove_file(&probe_path).await.ok();

        let issues = parse_stderr_issues(&outcome.stderr);
        if !outcome.success && issues.is_empty() {
            // Non-zero exit with nothing parseable still blocks the scene.
            return Ok(vec![ValidationIssue::new(
                lectio_models::Severity::Critical,
                lectio_models::Confidence::High,
                lectio_models::IssueCategory::Runtime,
                format!(
                    "renderer probe failed: {}",
                    outcome.stderr.lines().last().unwrap_or("no stderr")
                ),
            )]);
        }
        Ok(issues)
    }

    async fn final_render(
        &self,
        code: &str,
        ctx: &SectionContext,
        files: &SceneFileManager,
    ) -> AnimResult<PathBuf> {
        let scene_class = find_scene_class(code)
            .ok_or_else(|| AnimError::implementation("scene class missing at render time"))?;
        let scene_path = files.write_scene(code).await?;

        let mut quality = self.config.final_quality;
        files.cleanup_render_artifacts(quality).await;

        let request = RenderRequest {
            scene_file: scene_path.clone(),
            scene_class: scene_class.clone(),
            quality,
            media_dir: files.media_dir(),
            dry_run: false,
            timeout_secs: self.config.render_timeout_secs,
        };

        match render(&request).await {
            Ok(outcome) if outcome.success => {}
            Ok(outcome) => {
                // One retry at reduced quality after a failed render.
                warn!(
                    stderr_tail = outcome.stderr.lines().last().unwrap_or(""),
                    "Final render failed, retrying at reduced quality"
                );
                quality = quality.reduced();
                let retry = render(&RenderRequest {
                    quality,
                    ..request.clone()
                })
                .await?;
                if !retry.success {
                    return Err(AnimError::rendering(format!(
                        "renderer exited non-zero: {}",
                        retry.stderr.lines().last().unwrap_or("no stderr")
                    )));
                }
            }
            Err(e) => {
                warn!(error = %e, "Final render errored, retrying at reduced quality");
                quality = quality.reduced();
                let retry = render(&RenderRequest {
                    quality,
                    ..request.clone()
                })
                .await?;
                if !retry.success {
                    return Err(AnimError::rendering(format!(
                        "renderer exited non-zero: {}",
                        retry.stderr.lines().last().unwrap_or("no stderr")
                    )));
                }
            }
        }

        files
            .find_rendered_video(&scene_class, quality)
            .ok_or_else(|| {
                AnimError::rendering("renderer exited successfully but produced no output file")
            })
    }

    /// One surgical-edit conversation over the current code. Returns the
    /// (possibly unchanged) code; edit failures leave the input intact.
    async fn repair_once(
        &self,
        code: &str,
        issues: Vec<ValidationIssue>,
        ctx: &SectionContext,
        rendered_video: Option<&PathBuf>,
    ) -> String {
        let mut current = code.to_string();

        let mut issue_list = String::new();
        for issue in &issues {
            let line = issue
                .line
                .map(|l| format!(" (line {l})"))
                .unwrap_or_default();
            issue_list.push_str(&format!(
                "- [{}]{} {}\n",
                issue.category.as_str(),
                line,
                issue.message
            ));
        }

        let prompt = format!(
            r#"This Manim scene has validation failures. Fix them with the `search_replace` tool; each call must match exactly one location. You may call `inspect_frames` to see the rendered scene at a timestamp before deciding.

Issues:
{issue_list}
Current code:
```python
{current}
```"#
        );

        let tools = vec![search_replace_declaration(), inspect_frames_declaration()];
        let mut contents = vec![Content::user_text(prompt)];

        for _turn in 0..self.config.max_edit_turns {
            let request = GenerateRequest::new(self.client.default_model(), contents.clone())
                .with_tools(tools.clone())
                .with_temperature(0.4);
            let response = match self.client.generate(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "Surgical edit call failed");
                    return current;
                }
            };

            if response.function_calls.is_empty() {
                break;
            }

            let mut reply_parts: Vec<Part> = Vec::new();
            let mut model_parts: Vec<Part> = Vec::new();
            for call in &response.function_calls {
                model_parts.push(Part::function_call(call.clone()));
                let (outcome, frame) = self.execute_edit_call(&mut current, call, rendered_video, ctx).await;
                reply_parts.push(Part::function_response(call.name.clone(), outcome));
                if let Some((bytes, mime)) = frame {
                    reply_parts.push(Part::image(&bytes, mime));
                }
            }
            contents.push(Content::model(model_parts));
            contents.push(Content::user(reply_parts));
        }

        current
    }

    async fn execute_edit_call(
        &self,
        current: &mut String,
        call: &FunctionCall,
        rendered_video: Option<&PathBuf>,
        ctx: &SectionContext,
    ) -> (serde_json::Value, Option<(Vec<u8>, String)>) {
        match call.name.as_str() {
            "search_replace" => {
                let search = call.args["search"].as_str().unwrap_or("");
                let replace = call.args["replace"].as_str().unwrap_or("");
                match search_replace(current, search, replace) {
                    Ok(new_code) => {
                        if check_balance(&new_code).is_empty() {
                            *current = new_code;
                            (json!({"status": "success"}), None)
                        } else {
                            (
                                json!({"status": "error", "error": "replacement breaks bracket balance"}),
                                None,
                            )
                        }
                    }
                    Err(e) => (json!({"status": "error", "error": e}), None),
                }
            }
            "inspect_frames" => {
                let timestamp = call.args["timestamp_seconds"].as_f64().unwrap_or(0.0);
                let Some(video) = rendered_video else {
                    return (
                        json!({"status": "error", "error": "no rendered video available yet"}),
                        None,
                    );
                };
                let frame_path = ctx
                    .section_dir
                    .join(format!("inspect_{:.1}.png", timestamp));
                match crate::qc::extract_frame(video, timestamp, &frame_path).await {
                    Ok(_) => match tokio::fs::read(&frame_path).await {
                        Ok(bytes) => (
                            json!({"status": "success", "note": "frame attached"}),
                            Some((bytes, "image/png".to_string())),
                        ),
                        Err(e) => (json!({"status": "error", "error": e.to_string()}), None),
                    },
                    Err(e) => (json!({"status": "error", "error": e.to_string()}), None),
                }
            }
            other => (
                json!({"status": "error", "error": format!("Unknown tool: {other}")}),
                None,
            ),
        }
    }
}

fn code_with_patterns(code: &str) -> String {
    fix_known_patterns(code).0
}
