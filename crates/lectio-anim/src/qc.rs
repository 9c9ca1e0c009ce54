//! Vision QC: verify low-confidence issues against real frames.
//!
//! Keyframes around each issue's timestamp go to the multimodal model,
//! which classifies every issue REAL or FALSE_POSITIVE. Confirmed issues
//! re-enter the repair loop; cleared ones get a whitelist key so later
//! validator passes stop re-reporting them.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use lectio_llm::{gemini::parse_json_lenient, Content, GenerateRequest, LlmClient, Part};
use lectio_models::{dedup_frame_captures, FrameCapture, ValidationIssue};

use crate::error::AnimResult;

/// Outcome of one verification pass.
#[derive(Debug, Default)]
pub struct QcVerdicts {
    /// Issues the model confirmed as real defects.
    pub confirmed: Vec<ValidationIssue>,
    /// False positives, stamped with a whitelist key.
    pub whitelisted: Vec<ValidationIssue>,
    /// Issues that could not be verified (QC failure); neither acted on
    /// nor whitelisted.
    pub unverified: Vec<ValidationIssue>,
}

/// Extract one frame at `timestamp` into `output`.
pub async fn extract_frame(
    video: &Path,
    timestamp: f64,
    output: &Path,
) -> AnimResult<FrameCapture> {
    let cmd = lectio_media::FfmpegCommand::new(video, output)
        .seek(timestamp.max(0.0))
        .single_frame();
    lectio_media::FfmpegRunner::new().run(&cmd).await?;
    Ok(FrameCapture {
        screenshot_path: output.to_path_buf(),
        timestamp_seconds: timestamp,
        event_ids: Vec::new(),
    })
}

/// Timestamps worth inspecting for an issue: its own detail timestamp when
/// present, otherwise spread over the video.
fn issue_timestamps(issue: &ValidationIssue, video_duration: f64) -> Vec<f64> {
    if let Some(ts) = issue.details["timestamp"].as_f64() {
        return vec![ts.clamp(0.0, video_duration.max(0.0))];
    }
    // No anchor: sample start, middle, end.
    vec![
        (video_duration * 0.1).max(0.0),
        video_duration * 0.5,
        (video_duration * 0.9).min(video_duration),
    ]
}

pub struct VisionQc<'a> {
    client: &'a dyn LlmClient,
}

impl<'a> VisionQc<'a> {
    pub fn new(client: &'a dyn LlmClient) -> Self {
        Self { client }
    }

    /// Verify `issues` against frames from `video`. Frames land in
    /// `frames_dir` as `qc_<n>.png`.
    pub async fn verify(
        &self,
        video: &Path,
        video_duration: f64,
        section_title: &str,
        issues: Vec<ValidationIssue>,
        frames_dir: &Path,
    ) -> QcVerdicts {
        if issues.is_empty() {
            return QcVerdicts::default();
        }
        tokio::fs::create_dir_all(frames_dir).await.ok();

        // Collect candidate captures for all issues, deduplicated by time.
        let mut captures: Vec<FrameCapture> = Vec::new();
        for (idx, issue) in issues.iter().enumerate() {
            for ts in issue_timestamps(issue, video_duration) {
                captures.push(FrameCapture {
                    screenshot_path: PathBuf::new(),
                    timestamp_seconds: ts,
                    event_ids: vec![format!("issue_{idx}")],
                });
            }
        }
        let mut captures = dedup_frame_captures(captures);

        let mut frames: Vec<(Vec<u8>, String)> = Vec::new();
        for (n, capture) in captures.iter_mut().enumerate() {
            let path = frames_dir.join(format!("qc_{n}.png"));
            match extract_frame(video, capture.timestamp_seconds, &path).await {
                Ok(extracted) => {
                    capture.screenshot_path = extracted.screenshot_path.clone();
                    if let Ok(bytes) = tokio::fs::read(&path).await {
                        frames.push((bytes, "image/png".to_string()));
                    }
                }
                Err(e) => warn!(error = %e, timestamp = capture.timestamp_seconds, "Frame extraction failed"),
            }
        }

        if frames.is_empty() {
            warn!("No frames available for vision QC, leaving issues unverified");
            return QcVerdicts {
                unverified: issues,
                ..Default::default()
            };
        }

        let prompt = build_qc_prompt(section_title, video_duration, &issues, &captures);
        let mut parts = vec![Part::text(prompt)];
        for (bytes, mime) in &frames {
            parts.push(Part::image(bytes, mime.clone()));
        }
        let request = GenerateRequest::new(self.client.vision_model(), vec![Content::user(parts)])
            .with_json_output()
            .with_temperature(0.2);

        let verdict_values = match self.client.generate(request).await {
            Ok(response) => {
                let text_fallback = response.text_or_empty().to_string();
                response
                    .parsed_json
                    .or_else(|| parse_json_lenient(&text_fallback))
            }
            Err(e) => {
                warn!(error = %e, "Vision QC call failed");
                None
            }
        };

        let Some(verdicts) = verdict_values else {
            return QcVerdicts {
                unverified: issues,
                ..Default::default()
            };
        };

        classify(issues, &verdicts)
    }
}

fn build_qc_prompt(
    section_title: &str,
    duration: f64,
    issues: &[ValidationIssue],
    captures: &[FrameCapture],
) -> String {
    let mut issue_list = String::new();
    for (idx, issue) in issues.iter().enumerate() {
        issue_list.push_str(&format!(
            "{idx}. [{}] {}\n",
            issue.category.as_str(),
            issue.message
        ));
    }
    let mut frame_list = String::new();
    for capture in captures {
        frame_list.push_str(&format!("- frame at {:.1}s\n", capture.timestamp_seconds));
    }

    format!(
        r#"These frames come from an animated educational video ("{section_title}", {duration:.1}s).
Attached frames:
{frame_list}
A validator flagged these potential visual defects:
{issue_list}
Objects animate in and out constantly; transient overlap or edge contact during a transition is NOT a defect. Only report an issue as REAL if the broken state persists in a settled frame.

Respond with JSON: {{"verdicts": [{{"index": <issue number>, "verdict": "REAL" | "FALSE_POSITIVE"}}]}}."#
    )
}

fn classify(issues: Vec<ValidationIssue>, verdicts: &serde_json::Value) -> QcVerdicts {
    let list = verdicts
        .get("verdicts")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut result = QcVerdicts::default();
    for (idx, mut issue) in issues.into_iter().enumerate() {
        let verdict = list.iter().find_map(|entry| {
            (entry["index"].as_u64() == Some(idx as u64)).then(|| {
                entry["verdict"]
                    .as_str()
                    .unwrap_or("FALSE_POSITIVE")
                    .to_string()
            })
        });
        match verdict.as_deref() {
            Some("REAL") => {
                debug!(message = %issue.message, "Vision QC confirmed issue");
                result.confirmed.push(issue);
            }
            Some(_) => {
                issue.whitelist_key = Some(issue.dedup_key());
                result.whitelisted.push(issue);
            }
            None => result.unverified.push(issue),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectio_models::{Confidence, IssueCategory, Severity};
    use serde_json::json;

    fn issue(msg: &str) -> ValidationIssue {
        ValidationIssue::new(
            Severity::Info,
            Confidence::Low,
            IssueCategory::TextOverlap,
            msg,
        )
    }

    #[test]
    fn test_classify_splits_real_and_false_positive() {
        let issues = vec![issue("overlap a"), issue("overlap b")];
        let verdicts = json!({
            "verdicts": [
                {"index": 0, "verdict": "REAL"},
                {"index": 1, "verdict": "FALSE_POSITIVE"}
            ]
        });
        let result = classify(issues, &verdicts);
        assert_eq!(result.confirmed.len(), 1);
        assert_eq!(result.whitelisted.len(), 1);
        assert!(result.whitelisted[0].whitelist_key.is_some());
        assert!(result.unverified.is_empty());
    }

    #[test]
    fn test_classify_missing_verdict_stays_unverified() {
        let issues = vec![issue("overlap a")];
        let result = classify(issues, &json!({"verdicts": []}));
        assert_eq!(result.unverified.len(), 1);
        assert!(result.confirmed.is_empty());
        assert!(result.whitelisted.is_empty());
    }

    #[test]
    fn test_issue_timestamps_prefers_detail_anchor() {
        let anchored = issue("x").with_details(json!({"timestamp": 3.5}));
        assert_eq!(issue_timestamps(&anchored, 10.0), vec![3.5]);

        let spread = issue_timestamps(&issue("y"), 10.0);
        assert_eq!(spread.len(), 3);
        assert!(spread[0] < spread[1] && spread[1] < spread[2]);
    }
}
