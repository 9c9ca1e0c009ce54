//! Renderer subprocess invocation and stderr triage.
//!
//! The probe is a real render in dry-run mode: `construct` executes (so the
//! injected spatial checker runs) but video assembly is skipped. Stderr is
//! the diagnostic channel, carrying Python tracebacks, structured
//! `SPATIAL_ISSUES_JSON:` lines, and weak `SPATIAL_WARNING:` hints.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use lectio_models::{Confidence, IssueCategory, Severity, ValidationIssue};

use crate::error::{AnimError, AnimResult};
use crate::scene_file::Quality;

/// Renderer binary name.
pub const RENDERER_BIN: &str = "manim";

static TRACEBACK_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"File "[^"]+", line (\d+)"#).expect("valid regex"));
static PYTHON_ERROR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(\w*(?:Error|Exception))\s*:\s*(.+)$").expect("valid regex"));
static SPATIAL_EXIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Spatial Error:\s*(.+)$").expect("valid regex"));

/// One renderer invocation.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub scene_file: PathBuf,
    pub scene_class: String,
    pub quality: Quality,
    pub media_dir: PathBuf,
    pub dry_run: bool,
    pub timeout_secs: u64,
}

/// What came back from the renderer.
#[derive(Debug)]
pub struct RenderOutcome {
    pub success: bool,
    pub stderr: String,
}

/// Run the renderer. A timeout kills the child and surfaces as a
/// rendering error; a non-zero exit returns an outcome with
/// `success = false` so the caller can triage stderr.
pub async fn render(request: &RenderRequest) -> AnimResult<RenderOutcome> {
    which::which(RENDERER_BIN)
        .map_err(|_| AnimError::rendering(format!("{RENDERER_BIN} not found on PATH")))?;

    let mut args: Vec<String> = vec![
        "render".into(),
        request.scene_file.to_string_lossy().into_owned(),
        request.scene_class.clone(),
        request.quality.flag().into(),
        "--media_dir".into(),
        request.media_dir.to_string_lossy().into_owned(),
    ];
    if request.dry_run {
        args.push("--dry_run".into());
    }

    debug!(
        scene = %request.scene_file.display(),
        class = %request.scene_class,
        dry_run = request.dry_run,
        "Invoking renderer"
    );

    let mut child = Command::new(RENDERER_BIN)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AnimError::rendering(format!("failed to spawn renderer: {e}")))?;

    let output = match tokio::time::timeout(
        Duration::from_secs(request.timeout_secs),
        child.wait_with_output(),
    )
    .await
    {
        Ok(result) => result.map_err(|e| AnimError::rendering(e.to_string()))?,
        Err(_) => {
            warn!(
                timeout = request.timeout_secs,
                "Renderer exceeded time budget, killed"
            );
            return Err(AnimError::rendering(format!(
                "renderer timed out after {} seconds",
                request.timeout_secs
            )));
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    Ok(RenderOutcome {
        success: output.status.success(),
        stderr,
    })
}

/// Parse renderer stderr into validation issues.
pub fn parse_stderr_issues(stderr: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut saw_structured_spatial = false;

    for line in stderr.lines() {
        if let Some(json_part) = line.strip_prefix("SPATIAL_ISSUES_JSON:") {
            match serde_json::from_str::<Vec<ValidationIssue>>(json_part) {
                Ok(parsed) => {
                    saw_structured_spatial = !parsed.is_empty();
                    for mut issue in parsed {
                        issue.auto_fixable = matches!(
                            issue.category,
                            IssueCategory::OutOfBounds
                                | IssueCategory::TextOverlap
                                | IssueCategory::ObjectOcclusion
                        );
                        issues.push(issue);
                    }
                }
                Err(e) => warn!(error = %e, "Unparseable SPATIAL_ISSUES_JSON line"),
            }
        } else if let Some(msg) = line.strip_prefix("SPATIAL_WARNING:") {
            issues.push(ValidationIssue::new(
                Severity::Warning,
                Confidence::Low,
                IssueCategory::Visibility,
                msg.trim(),
            ));
        }
    }

    // Python traceback: the deepest frame line plus the final error line.
    if let Some(caps) = PYTHON_ERROR_RE.captures_iter(stderr).last() {
        let line = TRACEBACK_LINE_RE
            .captures_iter(stderr)
            .last()
            .and_then(|c| c[1].parse::<u32>().ok());
        let mut issue = ValidationIssue::new(
            Severity::Critical,
            Confidence::High,
            IssueCategory::Runtime,
            format!("{}: {}", &caps[1], caps[2].trim()),
        );
        issue.line = line;
        issues.push(issue);
    }

    // The injected checker's sys.exit message; redundant when the
    // structured line already covered it.
    if !saw_structured_spatial {
        if let Some(caps) = SPATIAL_EXIT_RE.captures(stderr) {
            let message = caps[1].trim();
            let category = if message.to_lowercase().contains("overlap") {
                IssueCategory::TextOverlap
            } else {
                IssueCategory::OutOfBounds
            };
            let mut issue = ValidationIssue::new(
                Severity::Critical,
                Confidence::High,
                category,
                message,
            );
            issue.auto_fixable = true;
            issues.push(issue);
        }
    }

    issues
}

/// Probe media cache location check helper (kept small; the refiner owns
/// the directory layout).
pub fn ensure_media_dir(dir: &Path) -> AnimResult<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_spatial_issues() {
        let stderr = r#"some renderer noise
SPATIAL_ISSUES_JSON:[{"category": "out_of_bounds", "severity": "critical", "confidence": "high", "message": "Object 'Text' is out of bounds. Center: (10.00, 0.00).", "details": {"object_type": "Text"}}]
Spatial Error: Object 'Text' is out of bounds. Center: (10.00, 0.00).
"#;
        let issues = parse_stderr_issues(stderr);
        // The sys.exit line is folded into the structured issue
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, IssueCategory::OutOfBounds);
        assert!(issues[0].auto_fixable);
        assert!(issues[0].should_auto_fix());
    }

    #[test]
    fn test_parse_spatial_exit_without_structured_line() {
        let stderr = "Spatial Error: Text overlap detected between 'a' and 'b'.\n";
        let issues = parse_stderr_issues(stderr);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, IssueCategory::TextOverlap);
    }

    #[test]
    fn test_parse_spatial_warnings() {
        let stderr = "SPATIAL_WARNING: Object 'MathTex' is near the screen edge\n";
        let issues = parse_stderr_issues(stderr);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].confidence, Confidence::Low);
        assert!(issues[0].needs_verification());
    }

    #[test]
    fn test_parse_python_traceback() {
        let stderr = r#"Traceback (most recent call last):
  File "scene_0.py", line 12, in construct
    self.play(Write(undefined_var))
NameError: name 'undefined_var' is not defined
"#;
        let issues = parse_stderr_issues(stderr);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, IssueCategory::Runtime);
        assert_eq!(issues[0].line, Some(12));
        assert!(issues[0].message.contains("NameError"));
        assert!(issues[0].requires_llm());
    }

    #[test]
    fn test_clean_stderr_yields_no_issues() {
        assert!(parse_stderr_issues("INFO rendering scene...\n").is_empty());
    }

    #[tokio::test]
    async fn test_render_missing_binary_is_rendering_error() {
        // The test environment may actually have manim; only assert the
        // error classification when it does not.
        if which::which(RENDERER_BIN).is_err() {
            let request = RenderRequest {
                scene_file: PathBuf::from("scene.py"),
                scene_class: "S".into(),
                quality: Quality::Low,
                media_dir: PathBuf::from("/tmp/media"),
                dry_run: true,
                timeout_secs: 5,
            };
            let err = render(&request).await.unwrap_err();
            assert!(matches!(err, AnimError::Rendering(_)));
        }
    }
}
