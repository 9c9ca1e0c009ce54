//! Validation issues produced by the animation refiner.
//!
//! Issues are triaged by three routing predicates: deterministic fixes,
//! surgical LLM edits, and a verification pass that weeds out false
//! positives before any code is touched.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How bad an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// How sure the validator is that the issue is real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Defect class, used to dispatch deterministic fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Syntax,
    Structure,
    Imports,
    Runtime,
    TextOverlap,
    OutOfBounds,
    ObjectOcclusion,
    Visibility,
    VisualQuality,
    Timing,
}

impl IssueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::Syntax => "syntax",
            IssueCategory::Structure => "structure",
            IssueCategory::Imports => "imports",
            IssueCategory::Runtime => "runtime",
            IssueCategory::TextOverlap => "text_overlap",
            IssueCategory::OutOfBounds => "out_of_bounds",
            IssueCategory::ObjectOcclusion => "object_occlusion",
            IssueCategory::Visibility => "visibility",
            IssueCategory::VisualQuality => "visual_quality",
            IssueCategory::Timing => "timing",
        }
    }
}

/// One defect detected in a generated scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub confidence: Confidence,
    pub category: IssueCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Free-form payload consumed by fixers (overlapping texts, object
    /// types, overflow flags)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
    #[serde(default)]
    pub auto_fixable: bool,
    /// Set after vision QC clears a false positive so later passes skip it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist_key: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        severity: Severity,
        confidence: Confidence,
        category: IssueCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            confidence,
            category,
            message: message.into(),
            line: None,
            fix_hint: None,
            details: serde_json::Value::Null,
            auto_fixable: false,
            whitelist_key: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn auto_fixable(mut self) -> Self {
        self.auto_fixable = true;
        self
    }

    /// Route to the deterministic fixer.
    pub fn should_auto_fix(&self) -> bool {
        matches!(self.severity, Severity::Critical | Severity::Warning)
            && self.confidence == Confidence::High
            && self.auto_fixable
    }

    /// Route to a surgical LLM edit.
    pub fn requires_llm(&self) -> bool {
        self.severity == Severity::Critical
            && self.confidence == Confidence::High
            && !self.auto_fixable
    }

    /// Route to vision verification before acting.
    pub fn needs_verification(&self) -> bool {
        self.confidence == Confidence::Low
            || (self.severity == Severity::Info && self.confidence != Confidence::High)
    }

    /// Stable key identifying this issue across validator passes.
    pub fn dedup_key(&self) -> String {
        let head: String = self.message.chars().take(60).collect();
        format!(
            "{}:{}:{}",
            self.category.as_str(),
            self.line.map(|l| l.to_string()).unwrap_or_default(),
            head
        )
    }
}

/// Aggregated validator output.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// `valid` holds iff no critical issue is present.
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let valid = !issues.iter().any(|i| i.severity == Severity::Critical);
        Self { valid, issues }
    }

    pub fn ok() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    pub fn merge(mut self, other: ValidationResult) -> Self {
        self.issues.extend(other.issues);
        ValidationResult::from_issues(self.issues)
    }
}

/// A keyframe extracted for vision QC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameCapture {
    pub screenshot_path: PathBuf,
    pub timestamp_seconds: f64,
    #[serde(default)]
    pub event_ids: Vec<String>,
}

/// Deduplicate captures by timestamp (10 ms resolution), keeping the first
/// occurrence and merging event ids.
pub fn dedup_frame_captures(captures: Vec<FrameCapture>) -> Vec<FrameCapture> {
    let mut out: Vec<FrameCapture> = Vec::new();
    for capture in captures {
        let key = (capture.timestamp_seconds * 100.0).round() as i64;
        if let Some(existing) = out
            .iter_mut()
            .find(|c| (c.timestamp_seconds * 100.0).round() as i64 == key)
        {
            for id in capture.event_ids {
                if !existing.event_ids.contains(&id) {
                    existing.event_ids.push(id);
                }
            }
        } else {
            out.push(capture);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(severity: Severity, confidence: Confidence, auto: bool) -> ValidationIssue {
        let mut i = ValidationIssue::new(severity, confidence, IssueCategory::OutOfBounds, "x");
        i.auto_fixable = auto;
        i
    }

    #[test]
    fn test_routing_predicates_exclusive_at_triage() {
        // Every severity/confidence/auto_fixable combination routes to
        // exactly one of the three buckets, or to none (benign).
        let severities = [Severity::Critical, Severity::Warning, Severity::Info];
        let confidences = [Confidence::High, Confidence::Medium, Confidence::Low];
        for &s in &severities {
            for &c in &confidences {
                for auto in [true, false] {
                    let i = issue(s, c, auto);
                    let routes = [i.should_auto_fix(), i.requires_llm(), i.needs_verification()];
                    let count = routes.iter().filter(|r| **r).count();
                    assert!(count <= 1, "multiple routes for {s:?}/{c:?}/auto={auto}");
                }
            }
        }
    }

    #[test]
    fn test_auto_fix_routing() {
        assert!(issue(Severity::Critical, Confidence::High, true).should_auto_fix());
        assert!(issue(Severity::Warning, Confidence::High, true).should_auto_fix());
        assert!(!issue(Severity::Info, Confidence::High, true).should_auto_fix());
        assert!(!issue(Severity::Critical, Confidence::Medium, true).should_auto_fix());
    }

    #[test]
    fn test_llm_routing() {
        assert!(issue(Severity::Critical, Confidence::High, false).requires_llm());
        assert!(!issue(Severity::Warning, Confidence::High, false).requires_llm());
        assert!(!issue(Severity::Critical, Confidence::High, true).requires_llm());
    }

    #[test]
    fn test_verification_routing() {
        assert!(issue(Severity::Critical, Confidence::Low, false).needs_verification());
        assert!(issue(Severity::Info, Confidence::Medium, false).needs_verification());
        assert!(!issue(Severity::Info, Confidence::High, false).needs_verification());
    }

    #[test]
    fn test_validation_result_valid_means_no_critical() {
        let result = ValidationResult::from_issues(vec![issue(
            Severity::Warning,
            Confidence::High,
            false,
        )]);
        assert!(result.valid);

        let result = ValidationResult::from_issues(vec![issue(
            Severity::Critical,
            Confidence::Low,
            false,
        )]);
        assert!(!result.valid);
    }

    #[test]
    fn test_dedup_frame_captures_by_timestamp() {
        let captures = vec![
            FrameCapture {
                screenshot_path: PathBuf::from("a.png"),
                timestamp_seconds: 1.5,
                event_ids: vec!["e1".into()],
            },
            FrameCapture {
                screenshot_path: PathBuf::from("b.png"),
                timestamp_seconds: 1.5,
                event_ids: vec!["e2".into()],
            },
            FrameCapture {
                screenshot_path: PathBuf::from("c.png"),
                timestamp_seconds: 3.0,
                event_ids: vec![],
            },
        ];
        let deduped = dedup_frame_captures(captures);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].event_ids, vec!["e1", "e2"]);
        assert_eq!(deduped[0].screenshot_path, PathBuf::from("a.png"));
    }

    #[test]
    fn test_details_roundtrip() {
        let i = ValidationIssue::new(
            Severity::Critical,
            Confidence::High,
            IssueCategory::OutOfBounds,
            "oob",
        )
        .with_details(json!({"is_group_overflow": true, "object_type": "VGroup"}));
        let json = serde_json::to_string(&i).unwrap();
        let back: ValidationIssue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.details["is_group_overflow"], json!(true));
    }
}
