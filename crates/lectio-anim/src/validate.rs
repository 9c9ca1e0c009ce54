//! Static validation of generated scene code.
//!
//! Cheap checks that run before any render: bracket balance, scene
//! structure, imports, and spatial heuristics over hardcoded coordinates.
//! The dry-run probe remains the authoritative syntax/runtime check; these
//! exist to catch obvious defects without paying for a subprocess.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use lectio_models::{
    Confidence, IssueCategory, Severity, ValidationIssue, ValidationResult,
};

use crate::bounds::{SAFE_X_LIMIT, SAFE_Y_LIMIT};

/// Symbols commonly used by generated scenes; used to detect missing
/// imports when the code does not use a wildcard import.
const COMMON_SYMBOLS: &[&str] = &[
    "Scene", "Text", "MathTex", "Tex", "VGroup", "Write", "FadeIn", "FadeOut", "Create",
    "Transform", "ReplacementTransform", "Indicate", "Circle", "Square", "Rectangle", "Arrow",
    "Line", "Dot", "Axes", "NumberPlane", "UP", "DOWN", "LEFT", "RIGHT", "ORIGIN",
];

static SCENE_CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^class\s+\w+\s*\([^)]*Scene[^)]*\)\s*:").expect("valid regex")
});
static CONSTRUCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s+def\s+construct\s*\(\s*self\s*\)\s*:").expect("valid regex"));
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^from manim import (.+)$").expect("valid regex"));
static MOVE_COORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:move_to|shift)\(\s*(RIGHT|LEFT|UP|DOWN|UL|UR|DL|DR)\s*\*\s*(\d+(?:\.\d+)?)")
        .expect("valid regex")
});
static ARRAY_COORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bmove_to\(\s*\[\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)")
        .expect("valid regex")
});

/// Run all static validators. Balance failures short-circuit the rest;
/// there is no point checking structure in code that cannot parse.
pub fn validate_static(code: &str) -> ValidationResult {
    let mut issues = check_balance(code);
    if !issues.is_empty() {
        return ValidationResult::from_issues(issues);
    }
    issues.extend(check_structure(code));
    issues.extend(check_imports(code));
    issues.extend(check_spatial_heuristics(code));
    ValidationResult::from_issues(issues)
}

/// Bracket/quote balance as a syntax smoke test.
pub fn check_balance(code: &str) -> Vec<ValidationIssue> {
    if code.trim().is_empty() {
        return vec![ValidationIssue::new(
            Severity::Critical,
            Confidence::High,
            IssueCategory::Syntax,
            "Code is empty",
        )];
    }

    let mut depth_paren = 0i64;
    let mut depth_bracket = 0i64;
    let mut depth_brace = 0i64;
    let mut line_no = 1u32;
    let mut in_string: Option<char> = None;
    let mut prev = '\0';

    for ch in code.chars() {
        if ch == '\n' {
            line_no += 1;
        }
        match in_string {
            Some(quote) => {
                if ch == quote && prev != '\\' {
                    in_string = None;
                }
            }
            None => match ch {
                '#' => {
                    // Comments run to end of line; skip by treating the
                    // newline as the closer.
                    in_string = Some('\n');
                }
                '\'' | '"' => in_string = Some(ch),
                '(' => depth_paren += 1,
                ')' => depth_paren -= 1,
                '[' => depth_bracket += 1,
                ']' => depth_bracket -= 1,
                '{' => depth_brace += 1,
                '}' => depth_brace -= 1,
                _ => {}
            },
        }
        if depth_paren < 0 || depth_bracket < 0 || depth_brace < 0 {
            return vec![ValidationIssue::new(
                Severity::Critical,
                Confidence::High,
                IssueCategory::Syntax,
                format!("Unbalanced closing bracket near line {line_no}"),
            )
            .with_line(line_no)];
        }
        prev = ch;
    }

    if depth_paren != 0 || depth_bracket != 0 || depth_brace != 0 {
        return vec![ValidationIssue::new(
            Severity::Critical,
            Confidence::High,
            IssueCategory::Syntax,
            "Unclosed bracket at end of file",
        )];
    }
    Vec::new()
}

/// Exactly one Scene subclass with a `construct` method.
pub fn check_structure(code: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let class_count = SCENE_CLASS_RE.find_iter(code).count();

    match class_count {
        0 => issues.push(ValidationIssue::new(
            Severity::Critical,
            Confidence::High,
            IssueCategory::Structure,
            "No Scene subclass found",
        )),
        1 => {}
        n => issues.push(ValidationIssue::new(
            Severity::Critical,
            Confidence::High,
            IssueCategory::Structure,
            format!("Expected one Scene subclass, found {n}"),
        )),
    }

    if class_count > 0 && !CONSTRUCT_RE.is_match(code) {
        issues.push(ValidationIssue::new(
            Severity::Critical,
            Confidence::High,
            IssueCategory::Structure,
            "Scene class has no construct() method",
        ));
    }
    issues
}

/// Import coverage for the symbols the code uses.
pub fn check_imports(code: &str) -> Vec<ValidationIssue> {
    if code.contains("from manim import *") {
        return Vec::new();
    }

    let mut imported: Vec<String> = Vec::new();
    for caps in IMPORT_RE.captures_iter(code) {
        for item in caps[1].split(',') {
            let name = item.trim().split(" as ").next().unwrap_or("").trim();
            if !name.is_empty() {
                imported.push(name.to_string());
            }
        }
    }

    let missing: Vec<&str> = COMMON_SYMBOLS
        .iter()
        .filter(|sym| symbol_used(code, sym) && !imported.iter().any(|i| i == *sym))
        .copied()
        .collect();

    if missing.is_empty() {
        Vec::new()
    } else {
        vec![ValidationIssue::new(
            Severity::Critical,
            Confidence::High,
            IssueCategory::Imports,
            format!("Missing imports: {}", missing.join(", ")),
        )
        .with_details(json!({"missing": missing}))]
    }
}

fn symbol_used(code: &str, symbol: &str) -> bool {
    Regex::new(&format!(r"\b{}\b", regex::escape(symbol)))
        .map(|re| {
            re.find_iter(code).any(|m| {
                // Ignore occurrences on import lines
                let line_start = code[..m.start()].rfind('\n').map(|i| i + 1).unwrap_or(0);
                !code[line_start..m.start()].contains("import")
            })
        })
        .unwrap_or(false)
}

/// Hardcoded coordinates beyond the layout-safe envelope.
pub fn check_spatial_heuristics(code: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for caps in MOVE_COORD_RE.captures_iter(code) {
        let direction = &caps[1];
        let value: f64 = caps[2].parse().unwrap_or(0.0);
        let limit = match direction {
            "RIGHT" | "LEFT" => SAFE_X_LIMIT,
            "UP" | "DOWN" => SAFE_Y_LIMIT,
            _ => SAFE_X_LIMIT.min(SAFE_Y_LIMIT),
        };
        if value > limit {
            issues.push(
                ValidationIssue::new(
                    Severity::Critical,
                    Confidence::High,
                    IssueCategory::OutOfBounds,
                    format!("Hardcoded coordinate {direction} * {value} exceeds safe limit {limit}"),
                )
                .with_details(json!({"direction": direction, "value": value}))
                .auto_fixable(),
            );
        }
    }

    for caps in ARRAY_COORD_RE.captures_iter(code) {
        let x: f64 = caps[1].parse().unwrap_or(0.0);
        let y: f64 = caps[2].parse().unwrap_or(0.0);
        if x.abs() > SAFE_X_LIMIT || y.abs() > SAFE_Y_LIMIT {
            issues.push(
                ValidationIssue::new(
                    Severity::Warning,
                    Confidence::Medium,
                    IssueCategory::OutOfBounds,
                    format!("Literal position [{x}, {y}] may fall outside the safe area"),
                )
                .with_details(json!({"x": x, "y": y})),
            );
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_SCENE: &str = "\
from manim import *

class GoodScene(Scene):
    def construct(self):
        title = Text(\"Hello\")
        self.play(Write(title))
        self.wait(1.0)
";

    #[test]
    fn test_valid_scene_passes() {
        let result = validate_static(VALID_SCENE);
        assert!(result.valid, "issues: {:?}", result.issues);
    }

    #[test]
    fn test_empty_code_is_syntax_error() {
        let result = validate_static("   \n");
        assert!(!result.valid);
        assert_eq!(result.issues[0].category, IssueCategory::Syntax);
    }

    #[test]
    fn test_unbalanced_brackets_short_circuit() {
        let result = validate_static("class X(Scene:\n    def construct(self):\n");
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .all(|i| i.category == IssueCategory::Syntax));
    }

    #[test]
    fn test_balance_ignores_brackets_in_strings_and_comments() {
        let code = "x = \"(((\"  # also (((\ny = 1\n";
        assert!(check_balance(code).is_empty());
    }

    #[test]
    fn test_missing_scene_class() {
        let result = validate_static("def construct(self):\n    pass\n");
        assert!(result
            .issues
            .iter()
            .any(|i| i.category == IssueCategory::Structure));
    }

    #[test]
    fn test_two_scene_classes_flagged() {
        let code = "\
class A(Scene):
    def construct(self):
        pass

class B(Scene):
    def construct(self):
        pass
";
        let issues = check_structure(code);
        assert!(issues.iter().any(|i| i.message.contains("found 2")));
    }

    #[test]
    fn test_missing_construct() {
        let code = "class A(Scene):\n    def setup(self):\n        pass\n";
        let issues = check_structure(code);
        assert!(issues.iter().any(|i| i.message.contains("construct")));
    }

    #[test]
    fn test_wildcard_import_satisfies_everything() {
        assert!(check_imports(VALID_SCENE).is_empty());
    }

    #[test]
    fn test_explicit_imports_missing_symbol() {
        let code = "\
from manim import Scene, Text

class A(Scene):
    def construct(self):
        t = Text(\"x\")
        self.play(Write(t))
";
        let issues = check_imports(code);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("Write"));
        assert!(!issues[0].message.contains("Text,"));
    }

    #[test]
    fn test_spatial_heuristic_flags_large_coordinates() {
        let code = "        obj.move_to(RIGHT * 20.0)\n";
        let issues = check_spatial_heuristics(code);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].auto_fixable);
        assert!(issues[0].should_auto_fix());
    }

    #[test]
    fn test_spatial_heuristic_accepts_safe_coordinates() {
        let code = "        obj.move_to(RIGHT * 3.0)\n        obj.shift(UP * 2.5)\n";
        assert!(check_spatial_heuristics(code).is_empty());
    }

    #[test]
    fn test_array_coordinate_is_low_stakes_warning() {
        let code = "        obj.move_to([8.0, 0, 0])\n";
        let issues = check_spatial_heuristics(code);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(!issues[0].should_auto_fix());
    }
}
