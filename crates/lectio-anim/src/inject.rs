//! Spatial-check injection.
//!
//! Before the dry-run probe, the scene source gets a helper method that
//! walks `self.mobjects` at the end of `construct`, checks bounds and text
//! overlap against the screen limits, emits structured diagnostics on
//! stderr, and exits non-zero on violations so the probe surfaces them.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::bounds::{SCREEN_X_LIMIT, SCREEN_Y_LIMIT};

pub const CHECK_CALL: &str = "self._perform_spatial_checks()";

static CLASS_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)class\s+\w+\s*\([^)]*Scene[^)]*\)\s*:").expect("valid regex")
});
static CONSTRUCT_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)def\s+construct\s*\(\s*self\s*\)\s*:").expect("valid regex"));

fn injected_method(method_indent: &str) -> String {
    let template = format!(
        r#"def _perform_spatial_checks(self):
    import json
    import sys
    issues = []
    warnings = []
    for m in self.mobjects:
        if not hasattr(m, 'get_center') or not hasattr(m, 'width'):
            continue
        if m.width > 0.1 and m.height > 0.1:
            x, y = m.get_center()[0], m.get_center()[1]
            w, h = m.width, m.height
            left, right = x - w / 2, x + w / 2
            bottom, top = y - h / 2, y + h / 2
            if (left < -{x} or right > {x} or bottom < -{y} or top > {y}):
                issues.append({{
                    "category": "out_of_bounds",
                    "severity": "critical",
                    "confidence": "high",
                    "message": "Object '%s' is out of bounds. Center: (%.2f, %.2f)." % (type(m).__name__, x, y),
                    "details": {{"object_type": type(m).__name__, "center": [x, y]}},
                }})
            elif (left < -{x} + 0.5 or right > {x} - 0.5 or bottom < -{y} + 0.3 or top > {y} - 0.3):
                warnings.append("Object '%s' is near the screen edge" % type(m).__name__)
    texts = [m for m in self.mobjects if "Text" in type(m).__name__ and hasattr(m, 'text')]
    for i, t1 in enumerate(texts):
        for t2 in texts[i + 1:]:
            c1, c2 = t1.get_center(), t2.get_center()
            if (abs(c1[0] - c2[0]) * 2 < (t1.width + t2.width)
                    and abs(c1[1] - c2[1]) * 2 < (t1.height + t2.height)):
                issues.append({{
                    "category": "text_overlap",
                    "severity": "critical",
                    "confidence": "high",
                    "message": "Text overlap detected between '%s' and '%s'." % (t1.text[:20], t2.text[:20]),
                    "details": {{"text1": t1.text[:40], "text2": t2.text[:40]}},
                }})
    for w in warnings:
        print("SPATIAL_WARNING: %s" % w, file=sys.stderr)
    if issues:
        print("SPATIAL_ISSUES_JSON:%s" % json.dumps(issues), file=sys.stderr)
        sys.exit("Spatial Error: %s" % issues[0]["message"])"#,
        x = SCREEN_X_LIMIT,
        y = SCREEN_Y_LIMIT,
    );

    template
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{method_indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inject the checker into `code`: one call appended to the end of
/// `construct`, plus the helper method on the Scene class. Returns the
/// original code unchanged when the expected structure is missing or the
/// checker is already present.
pub fn inject_spatial_checks(code: &str) -> String {
    if code.contains("_perform_spatial_checks") {
        return code.to_string();
    }

    let lines: Vec<&str> = code.lines().collect();

    let Some((class_idx, class_indent)) = lines.iter().enumerate().find_map(|(i, l)| {
        CLASS_LINE_RE
            .captures(l)
            .map(|c| (i, c[1].to_string()))
    }) else {
        warn!("No Scene class found to inject spatial checks");
        return code.to_string();
    };

    let Some((construct_idx, method_indent)) =
        lines.iter().enumerate().skip(class_idx).find_map(|(i, l)| {
            CONSTRUCT_LINE_RE
                .captures(l)
                .map(|c| (i, c[1].to_string()))
        })
    else {
        warn!("No construct() method found to inject spatial checks");
        return code.to_string();
    };

    // End of construct body: first subsequent non-blank line at or below
    // the method's own indentation.
    let mut construct_end = lines.len();
    let mut body_indent = format!("{method_indent}    ");
    for (i, line) in lines.iter().enumerate().skip(construct_idx + 1) {
        if line.trim().is_empty() {
            continue;
        }
        let indent_len = line.len() - line.trim_start().len();
        if indent_len <= method_indent.len() {
            construct_end = i;
            break;
        }
        body_indent = line[..indent_len].to_string();
    }

    // End of class body: first subsequent non-blank line at or below the
    // class's indentation.
    let mut class_end = lines.len();
    for (i, line) in lines.iter().enumerate().skip(class_idx + 1) {
        if line.trim().is_empty() {
            continue;
        }
        let indent_len = line.len() - line.trim_start().len();
        if indent_len <= class_indent.len() {
            class_end = i;
            break;
        }
    }

    let mut out: Vec<String> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if i == construct_end {
            out.push(format!("{body_indent}{CHECK_CALL}"));
        }
        if i == class_end {
            out.push(String::new());
            out.push(injected_method(&method_indent));
        }
        out.push(line.to_string());
    }
    if construct_end == lines.len() {
        out.push(format!("{body_indent}{CHECK_CALL}"));
    }
    if class_end == lines.len() {
        out.push(String::new());
        out.push(injected_method(&method_indent));
    }

    let mut result = out.join("\n");
    if code.ends_with('\n') && !result.ends_with('\n') {
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = "\
from manim import *

class DemoScene(Scene):
    def construct(self):
        title = Text(\"Hi\")
        self.play(Write(title))
        self.wait(1.0)
";

    #[test]
    fn test_injects_call_and_method() {
        let injected = inject_spatial_checks(SCENE);
        assert!(injected.contains("self._perform_spatial_checks()"));
        assert!(injected.contains("def _perform_spatial_checks(self):"));
        // Call lands inside construct, after the last statement
        let call_idx = injected.find(CHECK_CALL).unwrap();
        let wait_idx = injected.find("self.wait(1.0)").unwrap();
        assert!(call_idx > wait_idx);
        // Screen limits are baked in
        assert!(injected.contains("7.1"));
        assert!(injected.contains("4"));
        assert!(injected.contains("SPATIAL_ISSUES_JSON"));
    }

    #[test]
    fn test_injection_is_single_shot() {
        let once = inject_spatial_checks(SCENE);
        let twice = inject_spatial_checks(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_no_scene_class_returns_unchanged() {
        let code = "x = 1\n";
        assert_eq!(inject_spatial_checks(code), code);
    }

    #[test]
    fn test_trailing_method_after_construct_unaffected() {
        let code = "\
class DemoScene(Scene):
    def construct(self):
        self.wait(1.0)

    def helper(self):
        return 1
";
        let injected = inject_spatial_checks(code);
        let call_idx = injected.find(CHECK_CALL).unwrap();
        let helper_idx = injected.find("def helper").unwrap();
        assert!(call_idx < helper_idx, "call stays inside construct");
        assert!(injected.contains("def _perform_spatial_checks"));
    }
}
