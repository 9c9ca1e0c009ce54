//! Deterministic scene-code rewrites.
//!
//! Two entry points: [`fix_known_patterns`] runs on every pass and is
//! idempotent; [`fix_issues`] dispatches on validation issues routed for
//! auto-fixing and reports which issues it consumed. Generated scene code
//! is one statement per line, which keeps these line-level rewrites exact.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use lectio_models::{IssueCategory, ValidationIssue};

use crate::bounds::{GROUP_FIT_WIDTH, SAFE_X_LIMIT, SAFE_Y_LIMIT};

static WAIT_ZERO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*self\.(?:_monitored_)?wait\(\s*0\s*\)\s*(?:#.*)?\n?").expect("valid regex")
});
static TRACKER_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.number\b").expect("valid regex"));
static FORBIDDEN_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^.\w])(CENTER|TOP|BOTTOM|ease_in_expo)\b").expect("valid regex")
});
static GRID_LINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\.grid_lines\b").expect("valid regex"));
static TABLE_SUBSCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\[(\d+)\]\[(\d+)\]").expect("valid regex"));
static STRETCH_EIGHT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(stretch_to_fit_width\([^)\n]*?/\s*)8(\s*\))").expect("valid regex")
});
static MATHTEX_ASSIGN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(\w+)\s*=\s*MathTex\((.*)\)\s*$").expect("valid regex")
});
static DECOR_VGROUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(\w+)\s*=\s*VGroup\(\s*(\w+)\s*,\s*(\w+)\s*,\s*(\w+)\s*\)\s*$")
        .expect("valid regex")
});
static MOVE_SHIFT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(move_to|shift)\(\s*(RIGHT|LEFT|UP|DOWN|UL|UR|DL|DR)\s*\*\s*(\d+(?:\.\d+)?)")
        .expect("valid regex")
});

/// Apply the always-on pattern rewrites. Returns the new code and the
/// number of rewrites performed. Applying the result again is a no-op.
pub fn fix_known_patterns(code: &str) -> (String, usize) {
    let mut count = 0usize;

    // Rule 1: drop zero waits (the runtime rejects them).
    let after = WAIT_ZERO_RE.replace_all(code, "");
    if after != code {
        count += WAIT_ZERO_RE.find_iter(code).count();
    }
    let mut current = after.into_owned();

    // Rule 2: tracker `.number` reads become `.get_value()` calls.
    let after = TRACKER_NUMBER_RE.replace_all(&current, ".get_value()");
    if after != current {
        count += TRACKER_NUMBER_RE.find_iter(&current).count();
    }
    current = after.into_owned();

    // Rule 3: identifiers the renderer no longer accepts.
    let after = FORBIDDEN_NAME_RE.replace_all(&current, |caps: &Captures| {
        let replacement = match &caps[2] {
            "CENTER" => "ORIGIN",
            "TOP" => "UP",
            "BOTTOM" => "DOWN",
            "ease_in_expo" => "smooth",
            other => other,
        };
        format!("{}{}", &caps[1], replacement)
    });
    if after != current {
        count += FORBIDDEN_NAME_RE.find_iter(&current).count();
    }
    current = after.into_owned();

    // Rule 4: wide MathTex headers get arranged and width-capped.
    let (with_mathtex, mathtex_fixes) = arrange_wide_mathtex(&current);
    count += mathtex_fixes;
    current = with_mathtex;

    // Rule 5: VGroup(table, line_x, line_y) duplicates the table's own
    // grid; keep the table only.
    let (with_vgroup, vgroup_fixes) = collapse_decorative_line_groups(&current);
    count += vgroup_fixes;
    current = with_vgroup;

    // Rule 6: `.grid_lines` does not exist on Table.
    let after = GRID_LINES_RE.replace_all(&current, |caps: &Captures| {
        format!(
            "VGroup({0}.get_horizontal_lines(), {0}.get_vertical_lines())",
            &caps[1]
        )
    });
    if after != current {
        count += GRID_LINES_RE.find_iter(&current).count();
    }
    current = after.into_owned();

    // Rule 7: table[i][j] subscripts become 1-based get_cell calls.
    let after = TABLE_SUBSCRIPT_RE.replace_all(&current, |caps: &Captures| {
        let row: i64 = caps[2].parse().unwrap_or(0);
        let col: i64 = caps[3].parse().unwrap_or(0);
        format!("{}.get_cell({}, {})", &caps[1], row + 1, col + 1)
    });
    if after != current {
        count += TABLE_SUBSCRIPT_RE.find_iter(&current).count();
    }
    current = after.into_owned();

    // Rule 8: the /8 highlight-stretch denominator leaves a gap column.
    let after = STRETCH_EIGHT_RE.replace_all(&current, "${1}7${2}");
    if after != current {
        count += STRETCH_EIGHT_RE.find_iter(&current).count();
    }
    current = after.into_owned();

    if count > 0 {
        debug!(fixes = count, "Applied known-pattern rewrites");
    }
    (current, count)
}

fn arrange_wide_mathtex(code: &str) -> (String, usize) {
    let mut out: Vec<String> = Vec::new();
    let mut count = 0usize;
    let lines: Vec<&str> = code.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        out.push(line.to_string());
        let Some(caps) = MATHTEX_ASSIGN_RE.captures(line) else {
            continue;
        };
        let indent = &caps[1];
        let var = &caps[2];
        if count_positional_args(&caps[3]) < 5 {
            continue;
        }
        // Skip when a previous pass already arranged this variable.
        let already = lines
            .get(i + 1)
            .map(|next| next.contains(&format!("{var}.arrange(RIGHT")))
            .unwrap_or(false);
        if already {
            continue;
        }
        out.push(format!("{indent}{var}.arrange(RIGHT, buff=0.7)"));
        out.push(format!(
            "{indent}{var}.scale_to_fit_width(min({var}.width, 10.5))"
        ));
        count += 2;
    }
    (rejoin(out, code), count)
}

fn collapse_decorative_line_groups(code: &str) -> (String, usize) {
    let mut out: Vec<String> = Vec::new();
    let mut count = 0usize;

    for line in code.lines() {
        match DECOR_VGROUP_RE.captures(line) {
            Some(caps) => {
                let (indent, var, first, second, third) =
                    (&caps[1], &caps[2], &caps[3], &caps[4], &caps[5]);
                let second_is_line = second.to_lowercase().contains("line");
                let third_is_line = third.to_lowercase().contains("line");
                if second_is_line && third_is_line {
                    out.push(format!("{indent}{var} = {first}"));
                    count += 1;
                } else {
                    out.push(line.to_string());
                }
            }
            None => out.push(line.to_string()),
        }
    }
    (rejoin(out, code), count)
}

/// Count top-level positional arguments in an argument list.
fn count_positional_args(args: &str) -> usize {
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut current = String::new();
    let mut parts: Vec<String> = Vec::new();

    for ch in args.chars() {
        match in_string {
            Some(quote) => {
                current.push(ch);
                if ch == quote {
                    in_string = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    in_string = Some(ch);
                    current.push(ch);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' | ']' | '}' => {
                    depth -= 1;
                    current.push(ch);
                }
                ',' if depth == 0 => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(ch),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }

    parts
        .iter()
        .filter(|p| {
            let trimmed = p.trim();
            // Keyword args look like `name=...` before any bracket.
            !Regex::new(r"^\w+\s*=").expect("valid regex").is_match(trimmed)
        })
        .count()
}

fn rejoin(lines: Vec<String>, original: &str) -> String {
    let mut joined = lines.join("\n");
    if original.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

// ---------------------------------------------------------------------------
// Issue-routed fixes
// ---------------------------------------------------------------------------

/// Apply deterministic fixes for the given issues. Returns the rewritten
/// code, the issues that were NOT consumed, and the number of fixes made.
pub fn fix_issues(
    code: &str,
    issues: Vec<ValidationIssue>,
) -> (String, Vec<ValidationIssue>, usize) {
    let mut current = code.to_string();
    let mut remaining = Vec::new();
    let mut fixes = 0usize;

    for issue in issues {
        if !issue.should_auto_fix() {
            remaining.push(issue);
            continue;
        }
        let attempted = match issue.category {
            IssueCategory::OutOfBounds => fix_out_of_bounds(&current, &issue),
            IssueCategory::TextOverlap => fix_text_overlap(&current, &issue),
            IssueCategory::ObjectOcclusion => fix_object_occlusion(&current, &issue),
            _ => None,
        };
        match attempted {
            Some(new_code) if new_code != current => {
                current = new_code;
                fixes += 1;
            }
            _ => remaining.push(issue),
        }
    }
    (current, remaining, fixes)
}

fn fix_out_of_bounds(code: &str, issue: &ValidationIssue) -> Option<String> {
    let clamped = MOVE_SHIFT_RE
        .replace_all(code, |caps: &Captures| {
            let method = &caps[1];
            let direction = &caps[2];
            let value: f64 = caps[3].parse().unwrap_or(0.0);
            let limit = match direction {
                "RIGHT" | "LEFT" => SAFE_X_LIMIT,
                "UP" | "DOWN" => SAFE_Y_LIMIT,
                _ => SAFE_X_LIMIT.min(SAFE_Y_LIMIT),
            };
            if value > limit + 0.01 {
                format!("{method}({direction} * {limit:.1}")
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();

    let mut result = clamped;

    if issue.details["is_group_overflow"].as_bool().unwrap_or(false) {
        if let Some(obj_type) = issue.details["object_type"].as_str() {
            if let Some(var) = find_variable_for_type(&result, obj_type) {
                let fit = format!("{var}.scale_to_fit_width(min({var}.width, {GROUP_FIT_WIDTH:.1}))");
                if !result.contains(&fit) {
                    result = insert_after_assignment(&result, &var, &fit);
                }
            }
        }
    }

    if result != code {
        Some(result)
    } else {
        None
    }
}

fn fix_text_overlap(code: &str, issue: &ValidationIssue) -> Option<String> {
    let text1 = issue.details["text1"].as_str().unwrap_or("");
    let text2 = issue.details["text2"].as_str().unwrap_or("");

    let anchor = find_variable_for_text(code, text1);
    let target = find_variable_for_text(code, text2)?;

    let stmt = match &anchor {
        Some(anchor) if *anchor != target => {
            format!("{target}.next_to({anchor}, DOWN, buff=0.4)")
        }
        _ => format!("{target}.shift(DOWN * 0.8)"),
    };
    if code.contains(&stmt) {
        return None;
    }
    let result = insert_after_assignment(code, &target, &stmt);
    (result != code).then_some(result)
}

fn fix_object_occlusion(code: &str, issue: &ValidationIssue) -> Option<String> {
    let obj_type = issue.details["object_type"].as_str()?;
    let var = find_variable_for_type(code, obj_type)?;
    let stmt = format!("{var}.set_fill(opacity=0)");
    if code.contains(&stmt) {
        return None;
    }
    let result = insert_after_assignment(code, &var, &stmt);
    (result != code).then_some(result)
}

/// First variable assigned from a constructor of `obj_type`.
pub fn find_variable_for_type(code: &str, obj_type: &str) -> Option<String> {
    if obj_type.is_empty() {
        return None;
    }
    let re = Regex::new(&format!(
        r"(?m)^\s*(\w+)\s*=\s*(?:\w+\.)?{}\(",
        regex::escape(obj_type)
    ))
    .ok()?;
    re.captures(code).map(|c| c[1].to_string())
}

/// Variable assigned from a Text/Tex/MathTex call whose string literal
/// contains the first 20 characters of `text_content`.
pub fn find_variable_for_text(code: &str, text_content: &str) -> Option<String> {
    if text_content.is_empty() {
        return None;
    }
    let needle: String = text_content.chars().take(20).collect();
    static TEXT_ASSIGN_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?m)^\s*(\w+)\s*=\s*(?:Text|Tex|MathTex)\(\s*["']([^"']*)["']"#)
            .expect("valid regex")
    });
    for caps in TEXT_ASSIGN_RE.captures_iter(code) {
        if caps[2].contains(&needle) {
            return Some(caps[1].to_string());
        }
    }
    None
}

/// Insert `stmt` on its own line directly after the first assignment to
/// `var`, matching that line's indentation.
pub fn insert_after_assignment(code: &str, var: &str, stmt: &str) -> String {
    let assign_re = Regex::new(&format!(r"^(\s*){}\s*=", regex::escape(var)))
        .expect("valid regex");
    let mut out: Vec<String> = Vec::new();
    let mut inserted = false;

    for line in code.lines() {
        out.push(line.to_string());
        if !inserted {
            if let Some(caps) = assign_re.captures(line) {
                out.push(format!("{}{}", &caps[1], stmt));
                inserted = true;
            }
        }
    }
    rejoin(out, code)
}
