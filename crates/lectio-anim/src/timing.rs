//! Scene timing against the narration audio.
//!
//! Total animation time is derived from `self.play(..., run_time=...)` and
//! `self.wait(...)` calls (1.0 s defaults). Short scenes get their final
//! wait extended to the audio duration; long scenes are warned about but
//! never cut.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

/// Default run time for an unannotated `self.play(...)`.
const DEFAULT_ANIMATION_RUN_TIME: f64 = 1.0;
/// Default for `self.wait()` with no argument.
const DEFAULT_WAIT_TIME: f64 = 1.0;
/// The renderer rejects zero and negative waits.
const MIN_WAIT_TIME: f64 = 0.1;
/// Scenes within this distance of the target are left alone.
const DURATION_TOLERANCE: f64 = 0.5;

static RUN_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"run_time\s*=\s*([\d.]+)").expect("valid regex"));
static WAIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"self\.wait\s*\(([^)]*)\)").expect("valid regex"));
static WAIT_NUMERIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"self\.wait\(\s*([+-]?\d+(?:\.\d+)?)\s*\)").expect("valid regex"));
static INDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*").expect("valid regex"));

/// Total scheduled duration and the number of timed calls.
///
/// Generated code is one statement per line, so a line scan sees the
/// `run_time=` keyword even when it follows nested calls on the line.
pub fn extract_timing(code: &str) -> (f64, usize) {
    let mut total = 0.0;
    let mut calls = 0usize;

    for line in code.lines() {
        if line.contains("self.play(") {
            calls += 1;
            total += RUN_TIME_RE
                .captures(line)
                .and_then(|c| c[1].parse::<f64>().ok())
                .unwrap_or(DEFAULT_ANIMATION_RUN_TIME);
        } else if let Some(caps) = WAIT_RE.captures(line) {
            calls += 1;
            let args = caps[1].trim();
            total += if args.is_empty() {
                DEFAULT_WAIT_TIME
            } else {
                args.parse::<f64>().unwrap_or(DEFAULT_WAIT_TIME)
            };
        }
    }

    debug!(total, calls, "Extracted scene timing");
    (total, calls)
}

/// Pad the scene out to `target_duration` seconds, then sanitize waits.
pub fn adjust_to_duration(code: &str, target_duration: f64) -> String {
    if target_duration <= 0.0 {
        return sanitize_waits(code);
    }

    let (current, calls) = extract_timing(code);

    let adjusted = if calls == 0 {
        warn!(
            target_duration,
            "No timed calls found, appending a full-duration wait"
        );
        append_final_wait(code, target_duration.max(MIN_WAIT_TIME))
    } else {
        let diff = target_duration - current;
        if diff > DURATION_TOLERANCE {
            info!(
                current,
                target_duration,
                padding = diff,
                "Scene shorter than audio, extending final wait"
            );
            extend_final_wait(code, diff)
        } else {
            if current > target_duration * 1.1 {
                warn!(
                    current,
                    target_duration, "Scene exceeds audio duration by more than 10%"
                );
            }
            code.to_string()
        }
    };

    sanitize_waits(&adjusted)
}

/// Rewrite any `self.wait(x)` with `x <= 0` to the minimum wait.
pub fn sanitize_waits(code: &str) -> String {
    WAIT_NUMERIC_RE
        .replace_all(code, |caps: &Captures| {
            match caps[1].parse::<f64>() {
                Ok(value) if value <= 0.0 => "self.wait(0.10)".to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn extend_final_wait(code: &str, additional: f64) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let last_wait_idx = lines
        .iter()
        .rposition(|l| l.contains("self.wait("));

    match last_wait_idx {
        Some(idx) => {
            let line = lines[idx];
            let indent = INDENT_RE.find(line).map(|m| m.as_str()).unwrap_or("");
            let current_wait = WAIT_RE
                .captures(line)
                .map(|c| c[1].trim().to_string())
                .unwrap_or_default();
            let base = if current_wait.is_empty() {
                DEFAULT_WAIT_TIME
            } else {
                match current_wait.parse::<f64>() {
                    Ok(v) => v,
                    // Unparseable expression: append instead of editing it
                    Err(_) => return append_final_wait(code, additional),
                }
            };
            let new_wait = (base + additional).max(MIN_WAIT_TIME);
            let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
            out[idx] = format!("{indent}self.wait({new_wait:.2})");
            rejoin(out, code)
        }
        None => append_final_wait(code, additional),
    }
}

fn append_final_wait(code: &str, duration: f64) -> String {
    let duration = duration.max(MIN_WAIT_TIME);
    let lines: Vec<&str> = code.lines().collect();

    let last_code_idx = lines
        .iter()
        .rposition(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));

    let indent = last_code_idx
        .and_then(|i| INDENT_RE.find(lines[i]).map(|m| m.as_str().to_string()))
        .unwrap_or_else(|| "        ".to_string());

    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    let insert_at = last_code_idx.map(|i| i + 1).unwrap_or(out.len());
    out.insert(insert_at, format!("{indent}self.wait({duration:.2})"));
    rejoin(out, code)
}

fn rejoin(lines: Vec<String>, original: &str) -> String {
    let mut joined = lines.join("\n");
    if original.ends_with('\n') {
        joined.push('\n');
    }
    joined
}
