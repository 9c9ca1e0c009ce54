//! Tools exposed to the model during surgical edits.
//!
//! `search_replace` applies a text-level edit that must match uniquely —
//! exact first, whitespace-normalized second, otherwise rejected.
//! `inspect_frames` is purely a request: it does not mutate code; the
//! caller extracts the requested frame and attaches it to the next turn.

use regex::Regex;
use serde_json::json;

use lectio_llm::ToolDeclaration;

/// Apply a unique search/replace to `code`.
pub fn search_replace(code: &str, search: &str, replace: &str) -> Result<String, String> {
    if search.is_empty() {
        return Err("Search text is empty".to_string());
    }

    let exact_count = code.matches(search).count();
    match exact_count {
        1 => return Ok(code.replacen(search, replace, 1)),
        n if n > 1 => {
            return Err(format!(
                "Search text appears {n} times, must be unique"
            ))
        }
        _ => {}
    }

    // Whitespace-normalized match: whitespace runs in the search match any
    // amount of whitespace (including none) in the code.
    let pattern = search
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s*");
    if pattern.is_empty() {
        return Err("Search text not found".to_string());
    }
    let re = Regex::new(&pattern).map_err(|e| format!("Bad search pattern: {e}"))?;
    let matches: Vec<_> = re.find_iter(code).collect();
    match matches.len() {
        1 => {
            let m = matches[0];
            let mut out = String::with_capacity(code.len());
            out.push_str(&code[..m.start()]);
            out.push_str(replace);
            out.push_str(&code[m.end()..]);
            Ok(out)
        }
        0 => Err("Search text not found".to_string()),
        n => Err(format!(
            "Search text appears {n} times after whitespace normalization, must be unique"
        )),
    }
}

/// Declaration for the search/replace edit tool.
pub fn search_replace_declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        "search_replace",
        "Search for exact text in the current scene code and replace it. The search text must match exactly once.",
        json!({
            "type": "object",
            "properties": {
                "search": {
                    "type": "string",
                    "description": "Exact text to search for (must be unique in the file)"
                },
                "replace": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["search", "replace"]
        }),
    )
}

/// Declaration for the frame-inspection request tool.
pub fn inspect_frames_declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        "inspect_frames",
        "Request a screenshot of the rendered scene at a specific timestamp. The frame is attached to the next message.",
        json!({
            "type": "object",
            "properties": {
                "timestamp_seconds": {
                    "type": "number",
                    "description": "Timestamp in seconds to capture"
                }
            },
            "required": ["timestamp_seconds"]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: &str = "\
        title = Text(\"Hello\")
        title.move_to(RIGHT * 20.0)
        self.play(Write(title))
";

    #[test]
    fn test_exact_unique_replace() {
        let out = search_replace(CODE, "RIGHT * 20.0", "RIGHT * 5.5").unwrap();
        assert!(out.contains("RIGHT * 5.5"));
        assert!(!out.contains("20.0"));
    }

    #[test]
    fn test_ambiguous_match_rejected() {
        let code = "x = 1\nx = 1\n";
        let err = search_replace(code, "x = 1", "x = 2").unwrap_err();
        assert!(err.contains("must be unique"));
    }

    #[test]
    fn test_missing_match_rejected() {
        let err = search_replace(CODE, "does_not_exist", "x").unwrap_err();
        assert!(err.contains("not found"));
    }

    #[test]
    fn test_whitespace_normalized_match() {
        // Model quoted the line with different spacing
        let out = search_replace(CODE, "title.move_to( RIGHT  * 20.0 )", "title.move_to(ORIGIN)");
        let out = out.unwrap();
        assert!(out.contains("title.move_to(ORIGIN)"));
    }

    #[test]
    fn test_empty_search_rejected() {
        assert!(search_replace(CODE, "", "x").is_err());
    }
}
