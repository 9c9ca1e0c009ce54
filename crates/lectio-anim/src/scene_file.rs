//! Scene file assembly and renderer output locations.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::AnimResult;

static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^class\s+([A-Za-z_][A-Za-z0-9_]*)\s*\([^)]*Scene[^)]*\)\s*:").expect("valid regex")
});
static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:python)?\s*(.*?)```").expect("valid regex"));

/// Render quality presets mapped to the renderer's output directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    pub fn flag(&self) -> &'static str {
        match self {
            Quality::Low => "-ql",
            Quality::Medium => "-qm",
            Quality::High => "-qh",
        }
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            Quality::Low => "480p15",
            Quality::Medium => "720p30",
            Quality::High => "1080p60",
        }
    }

    /// The step below, for the reduced-quality render retry.
    pub fn reduced(&self) -> Quality {
        match self {
            Quality::High => Quality::Medium,
            _ => Quality::Low,
        }
    }
}

/// Extract Python source from a model reply, unwrapping a Markdown fence
/// when present.
pub fn extract_code(reply: &str) -> String {
    if let Some(caps) = FENCE_RE.captures(reply) {
        return caps[1].trim().to_string();
    }
    reply.trim().to_string()
}

/// Name of the first Scene subclass in the code.
pub fn find_scene_class(code: &str) -> Option<String> {
    CLASS_RE.captures(code).map(|c| c[1].to_string())
}

/// Wrap generated code into the canonical scene file: wildcard import and
/// the style's background color, keeping the model's class body as-is.
pub fn canonicalize_scene(code: &str, background_color: &str) -> String {
    let mut out = String::new();
    if !code.contains("from manim import") {
        out.push_str("from manim import *\n");
    }
    if !code.contains("config.background_color") {
        out.push_str(&format!("config.background_color = \"{background_color}\"\n"));
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(code.trim_start());
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// File manager for one section's scene artifacts.
#[derive(Debug, Clone)]
pub struct SceneFileManager {
    section_dir: PathBuf,
    section_index: usize,
}

impl SceneFileManager {
    pub fn new(section_dir: impl Into<PathBuf>, section_index: usize) -> Self {
        Self {
            section_dir: section_dir.into(),
            section_index,
        }
    }

    pub fn scene_path(&self) -> PathBuf {
        self.section_dir
            .join(format!("scene_{}.py", self.section_index))
    }

    pub fn media_dir(&self) -> PathBuf {
        self.section_dir.join("media")
    }

    /// A throwaway media dir for dry-run probes so probe artifacts never
    /// mix with real renders.
    pub fn probe_media_dir(&self) -> PathBuf {
        self.section_dir.join("probe_media")
    }

    pub fn plan_path(&self) -> PathBuf {
        self.section_dir.join("choreography_plan.json")
    }

    /// Write the scene source, creating the section dir as needed.
    pub async fn write_scene(&self, code: &str) -> AnimResult<PathBuf> {
        tokio::fs::create_dir_all(&self.section_dir).await?;
        let path = self.scene_path();
        tokio::fs::write(&path, code).await?;
        debug!(path = %path.display(), bytes = code.len(), "Scene file written");
        Ok(path)
    }

    /// Persist the choreography output: parseable JSON as-is, anything
    /// else wrapped in a `plan_text` envelope.
    pub async fn write_plan(&self, plan_content: &str) -> AnimResult<PathBuf> {
        tokio::fs::create_dir_all(&self.section_dir).await?;
        let payload: serde_json::Value = match serde_json::from_str(plan_content) {
            Ok(value) => value,
            Err(_) => serde_json::json!({"plan_text": plan_content}),
        };
        let path = self.plan_path();
        tokio::fs::write(&path, serde_json::to_vec_pretty(&payload)?).await?;
        Ok(path)
    }

    /// Locate the rendered video for `scene_class` under the renderer's
    /// media tree, with a recursive fallback for renderer version drift.
    pub fn find_rendered_video(&self, scene_class: &str, quality: Quality) -> Option<PathBuf> {
        let stem = format!("scene_{}", self.section_index);
        let video_dir = self
            .media_dir()
            .join("videos")
            .join(&stem)
            .join(quality.dir_name());

        let strict = video_dir.join(format!("{scene_class}.mp4"));
        if strict.exists() {
            return Some(strict);
        }
        if let Ok(entries) = std::fs::read_dir(&video_dir) {
            let mut mp4s: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("mp4"))
                .collect();
            mp4s.sort();
            if let Some(first) = mp4s.into_iter().next() {
                return Some(first);
            }
        }
        find_mp4_recursive(&self.media_dir(), scene_class)
    }

    /// Remove partial movie files and stale renders before a fresh render.
    pub async fn cleanup_render_artifacts(&self, quality: Quality) {
        let stem = format!("scene_{}", self.section_index);
        let video_dir = self
            .media_dir()
            .join("videos")
            .join(&stem)
            .join(quality.dir_name());

        let partial = video_dir.join("partial_movie_files");
        if partial.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&partial).await {
                warn!(error = %e, "Failed to remove partial movie files");
            }
        }
        if let Ok(mut entries) = tokio::fs::read_dir(&video_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("mp4") {
                    tokio::fs::remove_file(&path).await.ok();
                }
            }
        }
    }
}

fn find_mp4_recursive(dir: &Path, scene_class: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut fallback = None;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_mp4_recursive(&path, scene_class) {
                return Some(found);
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some("mp4") {
            if path.file_stem().and_then(|s| s.to_str()) == Some(scene_class) {
                return Some(path);
            }
            fallback.get_or_insert(path);
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code_from_fence() {
        let reply = "Here you go:\n```python\nclass S(Scene):\n    pass\n```\nEnjoy.";
        let code = extract_code(reply);
        assert!(code.starts_with("class S"));
        assert!(!code.contains("```"));
    }

    #[test]
    fn test_extract_code_plain() {
        assert_eq!(extract_code("  x = 1  "), "x = 1");
    }

    #[test]
    fn test_find_scene_class() {
        let code = "from manim import *\n\nclass IntroScene(Scene):\n    def construct(self):\n        pass\n";
        assert_eq!(find_scene_class(code), Some("IntroScene".to_string()));
        assert_eq!(find_scene_class("class NotAScene:\n    pass"), None);
        // MovingCameraScene still counts
        let code = "class Z(MovingCameraScene):\n    pass";
        assert_eq!(find_scene_class(code), Some("Z".to_string()));
    }

    #[test]
    fn test_canonicalize_adds_header_once() {
        let code = "class S(Scene):\n    def construct(self):\n        pass\n";
        let out = canonicalize_scene(code, "#101418");
        assert!(out.starts_with("from manim import *"));
        assert!(out.contains("config.background_color = \"#101418\""));

        // Idempotent: a second pass adds nothing
        let again = canonicalize_scene(&out, "#101418");
        assert_eq!(again.matches("from manim import *").count(), 1);
        assert_eq!(again.matches("config.background_color").count(), 1);
    }

    #[test]
    fn test_quality_mapping() {
        assert_eq!(Quality::Low.dir_name(), "480p15");
        assert_eq!(Quality::High.flag(), "-qh");
        assert_eq!(Quality::High.reduced(), Quality::Medium);
        assert_eq!(Quality::Low.reduced(), Quality::Low);
    }

    #[tokio::test]
    async fn test_write_plan_wraps_non_json() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = SceneFileManager::new(tmp.path(), 0);

        mgr.write_plan("not json at all").await.unwrap();
        let raw = std::fs::read_to_string(mgr.plan_path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["plan_text"], "not json at all");

        mgr.write_plan("{\"version\": \"2.0\"}").await.unwrap();
        let raw = std::fs::read_to_string(mgr.plan_path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], "2.0");
    }

    #[test]
    fn test_find_rendered_video_strict_then_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = SceneFileManager::new(tmp.path(), 1);
        let dir = tmp.path().join("media/videos/scene_1/480p15");
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(dir.join("Other.mp4"), b"x").unwrap();
        let found = mgr.find_rendered_video("SectionScene", Quality::Low).unwrap();
        assert_eq!(found.file_name().unwrap(), "Other.mp4");

        std::fs::write(dir.join("SectionScene.mp4"), b"x").unwrap();
        let found = mgr.find_rendered_video("SectionScene", Quality::Low).unwrap();
        assert_eq!(found.file_name().unwrap(), "SectionScene.mp4");
    }
}
