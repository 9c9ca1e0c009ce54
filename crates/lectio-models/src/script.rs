//! The video script: the plan a job executes.
//!
//! Scripts exist on disk in two shapes: the flat form written by this
//! pipeline, and a wrapped `{script, mode, output_language}` envelope left
//! behind by earlier writers. Readers must tolerate both.

use serde::{Deserialize, Serialize};

/// Overall pacing of the produced video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoMode {
    Comprehensive,
    #[default]
    Overview,
}

impl VideoMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoMode::Comprehensive => "comprehensive",
            VideoMode::Overview => "overview",
        }
    }
}

/// One narration segment inside a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationSegment {
    pub text: String,
    /// Planned spoken duration in seconds
    #[serde(default)]
    pub estimated_duration: f64,
}

/// One section of the script; becomes one narrated animated segment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Section {
    /// Stable identifier, unique within the script
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Human-readable narration
    #[serde(default)]
    pub narration: String,
    /// Spoken form when it differs from `narration` (abbreviations expanded etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_narration: Option<String>,
    #[serde(default)]
    pub narration_segments: Vec<NarrationSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_type: Option<String>,
    /// Free-form data bindings for the animation (tables, series, labels)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supporting_data: Option<serde_json::Value>,
}

impl Section {
    /// The text handed to the TTS engine.
    pub fn spoken_text(&self) -> &str {
        self.tts_narration.as_deref().unwrap_or(&self.narration)
    }

    /// Planned duration, falling back to the sum of segment estimates.
    pub fn planned_duration(&self) -> f64 {
        self.duration_seconds.unwrap_or_else(|| {
            self.narration_segments
                .iter()
                .map(|s| s.estimated_duration)
                .sum()
        })
    }

    /// Segments to synthesize. An empty list yields one synthetic segment
    /// covering the whole narration so downstream code never sees zero
    /// segments.
    pub fn effective_segments(&self) -> Vec<NarrationSegment> {
        if !self.narration_segments.is_empty() {
            return self.narration_segments.clone();
        }
        vec![NarrationSegment {
            text: self.spoken_text().to_string(),
            estimated_duration: self.duration_seconds.unwrap_or(10.0).max(1.0),
        }]
    }
}

/// The full plan for one video.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Script {
    #[serde(default)]
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_mode: Option<VideoMode>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_seconds: Option<f64>,
}

impl Script {
    /// Total planned duration across sections.
    pub fn total_duration(&self) -> f64 {
        self.total_duration_seconds
            .unwrap_or_else(|| self.sections.iter().map(|s| s.planned_duration()).sum())
    }
}

/// Legacy on-disk envelope around a script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedScript {
    pub script: Script,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_language: Option<String>,
}

impl Script {
    /// Parse a script from JSON, accepting both the flat form and the
    /// wrapped `{script: {...}}` envelope.
    pub fn from_json_value(value: serde_json::Value) -> Result<Script, serde_json::Error> {
        if value.get("script").map(|s| s.is_object()).unwrap_or(false) {
            let wrapped: WrappedScript = serde_json::from_value(value)?;
            Ok(wrapped.script)
        } else {
            serde_json::from_value(value)
        }
    }
}
