//! Stage 1: the choreography plan.
//!
//! Asks the model for a schema-constrained layout/timeline plan for the
//! section. Retries climb the temperature ladder; a model that cannot
//! honor the schema degrades to unconstrained JSON (the client disables
//! the schema for the process lifetime on preview models).

use serde_json::json;
use tracing::{debug, warn};

use lectio_llm::{GenerateRequest, LlmClient};
use lectio_models::{ChoreographyPlan, Section, SegmentAudio};

use crate::bounds::{SCREEN_X_LIMIT, SCREEN_Y_LIMIT};
use crate::error::{AnimError, AnimResult};

const PLAN_ATTEMPTS: u32 = 3;
const TEMPERATURE_STEP: f64 = 0.25;

/// JSON schema for the plan (version 2.0 shape).
pub fn plan_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "version": {"type": "string"},
            "scene": {
                "type": "object",
                "properties": {
                    "mode": {"type": "string"},
                    "camera": {"type": "string"},
                    "safe_bounds": {"type": "array", "items": {"type": "number"}}
                }
            },
            "objects": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "kind": {"type": "string"},
                        "zone": {"type": "string"},
                        "data": {"type": "object"}
                    },
                    "required": ["id", "kind"]
                }
            },
            "timeline": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "at": {"type": "number"},
                        "action": {"type": "string"},
                        "object_ids": {"type": "array", "items": {"type": "string"}},
                        "cue": {"type": "string"}
                    },
                    "required": ["id", "at", "action"]
                }
            },
            "constraints": {"type": "object"},
            "notes": {"type": "string"}
        },
        "required": ["version", "scene", "objects", "timeline"]
    })
}

pub struct Choreographer<'a> {
    client: &'a dyn LlmClient,
}

impl<'a> Choreographer<'a> {
    pub fn new(client: &'a dyn LlmClient) -> Self {
        Self { client }
    }

    /// Produce a usable plan, or a `Choreography` error after retries.
    pub async fn plan(
        &self,
        section: &Section,
        segments: &[SegmentAudio],
        audio_duration: f64,
        base_temperature: f64,
    ) -> AnimResult<(ChoreographyPlan, String)> {
        let prompt = self.build_prompt(section, segments, audio_duration);
        let mut last_error = String::from("no attempts made");

        for attempt in 0..PLAN_ATTEMPTS {
            let temperature = (base_temperature + attempt as f64 * TEMPERATURE_STEP).min(2.0);
            // First attempt rides the schema; later ones ask for plain JSON
            // in case the schema itself is steering the model wrong.
            let mut request =
                GenerateRequest::text_prompt(self.client.default_model(), prompt.clone())
                    .with_temperature(temperature)
                    .with_json_output();
            if attempt == 0 {
                request = request.with_schema(plan_schema());
            }

            let response = match self.client.generate(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, error = %e, "Choreography call failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            let raw = response.text_or_empty().to_string();
            let value = response
                .parsed_json
                .or_else(|| lectio_llm::gemini::parse_json_lenient(&raw));

            match value.and_then(|v| serde_json::from_value::<ChoreographyPlan>(v).ok()) {
                Some(plan) if plan.is_usable() => {
                    debug!(
                        attempt,
                        objects = plan.objects.len(),
                        events = plan.timeline.len(),
                        "Choreography plan accepted"
                    );
                    return Ok((plan, raw));
                }
                Some(_) => {
                    last_error = "plan has no objects or timeline".to_string();
                    warn!(attempt, "Choreography plan unusable, retrying hotter");
                }
                None => {
                    last_error = "response was not a parseable plan".to_string();
                    warn!(attempt, "Choreography response unparseable, retrying hotter");
                }
            }
        }

        Err(AnimError::choreography(format!(
            "no usable plan after {PLAN_ATTEMPTS} attempts: {last_error}"
        )))
    }

    fn build_prompt(
        &self,
        section: &Section,
        segments: &[SegmentAudio],
        audio_duration: f64,
    ) -> String {
        let mut cues = String::new();
        for segment in segments {
            cues.push_str(&format!(
                "- [{:.1}s - {:.1}s] {}\n",
                segment.start_time, segment.end_time, segment.text
            ));
        }
        let supporting = section
            .supporting_data
            .as_ref()
            .map(|d| format!("\nSupporting data:\n{d}\n"))
            .unwrap_or_default();

        format!(
            r#"Design a choreography plan (version "2.0") for an animated educational video section.

Section title: {title}
Narration:
{narration}

Narration timeline (audio is {audio_duration:.1} seconds total):
{cues}{supporting}
Respond with JSON: {{"version": "2.0", "scene": {{"mode", "camera", "safe_bounds"}}, "objects": [...], "timeline": [...], "constraints": {{...}}, "notes": "..."}}.
Every object needs an id, a kind (Text, MathTex, Axes, Table, shape), and a layout zone.
Every timeline event needs an id, a start time in seconds aligned to the narration cues, an action, and the object_ids it animates.
All content must stay within x in [-{x:.1}, {x:.1}] and y in [-{y:.1}, {y:.1}]."#,
            title = section.title,
            narration = section.narration,
            x = SCREEN_X_LIMIT,
            y = SCREEN_Y_LIMIT,
        )
    }
}
