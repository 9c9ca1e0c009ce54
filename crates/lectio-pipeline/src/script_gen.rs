//! Script generation: topic payload → sectioned video plan.

use serde_json::{json, Value};
use tracing::info;

use lectio_llm::{GenerateRequest, LlmClient};
use lectio_models::{Script, VideoMode};

use crate::error::{PipelineError, PipelineResult};

fn script_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "video_mode": {"type": "string"},
            "total_duration_seconds": {"type": "number"},
            "sections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "title": {"type": "string"},
                        "narration": {"type": "string"},
                        "tts_narration": {"type": "string"},
                        "duration_seconds": {"type": "number"},
                        "visual_type": {"type": "string"},
                        "narration_segments": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "text": {"type": "string"},
                                    "estimated_duration": {"type": "number"}
                                },
                                "required": ["text", "estimated_duration"]
                            }
                        }
                    },
                    "required": ["id", "title", "narration", "narration_segments"]
                }
            }
        },
        "required": ["title", "sections"]
    })
}

pub struct ScriptGenerator<'a> {
    client: &'a dyn LlmClient,
}

impl<'a> ScriptGenerator<'a> {
    pub fn new(client: &'a dyn LlmClient) -> Self {
        Self { client }
    }

    /// Generate the script for the selected topics.
    #[allow(clippy::too_many_arguments)]
    pub async fn generate(
        &self,
        topic_payload: &Value,
        content_focus: &str,
        document_context: &str,
        language: &str,
        video_mode: VideoMode,
    ) -> PipelineResult<Script> {
        let (section_range, duration_hint) = match video_mode {
            VideoMode::Overview => ("3 to 5", "30-60 seconds each"),
            VideoMode::Comprehensive => ("4 to 8", "60-180 seconds each"),
        };

        let prompt = format!(
            r#"Write the script for a narrated educational video.

Topics (resolved from document analysis):
{topic_payload}

Mode: {mode} — {section_range} sections, {duration_hint}.
Content focus: {content_focus}. Document context: {document_context}. Narration language: {language}.

Respond with JSON: {{"title", "video_mode", "total_duration_seconds", "sections": [{{"id", "title", "narration", "tts_narration", "duration_seconds", "visual_type", "narration_segments": [{{"text", "estimated_duration"}}]}}]}}.
Section ids must be unique. Per section, narration_segments' estimated_duration values must sum to duration_seconds. Break narration into 2-5 segments at natural pauses."#,
            mode = video_mode.as_str(),
        );

        let request = GenerateRequest::text_prompt(self.client.default_model(), prompt)
            .with_schema(script_schema());
        let response = self.client.generate(request).await?;
        let text_fallback = response.text_or_empty().to_string();

        let value = response
            .parsed_json
            .or_else(|| lectio_llm::gemini::parse_json_lenient(&text_fallback))
            .ok_or_else(|| PipelineError::ScriptFailed("script response was not JSON".into()))?;

        let mut script: Script = serde_json::from_value(value)
            .map_err(|e| PipelineError::ScriptFailed(format!("script did not parse: {e}")))?;
        script.video_mode = Some(video_mode);

        validate_script(&script)?;
        info!(
            title = %script.title,
            sections = script.sections.len(),
            "Script generated"
        );
        Ok(script)
    }
}

/// Reject scripts the orchestrator cannot execute.
pub fn validate_script(script: &Script) -> PipelineResult<()> {
    if script.sections.is_empty() {
        return Err(PipelineError::invalid_input(
            "script contains zero sections",
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for section in &script.sections {
        if !section.id.is_empty() && !seen.insert(section.id.as_str()) {
            return Err(PipelineError::invalid_input(format!(
                "duplicate section id '{}'",
                section.id
            )));
        }
    }
    Ok(())
}
