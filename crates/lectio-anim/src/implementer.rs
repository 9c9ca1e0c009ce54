//! Stage 2: scene code generation from the plan.

use tracing::debug;

use lectio_llm::{GenerateRequest, LlmClient};
use lectio_models::{ChoreographyPlan, Section};

use crate::bounds::{SAFE_X_LIMIT, SAFE_Y_LIMIT};
use crate::error::{AnimError, AnimResult};
use crate::scene_file::{canonicalize_scene, extract_code, find_scene_class};

/// Pinned API notes handed to the model so generated code targets the
/// renderer version we ship, not whatever the model remembers.
const API_REFERENCE: &str = r#"API notes (follow exactly):
- `from manim import *` is available; do not import anything else.
- One Scene subclass with a `construct(self)` method; no __main__ block.
- Use `self.play(...)` with explicit `run_time=` and `self.wait(x)` with x > 0.
- ValueTracker values are read with `.get_value()`, never `.number`.
- Directions are UP/DOWN/LEFT/RIGHT/ORIGIN; TOP, BOTTOM and CENTER do not exist.
- Table cells are addressed with `table.get_cell(row, col)` (1-based).
- One statement per line; no semicolons, no nested statement chains."#;

pub struct Implementer<'a> {
    client: &'a dyn LlmClient,
}

impl<'a> Implementer<'a> {
    pub fn new(client: &'a dyn LlmClient) -> Self {
        Self { client }
    }

    /// Generate the scene source for `plan`. Empty or class-less output is
    /// an `Implementation` error the outer loop may retry hotter.
    pub async fn implement(
        &self,
        section: &Section,
        plan: &ChoreographyPlan,
        audio_duration: f64,
        style_background: &str,
        language: &str,
        temperature: f64,
    ) -> AnimResult<String> {
        let prompt = self.build_prompt(section, plan, audio_duration, language)?;
        let request = GenerateRequest::text_prompt(self.client.default_model(), prompt)
            .with_temperature(temperature);

        let response = self.client.generate(request).await?;
        let code = extract_code(response.text_or_empty());

        if code.trim().is_empty() {
            return Err(AnimError::implementation("model returned empty code"));
        }
        if find_scene_class(&code).is_none() {
            return Err(AnimError::implementation(
                "generated code declares no Scene subclass",
            ));
        }

        let canonical = canonicalize_scene(&code, style_background);
        debug!(
            bytes = canonical.len(),
            class = ?find_scene_class(&canonical),
            "Scene code generated"
        );
        Ok(canonical)
    }

    fn build_prompt(
        &self,
        section: &Section,
        plan: &ChoreographyPlan,
        audio_duration: f64,
        language: &str,
    ) -> AnimResult<String> {
        let plan_json = serde_json::to_string_pretty(plan)?;
        let visual_type = section.visual_type.as_deref().unwrap_or("explainer");

        Ok(format!(
            r#"Write a complete Manim scene implementing this choreography plan.

Section: {title}
Animation type: {visual_type}
On-screen text language: {language}
Target duration: {audio_duration:.1} seconds (matches the narration audio).

Choreography plan:
{plan_json}

{API_REFERENCE}

Layout constraints: keep every object's extent within x in [-{x:.1}, {x:.1}] and y in [-{y:.1}, {y:.1}].
Name the class after the section (e.g. `SectionScene`). Reply with a single Python code block."#,
            title = section.title,
            x = SAFE_X_LIMIT,
            y = SAFE_Y_LIMIT,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lectio_llm::{LlmResponse, LlmResult};

    struct OneShotClient {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for OneShotClient {
        async fn generate(&self, _request: GenerateRequest) -> LlmResult<LlmResponse> {
            Ok(LlmResponse {
                text: Some(self.reply.clone()),
                ..Default::default()
            })
        }

        fn default_model(&self) -> &str {
            "test-model"
        }
    }

    fn section() -> Section {
        Section {
            title: "Vectors".into(),
            ..Default::default()
        }
    }

    fn plan() -> ChoreographyPlan {
        ChoreographyPlan {
            objects: vec![Default::default()],
            timeline: vec![Default::default()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_implement_wraps_code() {
        let client = OneShotClient {
            reply: "```python\nclass SectionScene(Scene):\n    def construct(self):\n        self.wait(1.0)\n```".into(),
        };
        let implementer = Implementer::new(&client);
        let code = implementer
            .implement(&section(), &plan(), 10.0, "#101418", "en", 0.7)
            .await
            .unwrap();
        assert!(code.starts_with("from manim import *"));
        assert!(code.contains("config.background_color = \"#101418\""));
        assert!(code.contains("class SectionScene(Scene):"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_implementation_error() {
        let client = OneShotClient { reply: "   ".into() };
        let implementer = Implementer::new(&client);
        let err = implementer
            .implement(&section(), &plan(), 10.0, "#101418", "en", 0.7)
            .await
            .unwrap_err();
        assert!(matches!(err, AnimError::Implementation(_)));
    }

    #[tokio::test]
    async fn test_classless_reply_is_implementation_error() {
        let client = OneShotClient {
            reply: "```python\nprint('hi')\n```".into(),
        };
        let implementer = Implementer::new(&client);
        let err = implementer
            .implement(&section(), &plan(), 10.0, "#101418", "en", 0.7)
            .await
            .unwrap_err();
        assert!(matches!(err, AnimError::Implementation(_)));
    }
}
