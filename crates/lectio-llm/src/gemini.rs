//! Gemini REST client.

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::client::LlmClient;
use crate::error::{LlmError, LlmResult};
use crate::retry::{retry_async, RetryConfig};
use crate::types::{FunctionCall, GenerateRequest, LlmResponse, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";

/// Models that rejected a response schema this process lifetime. Preview
/// builds drift on structured-output support, so one rejection disables
/// schemas for that model until restart.
static SCHEMA_DISABLED_MODELS: Lazy<Mutex<HashSet<String>>> =
    Lazy::new(|| Mutex::new(HashSet::new()));

/// Gemini API client.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    default_model: String,
    vision_model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client from `GEMINI_API_KEY`.
    pub fn from_env() -> LlmResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| LlmError::config("GEMINI_API_KEY not set"))?;
        Ok(Self::new(api_key))
    }

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
            vision_model: std::env::var("GEMINI_VISION_MODEL")
                .unwrap_or_else(|_| DEFAULT_VISION_MODEL.into()),
            client: reqwest::Client::new(),
        }
    }

    /// Override the endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn schema_disabled(model: &str) -> bool {
        SCHEMA_DISABLED_MODELS
            .lock()
            .expect("schema set lock poisoned")
            .contains(model)
    }

    fn disable_schema_for(model: &str) {
        SCHEMA_DISABLED_MODELS
            .lock()
            .expect("schema set lock poisoned")
            .insert(model.to_string());
    }

    fn build_body(request: &GenerateRequest, include_schema: bool) -> Value {
        let mut generation_config = json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_output_tokens,
        });

        let wants_json = request.json_mime || request.response_schema.is_some();
        if wants_json {
            generation_config["responseMimeType"] = json!("application/json");
        }
        if include_schema {
            if let Some(schema) = &request.response_schema {
                generation_config["responseSchema"] = schema.clone();
            }
        }

        let mut body = json!({
            "contents": request.contents,
            "generationConfig": generation_config,
        });

        if !request.tools.is_empty() {
            body["tools"] = json!([{
                "functionDeclarations": request.tools,
            }]);
        }
        body
    }

    async fn call_once(&self, request: &GenerateRequest, include_schema: bool) -> LlmResult<LlmResponse> {
        let body = Self::build_body(request, include_schema);
        debug!(model = %request.model, include_schema, "Calling Gemini");

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(request.timeout_secs))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(request.timeout_secs)
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let api: ApiResponse = response.json().await.map_err(LlmError::Http)?;
        parse_api_response(api, &request.model, request.json_mime || request.response_schema.is_some())
    }

    async fn call_with_schema_fallback(&self, request: &GenerateRequest) -> LlmResult<LlmResponse> {
        let schema_active =
            request.response_schema.is_some() && !Self::schema_disabled(&request.model);

        match self.call_once(request, schema_active).await {
            Err(e) if schema_active && e.is_schema_incompatible() => {
                warn!(
                    model = %request.model,
                    error = %e,
                    "Model rejected response schema, retrying without it"
                );
                if request.model.contains("preview") {
                    Self::disable_schema_for(&request.model);
                }
                self.call_once(request, false).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<LlmResponse> {
        let config = RetryConfig::new(format!("gemini:{}", request.model))
            .with_max_retries(request.max_retries);
        retry_async(&config, LlmError::is_transient, || {
            self.call_with_schema_fallback(&request)
        })
        .await
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn vision_model(&self) -> &str {
        &self.vision_model
    }
}

// Provider wire types.

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize, Default)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
}

fn parse_api_response(api: ApiResponse, model: &str, expect_json: bool) -> LlmResult<LlmResponse> {
    let candidate = api
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::EmptyResponse {
            model: model.to_string(),
        })?;

    let mut text = String::new();
    let mut function_calls = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(call) = part.function_call {
            function_calls.push(call);
        }
    }

    if text.trim().is_empty() && function_calls.is_empty() {
        return Err(LlmError::EmptyResponse {
            model: model.to_string(),
        });
    }

    let parsed_json = if expect_json && !text.trim().is_empty() {
        parse_json_lenient(&text)
    } else {
        None
    };

    let usage = api
        .usage_metadata
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    Ok(LlmResponse {
        text: if text.is_empty() { None } else { Some(text) },
        function_calls,
        parsed_json,
        usage,
    })
}

/// Parse model output as JSON, stripping Markdown code fences when present.
pub fn parse_json_lenient(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    // ```json ... ``` fences
    let without_fence = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim);
    if let Some(inner) = without_fence {
        if let Ok(value) = serde_json::from_str(inner) {
            return Some(value);
        }
    }
    // Last resort: the outermost brace span
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        serde_json::from_str(&trimmed[start..=end]).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_response(text: &str) -> Value {
        json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5}
        })
    }

    #[test]
    fn test_parse_json_lenient_variants() {
        assert!(parse_json_lenient("{\"a\": 1}").is_some());
        assert!(parse_json_lenient("```json\n{\"a\": 1}\n```").is_some());
        assert!(parse_json_lenient("Here is the plan:\n{\"a\": 1}\nDone.").is_some());
        assert!(parse_json_lenient("no json here").is_none());
    }

    #[test]
    fn test_build_body_includes_tools_and_schema() {
        let req = GenerateRequest::text_prompt("m", "p")
            .with_schema(json!({"type": "object"}))
            .with_tools(vec![crate::tools::ToolDeclaration::new(
                "t",
                "d",
                json!({"type": "object"}),
            )]);
        let body = GeminiClient::build_body(&req, true);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            json!("application/json")
        );
        assert!(body["generationConfig"]["responseSchema"].is_object());
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "t");

        // Schema suppressed but JSON mime kept when disabled
        let body = GeminiClient::build_body(&req, false);
        assert!(body["generationConfig"].get("responseSchema").is_none());
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            json!("application/json")
        );
    }

    #[tokio::test]
    async fn test_generate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r".*:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("hello")))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key").with_base_url(server.uri());
        let response = client
            .generate(GenerateRequest::text_prompt("gemini-2.5-flash", "hi"))
            .await
            .unwrap();
        assert_eq!(response.text_or_empty(), "hello");
        assert_eq!(response.usage.output_tokens, 5);
    }

    #[tokio::test]
    async fn test_generate_retries_transient_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("recovered")))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key").with_base_url(server.uri());
        let response = client
            .generate(GenerateRequest::text_prompt("gemini-2.5-flash", "hi"))
            .await
            .unwrap();
        assert_eq!(response.text_or_empty(), "recovered");
    }

    #[tokio::test]
    async fn test_schema_incompatible_falls_back_and_disables_preview_model() {
        let server = MockServer::start().await;
        // First call (with schema) rejected, second (without) succeeds.
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string("response_schema is not supported for this model"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(text_response("{\"ok\": true}")),
            )
            .mount(&server)
            .await;

        let model = "gemini-schema-test-preview";
        let client = GeminiClient::new("test-key").with_base_url(server.uri());
        let response = client
            .generate(
                GenerateRequest::text_prompt(model, "plan")
                    .with_schema(json!({"type": "object"})),
            )
            .await
            .unwrap();
        assert_eq!(response.parsed_json, Some(json!({"ok": true})));
        assert!(GeminiClient::schema_disabled(model));
    }

    #[tokio::test]
    async fn test_function_call_parsing() {
        let server = MockServer::start().await;
        let body = json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "search_replace", "args": {"search": "a", "replace": "b"}}}
            ]}}]
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key").with_base_url(server.uri());
        let response = client
            .generate(GenerateRequest::text_prompt("gemini-2.5-flash", "fix"))
            .await
            .unwrap();
        assert_eq!(response.function_calls.len(), 1);
        assert_eq!(response.function_calls[0].name, "search_replace");
    }
}
