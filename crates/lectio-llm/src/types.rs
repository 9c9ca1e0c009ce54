//! Request and response types for the provider contract.

use serde::{Deserialize, Serialize};

use crate::tools::ToolDeclaration;

/// One part of a message: text or inline image bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponsePart,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded payload
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponsePart {
    pub name: String,
    pub response: serde_json::Value,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Inline image from raw bytes.
    pub fn image(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        use base64::Engine as _;
        Part::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.into(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        }
    }

    pub fn function_response(name: impl Into<String>, response: serde_json::Value) -> Self {
        Part::FunctionResponse {
            function_response: FunctionResponsePart {
                name: name.into(),
                response,
            },
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Part::FunctionCall {
            function_call: call,
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".to_string(),
            parts,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Part::text(text)])
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: "model".to_string(),
            parts,
        }
    }
}

/// A tool invocation chosen by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// A generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub contents: Vec<Content>,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub tools: Vec<ToolDeclaration>,
    /// JSON schema the response must conform to, when the model supports it
    pub response_schema: Option<serde_json::Value>,
    /// Request JSON output without a schema
    pub json_mime: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, contents: Vec<Content>) -> Self {
        Self {
            model: model.into(),
            contents,
            temperature: 1.0,
            max_output_tokens: 8192,
            tools: Vec::new(),
            response_schema: None,
            json_mime: false,
            timeout_secs: 120,
            max_retries: 3,
        }
    }

    pub fn text_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(model, vec![Content::user_text(prompt)])
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.min(2.0);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_mime = true;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// A successful generation.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text: Option<String>,
    pub function_calls: Vec<FunctionCall>,
    /// Populated when the request asked for JSON and the text parsed
    pub parsed_json: Option<serde_json::Value>,
    pub usage: TokenUsage,
}

impl LlmResponse {
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn has_content(&self) -> bool {
        self.text.as_deref().map(|t| !t.trim().is_empty()).unwrap_or(false)
            || !self.function_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_part_base64() {
        let part = Part::image(&[0xFF, 0xD8], "image/jpeg");
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(json["inlineData"]["data"], "/9g=");
    }

    #[test]
    fn test_temperature_capped() {
        let req = GenerateRequest::text_prompt("m", "p").with_temperature(3.5);
        assert!((req.temperature - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_response_has_content() {
        assert!(!LlmResponse::default().has_content());
        let r = LlmResponse {
            text: Some("  ".into()),
            ..Default::default()
        };
        assert!(!r.has_content());
        let r = LlmResponse {
            function_calls: vec![FunctionCall {
                name: "t".into(),
                args: serde_json::Value::Null,
            }],
            ..Default::default()
        };
        assert!(r.has_content());
    }
}
