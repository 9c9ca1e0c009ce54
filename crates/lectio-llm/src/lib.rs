//! LLM provider contract and the Gemini client behind it.
//!
//! The rest of the pipeline only sees [`LlmClient`]: a single `generate`
//! call taking text and image parts, optional tool declarations, and an
//! optional response schema, returning text, parsed JSON, or function
//! calls. Provider quirks (schema support, model fallbacks, transient
//! failures) are absorbed here.

pub mod client;
pub mod error;
pub mod gemini;
pub mod retry;
pub mod tools;
pub mod types;

pub use client::LlmClient;
pub use error::{LlmError, LlmResult};
pub use gemini::GeminiClient;
pub use retry::{retry_async, RetryConfig};
pub use tools::{ToolDeclaration, ToolOutcome, ToolRegistry};
pub use types::{Content, FunctionCall, GenerateRequest, LlmResponse, Part, TokenUsage};
