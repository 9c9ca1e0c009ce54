//! The provider contract consumed by the pipeline.

use async_trait::async_trait;

use crate::error::LlmResult;
use crate::types::{GenerateRequest, LlmResponse};

/// Text/multimodal generation with optional tools and response schema.
///
/// Implementations absorb provider quirks: transient retries, model
/// fallbacks, and structured-output degradation. Callers treat a returned
/// error as a stage failure.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<LlmResponse>;

    /// Default model for text generation.
    fn default_model(&self) -> &str;

    /// Model used for frame/vision analysis.
    fn vision_model(&self) -> &str {
        self.default_model()
    }
}
