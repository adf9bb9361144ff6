//! LLM integration for Inbox Assist.
//!
//! One trait, two implementations:
//! - **AnthropicProvider**: direct messages-API access via reqwest
//! - **FailoverProvider**: ordered model fallback per request
//!
//! The service is treated as at-least-one-shot text generation — callers
//! must defensively extract any structured content from the reply.

pub mod anthropic;
pub mod failover;

pub use anthropic::AnthropicProvider;
pub use failover::FailoverProvider;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::LlmSettings;
use crate::error::LlmError;

/// A single text-generation request: fixed system instruction + user prompt.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerateRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.2,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Generated text plus token accounting.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Text-generation provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier used for requests and log context.
    fn model_name(&self) -> &str;

    /// Generate text for one request.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError>;
}

/// Build the provider stack from settings: one Anthropic provider per
/// configured model id, wrapped in failover order.
pub fn create_provider(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if settings.models.is_empty() {
        return Err(LlmError::NoModels);
    }
    let providers: Vec<Arc<dyn LlmProvider>> = settings
        .models
        .iter()
        .map(|model| {
            Arc::new(AnthropicProvider::new(settings.api_key.clone(), model)) as Arc<dyn LlmProvider>
        })
        .collect();
    tracing::info!(models = %settings.models.join(", "), "LLM providers configured");
    Ok(Arc::new(FailoverProvider::new(providers)))
}
