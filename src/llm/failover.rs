//! Model failover — try each configured model in sequence until one succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::LlmError;
use crate::llm::{GenerateRequest, GenerateResponse, LlmProvider};

/// Wraps an ordered list of providers. Each request walks the list and
/// returns the first success; if every provider fails, the last error is
/// surfaced. There is no retry beyond the single pass.
pub struct FailoverProvider {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl FailoverProvider {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl LlmProvider for FailoverProvider {
    fn model_name(&self) -> &str {
        self.providers
            .first()
            .map(|p| p.model_name())
            .unwrap_or("none")
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let mut last_error = LlmError::NoModels;
        for provider in &self.providers {
            match provider.generate(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(model = provider.model_name(), error = %e, "Model failed, trying next");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
