//! ABOUTME: AI model chain abstraction: ordered providers with per-model timeout and fallback
//! ABOUTME: Implements the synthesizer's "coroutines in synthesis" design note as ordered awaits, not speculative parallel calls

use async_trait::async_trait;
use automaton_config::ModelChainEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
    pub model_name: String,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model '{name}' timed out after {elapsed_ms}ms")]
    Timeout { name: String, elapsed_ms: u64 },

    #[error("model '{name}' errored: {message}")]
    Provider { name: String, message: String },
}

/// A single LLM backend. Implementations wrap a concrete API client; this
/// crate ships only `EchoProvider` (a deterministic test double) since the
/// concrete HTTP clients are an external-interface concern per the scope
/// note in §1.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;
}

/// Ordered attempts with per-attempt timeout and fallback to the next
/// entry — never speculative parallel calls, which would waste the
/// synthesis budget for no benefit once the first model answers.
pub struct ModelChain {
    providers: Vec<(Arc<dyn ModelProvider>, Duration)>,
}

impl ModelChain {
    #[must_use]
    pub fn new(providers: Vec<(Arc<dyn ModelProvider>, Duration)>) -> Self {
        Self { providers }
    }

    /// Builds a chain from configuration entries, pairing each with the
    /// matching provider by name. Entries with no matching provider are
    /// skipped with a warning rather than failing construction — an
    /// operator who removes a provider shouldn't have to edit the config
    /// in lockstep.
    #[must_use]
    pub fn from_config(entries: &[ModelChainEntry], registry: &[Arc<dyn ModelProvider>]) -> Self {
        let mut providers = Vec::new();
        for entry in entries {
            if let Some(p) = registry.iter().find(|p| p.name() == entry.name) {
                providers.push((Arc::clone(p), entry.timeout()));
            } else {
                warn!(model = %entry.name, "no provider registered for configured model chain entry");
            }
        }
        Self { providers }
    }

    pub async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let mut last_err = None;
        for (provider, timeout) in &self.providers {
            let attempt = tokio::time::timeout(*timeout, provider.complete(request)).await;
            match attempt {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => {
                    warn!(model = provider.name(), error = %e, "model attempt failed, trying next");
                    last_err = Some(e);
                }
                Err(_) => {
                    warn!(model = provider.name(), "model attempt timed out, trying next");
                    last_err = Some(ModelError::Timeout {
                        name: provider.name().to_string(),
                        elapsed_ms: timeout.as_millis() as u64,
                    });
                }
            }
        }
        Err(last_err.unwrap_or(ModelError::Provider {
            name: "<empty chain>".to_string(),
            message: "no models configured".to_string(),
        }))
    }
}

/// Deterministic test double: echoes a canned response, optionally failing
/// N times before succeeding. Used by synthesizer tests to exercise the
/// retry/fallback path without a real API dependency.
pub struct EchoProvider {
    name: String,
    response: String,
    fail_times: std::sync::atomic::AtomicU32,
}

impl EchoProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: response.into(),
            fail_times: std::sync::atomic::AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn failing_then_succeeding(name: impl Into<String>, response: impl Into<String>, fail_times: u32) -> Self {
        Self {
            name: name.into(),
            response: response.into(),
            fail_times: std::sync::atomic::AtomicU32::new(fail_times),
        }
    }
}

#[async_trait]
impl ModelProvider for EchoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let remaining = self.fail_times.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            return Err(ModelError::Provider {
                name: self.name.clone(),
                message: "simulated failure".to_string(),
            });
        }
        debug!(model = %self.name, "echo provider responding");
        Ok(ModelResponse {
            text: self.response.clone(),
            model_name: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> ModelRequest {
        ModelRequest { system_prompt: "s".into(), user_prompt: "u".into() }
    }

    #[tokio::test]
    async fn chain_falls_back_to_next_model_on_error() {
        let a: Arc<dyn ModelProvider> = Arc::new(EchoProvider::failing_then_succeeding("a", "a-out", 99));
        let b: Arc<dyn ModelProvider> = Arc::new(EchoProvider::new("b", "b-out"));
        let chain = ModelChain::new(vec![(a, Duration::from_millis(500)), (b, Duration::from_millis(500))]);
        let resp = chain.complete(&req()).await.unwrap();
        assert_eq!(resp.model_name, "b");
    }

    #[tokio::test]
    async fn chain_exhausted_returns_error() {
        let a: Arc<dyn ModelProvider> = Arc::new(EchoProvider::failing_then_succeeding("a", "a-out", 99));
        let chain = ModelChain::new(vec![(a, Duration::from_millis(50))]);
        assert!(chain.complete(&req()).await.is_err());
    }

    #[tokio::test]
    async fn first_model_succeeds_without_trying_others() {
        let a: Arc<dyn ModelProvider> = Arc::new(EchoProvider::new("a", "a-out"));
        let b: Arc<dyn ModelProvider> = Arc::new(EchoProvider::failing_then_succeeding("b", "b-out", 99));
        let chain = ModelChain::new(vec![(a, Duration::from_millis(500)), (b, Duration::from_millis(500))]);
        let resp = chain.complete(&req()).await.unwrap();
        assert_eq!(resp.model_name, "a");
    }
}
