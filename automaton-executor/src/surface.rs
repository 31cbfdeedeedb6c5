//! ABOUTME: Concrete Host-Call Surface bound to one agent context
//! ABOUTME: Every method here is the only way a sandboxed artifact can touch the outside world

use crate::adapters::{ChainDataAdapter, PluginRegistry, SecretsProvider};
use async_trait::async_trait;
use automaton_core::error::{AgentError, Result};
use automaton_core::traits::{FetchOptions, FetchResponse, HostCallSurface, HttpMethod, Transport};
use automaton_core::types::{AgentId, OwnerId};
use automaton_state::StateSubstrate;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Binds the seven host calls to one agent's state, owner, and the shared
/// transport/adapters. `fetch`'s timeout is capped to the lesser of the
/// caller's request and a hard ceiling — the outer sandbox wall-clock
/// timeout is what ultimately bounds it, this is just good citizenship so
/// one call can't hog the whole budget.
pub struct AgentHostCallSurface {
    agent_id: AgentId,
    owner_id: OwnerId,
    state: Arc<StateSubstrate>,
    transport: Arc<dyn Transport>,
    chain: Arc<dyn ChainDataAdapter>,
    secrets: Arc<dyn SecretsProvider>,
    plugins: Arc<dyn PluginRegistry>,
    http_client: reqwest::Client,
}

impl AgentHostCallSurface {
    #[must_use]
    pub fn new(
        agent_id: AgentId,
        owner_id: OwnerId,
        state: Arc<StateSubstrate>,
        transport: Arc<dyn Transport>,
        chain: Arc<dyn ChainDataAdapter>,
        secrets: Arc<dyn SecretsProvider>,
        plugins: Arc<dyn PluginRegistry>,
    ) -> Self {
        Self {
            agent_id,
            owner_id,
            state,
            transport,
            chain,
            secrets,
            plugins,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HostCallSurface for AgentHostCallSurface {
    fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self.transport.send(self.owner_id, text, &[]).await {
            warn!(agent_id = self.agent_id, error = %e, "notify delivery failed, swallowed per host-call contract");
        }
    }

    async fn get_state(&self, key: &str) -> Result<Option<Value>> {
        self.state
            .kv
            .get(self.agent_id, key)
            .await
            .map_err(|e| AgentError::integration(e.to_string()))
    }

    async fn set_state(&self, key: &str, value: Value) -> Result<()> {
        self.state
            .kv
            .set(self.agent_id, self.owner_id, key, value)
            .await
            .map_err(|e| AgentError::integration(e.to_string()))
    }

    async fn fetch(&self, url: &str, opts: FetchOptions) -> Result<FetchResponse> {
        const HARD_CEILING_MS: u64 = 30_000;
        let timeout = Duration::from_millis(opts.timeout_ms.min(HARD_CEILING_MS));

        let method = match opts.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut req = self.http_client.request(method, url).timeout(timeout);
        for (k, v) in &opts.headers {
            req = req.header(k, v);
        }
        if let Some(body) = opts.body {
            req = req.body(body);
        }

        // fetch failures are returned as structured errors to the artifact,
        // never thrown/propagated as a sandbox-runtime fault.
        match req.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let headers = resp
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                    .collect();
                let body = resp.text().await.unwrap_or_default();
                Ok(FetchResponse { status, headers, body })
            }
            Err(e) => Err(AgentError::integration(format!("fetch failed: {e}"))),
        }
    }

    async fn get_ton_balance(&self, address: &str) -> Result<u128> {
        self.chain
            .get_ton_balance(address)
            .await
            .map_err(AgentError::integration)
    }

    async fn get_secret(&self, name: &str) -> Result<Option<String>> {
        self.secrets
            .get_secret(self.owner_id, name)
            .await
            .map_err(AgentError::integration)
    }

    async fn call_plugin(&self, plugin_id: &str, op: &str, args: Value) -> Result<Value> {
        if !self.plugins.is_installed(self.owner_id, plugin_id).await {
            return Err(AgentError::PluginNotInstalled { plugin_id: plugin_id.to_string() });
        }
        self.plugins
            .call(self.owner_id, plugin_id, op, args)
            .await
            .map_err(AgentError::integration)
    }
}
