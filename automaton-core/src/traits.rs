//! ABOUTME: Cross-crate trait boundaries: host-call surface and chat transport
//! ABOUTME: Concrete implementations live in automaton-executor and the transport adapter

use crate::error::Result;
use crate::types::AgentId;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// HTTP method for `fetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            headers: HashMap::new(),
            body: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// The bounded set of capabilities a synthesized artifact may invoke.
///
/// Every call is bound to a single agent context at construction time —
/// there is no parameter that lets an artifact address another agent's
/// state or act as a different user. `fetch` and `call_plugin` return
/// structured errors rather than raising, per the host-call contract;
/// `notify` is best-effort and never surfaces transport failures back to
/// the artifact.
#[async_trait]
pub trait HostCallSurface: Send + Sync {
    fn agent_id(&self) -> AgentId;

    async fn notify(&self, text: &str);

    async fn get_state(&self, key: &str) -> Result<Option<Value>>;

    async fn set_state(&self, key: &str, value: Value) -> Result<()>;

    async fn fetch(&self, url: &str, opts: FetchOptions) -> Result<FetchResponse>;

    async fn get_ton_balance(&self, address: &str) -> Result<u128>;

    async fn get_secret(&self, name: &str) -> Result<Option<String>>;

    async fn call_plugin(&self, plugin_id: &str, op: &str, args: Value) -> Result<Value>;
}

/// Inline action offered alongside a transport message (e.g. a chat
/// callback button).
#[derive(Debug, Clone)]
pub struct InlineAction {
    pub label: String,
    pub callback_data: String,
}

/// Outbound/inbound chat transport. The orchestrator treats this purely as
/// an opaque renderer: formatting failures fall back to plain text and
/// never propagate into execution correctness paths.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the message id assigned by the transport, used later for
    /// `edit`.
    async fn send(&self, user_id: i64, content: &str, actions: &[InlineAction]) -> Result<String>;

    async fn edit(&self, user_id: i64, message_id: &str, content: &str) -> Result<()>;
}

/// Logs every send/edit instead of delivering anywhere. A real chat
/// transport adapter is out of scope for this runtime; this is the
/// concrete `Transport` the process entrypoint wires up, and it's also
/// what every crate's tests use as their double.
pub struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    async fn send(&self, user_id: i64, content: &str, actions: &[InlineAction]) -> Result<String> {
        let message_id = format!("log-{user_id}-{}", content.len());
        tracing::info!(user_id, message_id, actions = actions.len(), content, "transport: send");
        Ok(message_id)
    }

    async fn edit(&self, user_id: i64, message_id: &str, content: &str) -> Result<()> {
        tracing::info!(user_id, message_id, content, "transport: edit");
        Ok(())
    }
}
