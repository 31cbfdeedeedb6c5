//! ABOUTME: The dashboard API surface as a trait, independent of the hyper transport
//! ABOUTME: Every agent-scoped call enforces ownership through automaton-state, never locally

use async_trait::async_trait;
use automaton_core::types::{Agent, AgentId, ExecutionHistoryRow, OwnerId};
use automaton_state::HistoryStats;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct LogLine {
    pub level: String,
    pub message: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Errors the HTTP layer renders to status codes; `NotFound` covers both a
/// missing row and a cross-owner access per the indistinguishable-404 rule.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Everything `automaton-http`'s router can ask of the rest of the runtime.
/// Kept deliberately thin: no business logic lives behind this trait beyond
/// translating HTTP-shaped requests into calls on `automaton-state` and
/// `automaton-scheduler`.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn me(&self, owner_id: OwnerId) -> ApiResult<Value>;
    async fn list_agents(&self, owner_id: OwnerId) -> ApiResult<Vec<Agent>>;
    async fn run_agent(&self, owner_id: OwnerId, agent_id: AgentId) -> ApiResult<Value>;
    async fn stop_agent(&self, owner_id: OwnerId, agent_id: AgentId) -> ApiResult<Value>;
    async fn agent_logs(&self, owner_id: OwnerId, agent_id: AgentId, limit: usize) -> ApiResult<Vec<LogLine>>;
    async fn executions(&self, owner_id: OwnerId, limit: usize) -> ApiResult<Vec<ExecutionHistoryRow>>;
    async fn activity(&self, owner_id: OwnerId, limit: usize) -> ApiResult<Vec<LogLine>>;
    async fn stats(&self, owner_id: OwnerId) -> ApiResult<HistoryStats>;
    async fn get_settings(&self, owner_id: OwnerId) -> ApiResult<Value>;
    async fn put_settings(&self, owner_id: OwnerId, settings: Value) -> ApiResult<()>;
    async fn list_connectors(&self, owner_id: OwnerId) -> ApiResult<Value>;
    async fn put_connector(&self, owner_id: OwnerId, connector_id: &str, config: Value) -> ApiResult<()>;
    async fn delete_connector(&self, owner_id: OwnerId, connector_id: &str) -> ApiResult<()>;
    async fn list_plugins(&self, owner_id: OwnerId) -> ApiResult<Value>;
    async fn install_plugin(&self, owner_id: OwnerId, plugin_id: &str) -> ApiResult<()>;
    async fn uninstall_plugin(&self, owner_id: OwnerId, plugin_id: &str) -> ApiResult<()>;
}
