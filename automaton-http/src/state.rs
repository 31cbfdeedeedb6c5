//! ABOUTME: AppState bundles the collaborators the dashboard API needs and implements DashboardApi
//! ABOUTME: Settings/connectors/plugins are thin non-durable stubs — the catalog UI is out of scope

use crate::api::{ApiError, ApiResult, DashboardApi, LogLine};
use crate::auth::AuthRegistry;
use async_trait::async_trait;
use automaton_core::types::{Agent, AgentId, ExecutionHistoryRow, LogLevel, OwnerId};
use automaton_scheduler::{DispatchOutcome, TriggerRouter, TriggerSource};
use automaton_state::{HistoryStats, StateError, StateSubstrate};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

fn to_api_err(e: StateError) -> ApiError {
    match e {
        StateError::NotFoundOrForbidden => ApiError::NotFound,
        StateError::SafetyGate { reason } | StateError::InvalidTrigger(reason) => ApiError::BadRequest(reason),
        other => ApiError::Internal(other.to_string()),
    }
}

fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
        LogLevel::Success => "success",
    }
}

/// Non-durable per-owner settings/connector/plugin bags. These are thin
/// pass-throughs for the companion dashboard, not part of the execution
/// runtime's durable state — a restart resets them, matching how the
/// marketplace/connector catalog itself is out of scope here.
#[derive(Default)]
struct DashboardExtras {
    settings: DashMap<OwnerId, Value>,
    connectors: DashMap<(OwnerId, String), Value>,
    installed_plugins: DashMap<(OwnerId, String), ()>,
}

pub struct AppState {
    pub state: Arc<StateSubstrate>,
    pub router: Arc<TriggerRouter>,
    pub auth: Arc<AuthRegistry>,
    extras: DashboardExtras,
}

impl AppState {
    #[must_use]
    pub fn new(state: Arc<StateSubstrate>, router: Arc<TriggerRouter>, auth: Arc<AuthRegistry>) -> Self {
        Self { state, router, auth, extras: DashboardExtras::default() }
    }
}

#[async_trait]
impl DashboardApi for AppState {
    async fn me(&self, owner_id: OwnerId) -> ApiResult<Value> {
        Ok(serde_json::json!({ "owner_id": owner_id }))
    }

    async fn list_agents(&self, owner_id: OwnerId) -> ApiResult<Vec<Agent>> {
        self.state.artifacts.list_by_owner(owner_id).await.map_err(to_api_err)
    }

    async fn run_agent(&self, owner_id: OwnerId, agent_id: AgentId) -> ApiResult<Value> {
        let agent = self.state.artifacts.get(owner_id, agent_id).await.map_err(to_api_err)?;
        match self
            .router
            .dispatch(owner_id, agent_id, agent.trigger.kind(), TriggerSource::Manual)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
        {
            DispatchOutcome::Ran { execution_id, outcome } => Ok(serde_json::json!({
                "execution_id": execution_id,
                "success": outcome.success,
                "error": outcome.error,
            })),
            DispatchOutcome::Busy { retry_hint } => Ok(serde_json::json!({ "busy": true, "retry_hint": retry_hint })),
            DispatchOutcome::Dropped => Ok(serde_json::json!({ "dropped": true })),
        }
    }

    async fn stop_agent(&self, owner_id: OwnerId, agent_id: AgentId) -> ApiResult<Value> {
        // "Stop" deactivates the agent; an in-flight sandbox run is bounded
        // by its own wall-clock budget and is not forcibly interrupted.
        self.state
            .artifacts
            .update_metadata(owner_id, agent_id, None, None, None, Some(false))
            .await
            .map_err(to_api_err)?;
        Ok(serde_json::json!({ "stopped": true }))
    }

    async fn agent_logs(&self, owner_id: OwnerId, agent_id: AgentId, limit: usize) -> ApiResult<Vec<LogLine>> {
        self.state.artifacts.get(owner_id, agent_id).await.map_err(to_api_err)?;
        let entries = self.state.logs.read_by_agent(agent_id, limit, 0).await.map_err(to_api_err)?;
        Ok(entries
            .into_iter()
            .map(|e| LogLine { level: log_level_label(e.level).to_string(), message: e.message, created_at: e.created_at })
            .collect())
    }

    async fn executions(&self, owner_id: OwnerId, limit: usize) -> ApiResult<Vec<ExecutionHistoryRow>> {
        self.state.history.by_owner(owner_id, limit).await.map_err(to_api_err)
    }

    async fn activity(&self, owner_id: OwnerId, limit: usize) -> ApiResult<Vec<LogLine>> {
        let entries = self.state.logs.read_by_owner(owner_id, limit).await.map_err(to_api_err)?;
        Ok(entries
            .into_iter()
            .map(|e| LogLine { level: log_level_label(e.level).to_string(), message: e.message, created_at: e.created_at })
            .collect())
    }

    async fn stats(&self, owner_id: OwnerId) -> ApiResult<HistoryStats> {
        self.state.history.stats(owner_id).await.map_err(to_api_err)
    }

    async fn get_settings(&self, owner_id: OwnerId) -> ApiResult<Value> {
        Ok(self.extras.settings.get(&owner_id).map(|v| v.clone()).unwrap_or_else(|| serde_json::json!({})))
    }

    async fn put_settings(&self, owner_id: OwnerId, settings: Value) -> ApiResult<()> {
        self.extras.settings.insert(owner_id, settings);
        Ok(())
    }

    async fn list_connectors(&self, owner_id: OwnerId) -> ApiResult<Value> {
        let connectors: serde_json::Map<String, Value> = self
            .extras
            .connectors
            .iter()
            .filter(|e| e.key().0 == owner_id)
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        Ok(Value::Object(connectors))
    }

    async fn put_connector(&self, owner_id: OwnerId, connector_id: &str, config: Value) -> ApiResult<()> {
        self.extras.connectors.insert((owner_id, connector_id.to_string()), config);
        Ok(())
    }

    async fn delete_connector(&self, owner_id: OwnerId, connector_id: &str) -> ApiResult<()> {
        self.extras.connectors.remove(&(owner_id, connector_id.to_string()));
        Ok(())
    }

    async fn list_plugins(&self, owner_id: OwnerId) -> ApiResult<Value> {
        let installed: Vec<String> = self
            .extras
            .installed_plugins
            .iter()
            .filter(|e| e.key().0 == owner_id)
            .map(|e| e.key().1.clone())
            .collect();
        Ok(serde_json::json!({ "installed": installed }))
    }

    async fn install_plugin(&self, owner_id: OwnerId, plugin_id: &str) -> ApiResult<()> {
        self.extras.installed_plugins.insert((owner_id, plugin_id.to_string()), ());
        Ok(())
    }

    async fn uninstall_plugin(&self, owner_id: OwnerId, plugin_id: &str) -> ApiResult<()> {
        self.extras.installed_plugins.remove(&(owner_id, plugin_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automaton_config::AgentConfig;
    use automaton_core::types::Trigger;
    use automaton_executor::{NullAdapters, SandboxLimits};
    use automaton_providers::{EchoProvider, ModelChain};
    use automaton_security::{ArtifactProgram, Expr, HostCall, Stmt};
    use automaton_state::{MemoryBackend, StorageBackend};
    use automaton_synthesizer::Synthesizer;
    use std::time::Duration;

    struct NullTransport;

    #[async_trait::async_trait]
    impl automaton_core::traits::Transport for NullTransport {
        async fn send(
            &self,
            _user_id: i64,
            _content: &str,
            _actions: &[automaton_core::traits::InlineAction],
        ) -> automaton_core::error::Result<String> {
            Ok("m".to_string())
        }
        async fn edit(&self, _user_id: i64, _message_id: &str, _content: &str) -> automaton_core::error::Result<()> {
            Ok(())
        }
    }

    fn notify_artifact() -> String {
        ArtifactProgram {
            statements: vec![Stmt::Expr(Expr::HostCall { call: HostCall::Notify, args: vec![Expr::Literal(serde_json::json!("hi"))] })],
        }
        .to_text()
    }

    async fn app() -> (AppState, AgentId) {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let state = Arc::new(StateSubstrate::new(backend, Duration::from_secs(1800)));
        let agent = state.artifacts.create(1, "n".into(), "".into(), notify_artifact(), Trigger::Manual).await.unwrap();
        state.artifacts.update_metadata(1, agent.id, None, None, None, Some(true)).await.unwrap();

        let provider: Arc<dyn automaton_providers::ModelProvider> = Arc::new(EchoProvider::new("m", notify_artifact()));
        let chain = ModelChain::new(vec![(provider, Duration::from_secs(1))]);
        let synthesizer = Arc::new(Synthesizer::new(chain, &AgentConfig::default()));
        let router = Arc::new(TriggerRouter::new(
            Arc::clone(&state),
            Arc::new(NullTransport),
            Arc::new(NullAdapters),
            Arc::new(NullAdapters),
            Arc::new(NullAdapters),
            synthesizer,
            SandboxLimits { wall_clock: Duration::from_secs(5), memory_cap_bytes: 1_000_000 },
            1,
            8,
        ));
        (AppState::new(state, router, Arc::new(AuthRegistry::new())), agent.id)
    }

    #[tokio::test]
    async fn run_agent_records_an_execution() {
        let (app, agent_id) = app().await;
        let result = app.run_agent(1, agent_id).await.unwrap();
        assert_eq!(result["success"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn cross_owner_run_is_not_found() {
        let (app, agent_id) = app().await;
        assert!(matches!(app.run_agent(2, agent_id).await, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn settings_round_trip_per_owner() {
        let (app, _) = app().await;
        app.put_settings(1, serde_json::json!({"theme": "dark"})).await.unwrap();
        assert_eq!(app.get_settings(1).await.unwrap()["theme"], serde_json::json!("dark"));
        assert_eq!(app.get_settings(2).await.unwrap(), serde_json::json!({}));
    }

    #[tokio::test]
    async fn plugin_install_then_uninstall() {
        let (app, _) = app().await;
        app.install_plugin(1, "dex").await.unwrap();
        assert_eq!(app.list_plugins(1).await.unwrap()["installed"], serde_json::json!(["dex"]));
        app.uninstall_plugin(1, "dex").await.unwrap();
        assert_eq!(app.list_plugins(1).await.unwrap()["installed"], serde_json::json!([] as [String; 0]));
    }
}
