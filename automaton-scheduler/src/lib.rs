//! ABOUTME: Scheduler and Trigger Router: the only path by which an artifact ever runs
//! ABOUTME: Manual, scheduled and webhook invocations all funnel through the same chokepoint

pub mod scheduler;
pub mod trigger_router;

pub use scheduler::Scheduler;
pub use trigger_router::{DispatchOutcome, TriggerRouter, TriggerSource};

#[cfg(test)]
mod tests {
    use super::*;
    use automaton_core::types::Trigger;
    use automaton_executor::{NullAdapters, SandboxLimits};
    use automaton_providers::{EchoProvider, ModelChain};
    use automaton_security::{ArtifactProgram, Expr, HostCall, Stmt};
    use automaton_state::{MemoryBackend, StateSubstrate, StorageBackend};
    use automaton_synthesizer::Synthesizer;
    use std::sync::Arc;
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
            statements: vec![Stmt::Expr(Expr::HostCall {
                call: HostCall::Notify,
                args: vec![Expr::Literal(serde_json::json!("hi"))],
            })],
        }
        .to_text()
    }

    async fn router() -> (Arc<TriggerRouter>, Arc<StateSubstrate>, AgentId) {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let state = Arc::new(StateSubstrate::new(backend, Duration::from_secs(1800)));
        let agent = state
            .artifacts
            .create(1, "n".into(), "".into(), notify_artifact(), Trigger::Manual)
            .await
            .unwrap();
        state.artifacts.update_metadata(1, agent.id, None, None, None, Some(true)).await.unwrap();

        let provider: Arc<dyn automaton_providers::ModelProvider> = Arc::new(EchoProvider::new("m", notify_artifact()));
        let chain = ModelChain::new(vec![(provider, Duration::from_secs(1))]);
        let synthesizer = Arc::new(Synthesizer::new(chain, &automaton_config::AgentConfig::default()));

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
        (router, state, agent.id)
    }

    use automaton_core::types::AgentId;

    #[tokio::test]
    async fn manual_dispatch_runs_and_records_history() {
        let (router, state, agent_id) = router().await;
        let outcome = router
            .dispatch(1, agent_id, automaton_core::types::TriggerKind::Manual, TriggerSource::Manual)
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Ran { .. }));
        let rows = state.history.by_agent(agent_id, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, automaton_core::types::ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn concurrent_manual_dispatch_returns_busy() {
        let (router, _state, agent_id) = router().await;
        let lock = router.lock_for(agent_id);
        let _guard = lock.try_lock().unwrap();
        let outcome = router
            .dispatch(1, agent_id, automaton_core::types::TriggerKind::Manual, TriggerSource::Manual)
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Busy { retry_hint: false }));
    }

    #[tokio::test]
    async fn scheduler_restore_is_idempotent() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let state = Arc::new(StateSubstrate::new(backend, Duration::from_secs(1800)));
        let agent = state
            .artifacts
            .create(1, "n".into(), "".into(), notify_artifact(), Trigger::Scheduled { period_secs: 3600 })
            .await
            .unwrap();
        state.artifacts.update_metadata(1, agent.id, None, None, None, Some(true)).await.unwrap();

        let provider: Arc<dyn automaton_providers::ModelProvider> = Arc::new(EchoProvider::new("m", notify_artifact()));
        let chain = ModelChain::new(vec![(provider, Duration::from_secs(1))]);
        let synthesizer = Arc::new(Synthesizer::new(chain, &automaton_config::AgentConfig::default()));
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
        let scheduler = Scheduler::new(router, false);
        scheduler.restore(&state.artifacts).await.unwrap();
        assert!(scheduler.is_registered(agent.id));
        scheduler.restore(&state.artifacts).await.unwrap();
        assert!(scheduler.is_registered(agent.id));
        scheduler.unregister(agent.id);
        assert!(!scheduler.is_registered(agent.id));
    }
}
