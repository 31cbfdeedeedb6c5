//! ABOUTME: Single chokepoint for every invocation: manual, scheduled, and webhook
//! ABOUTME: Owns the per-agent lock, the execution history lifecycle, and the last-error map

use automaton_core::error::{message_is_repairable, AgentError, Result};
use automaton_core::traits::Transport;
use automaton_core::types::{AgentId, ExecutionId, ExecutionOutcome, ExecutionStatus, OwnerId, TriggerKind};
use automaton_executor::{AgentHostCallSurface, ChainDataAdapter, PluginRegistry, SandboxLimits, SandboxedExecutor, SecretsProvider};
use automaton_security::ArtifactProgram;
use automaton_state::StateSubstrate;
use automaton_synthesizer::{RepairRequest, Synthesizer};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, instrument, warn};

/// Which caller is asking for a run — determines the semantics when the
/// per-agent lock is already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Manual,
    Scheduled,
    Webhook,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Ran { execution_id: ExecutionId, outcome: ExecutionOutcome },
    /// Lock held. `retry_hint` is set for webhook deliveries so the caller
    /// can tell an upstream sender to retry; a manual run has no such hint.
    Busy { retry_hint: bool },
    /// A scheduled tick found the lock held and was silently dropped — no
    /// backlog accumulates, per the Scheduler's `Waiting -> Firing` rule.
    Dropped,
}

/// Binds the shared collaborators every invocation needs regardless of
/// trigger source: state substrate, transport/adapters for the host-call
/// surface, sandbox limits, and the synthesizer for auto-repair.
pub struct TriggerRouter {
    state: Arc<StateSubstrate>,
    transport: Arc<dyn Transport>,
    chain: Arc<dyn ChainDataAdapter>,
    secrets: Arc<dyn SecretsProvider>,
    plugins: Arc<dyn PluginRegistry>,
    synthesizer: Arc<Synthesizer>,
    limits: SandboxLimits,
    repair_budget: u32,
    locks: DashMap<AgentId, Arc<Mutex<()>>>,
    last_errors: DashMap<AgentId, String>,
    concurrency: Arc<Semaphore>,
}

impl TriggerRouter {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<StateSubstrate>,
        transport: Arc<dyn Transport>,
        chain: Arc<dyn ChainDataAdapter>,
        secrets: Arc<dyn SecretsProvider>,
        plugins: Arc<dyn PluginRegistry>,
        synthesizer: Arc<Synthesizer>,
        limits: SandboxLimits,
        repair_budget: u32,
        max_concurrent_executions: usize,
    ) -> Self {
        Self {
            state,
            transport,
            chain,
            secrets,
            plugins,
            synthesizer,
            limits,
            repair_budget,
            locks: DashMap::new(),
            last_errors: DashMap::new(),
            concurrency: Arc::new(Semaphore::new(max_concurrent_executions.max(1))),
        }
    }

    #[must_use]
    pub fn last_error(&self, agent_id: AgentId) -> Option<String> {
        self.last_errors.get(&agent_id).map(|e| e.clone())
    }

    pub(crate) fn lock_for(&self, agent_id: AgentId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(agent_id).or_insert_with(|| Arc::new(Mutex::new(()))).value())
    }

    #[instrument(skip(self))]
    pub async fn dispatch(
        &self,
        owner_id: OwnerId,
        agent_id: AgentId,
        trigger_kind: TriggerKind,
        source: TriggerSource,
    ) -> Result<DispatchOutcome> {
        let lock = self.lock_for(agent_id);
        let guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                return Ok(match source {
                    TriggerSource::Scheduled => {
                        info!(agent_id, "scheduled tick dropped, agent busy");
                        DispatchOutcome::Dropped
                    }
                    TriggerSource::Manual => DispatchOutcome::Busy { retry_hint: false },
                    TriggerSource::Webhook => DispatchOutcome::Busy { retry_hint: true },
                });
            }
        };

        let _permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|_| AgentError::fatal("concurrency semaphore closed"))?;

        let outcome = self.run_locked(owner_id, agent_id, trigger_kind).await?;
        drop(guard);
        Ok(outcome)
    }

    async fn run_locked(&self, owner_id: OwnerId, agent_id: AgentId, trigger_kind: TriggerKind) -> Result<DispatchOutcome> {
        let agent = self
            .state
            .artifacts
            .get_unchecked(agent_id)
            .await
            .map_err(|e| AgentError::fatal(e.to_string()))?;

        let execution_id = self
            .state
            .history
            .start(agent_id, owner_id, trigger_kind)
            .await
            .map_err(|e| AgentError::fatal(e.to_string()))?;

        let program = match ArtifactProgram::from_text(&agent.artifact) {
            Ok(p) => p,
            Err(e) => {
                let message = format!("sandbox runtime error: corrupt artifact: {e}");
                self.finish_failed(execution_id, &message).await?;
                self.last_errors.insert(agent_id, message.clone());
                return Ok(DispatchOutcome::Ran {
                    execution_id,
                    outcome: ExecutionOutcome { success: false, value: None, error: Some(message), logs: vec![], duration_ms: 0 },
                });
            }
        };

        let surface = AgentHostCallSurface::new(
            agent_id,
            owner_id,
            Arc::clone(&self.state),
            Arc::clone(&self.transport),
            Arc::clone(&self.chain),
            Arc::clone(&self.secrets),
            Arc::clone(&self.plugins),
        );

        let outcome = SandboxedExecutor::run(&surface, &program, self.limits).await;

        for line in &outcome.logs {
            let _ = self.state.logs.append(agent_id, owner_id, line.level, &line.message, None).await;
        }

        if outcome.success {
            self.state
                .history
                .finish(execution_id, ExecutionStatus::Success, outcome.duration_ms, None, summarize(&outcome))
                .await
                .map_err(|e| AgentError::fatal(e.to_string()))?;
            self.last_errors.remove(&agent_id);
        } else {
            let message = outcome.error.clone().unwrap_or_else(|| "unknown sandbox failure".to_string());
            self.finish_failed(execution_id, &message).await?;
            self.last_errors.insert(agent_id, message.clone());
            self.maybe_auto_repair(owner_id, agent_id, &agent.artifact, &message).await;
        }

        Ok(DispatchOutcome::Ran { execution_id, outcome })
    }

    async fn finish_failed(&self, execution_id: ExecutionId, message: &str) -> Result<()> {
        self.state
            .history
            .finish(execution_id, ExecutionStatus::Error, 0, Some(message.to_string()), None)
            .await
            .map_err(|e| AgentError::fatal(e.to_string()))
    }

    /// Synchronously invokes the Synthesizer's repair mode when the repair
    /// budget is configured and the failure belongs to a repairable class,
    /// staging the patch (never applying it) per the preview-and-apply
    /// contract.
    async fn maybe_auto_repair(&self, owner_id: OwnerId, agent_id: AgentId, existing_artifact: &str, last_error: &str) {
        if self.repair_budget == 0 || !message_is_repairable(last_error) {
            return;
        }
        let request = RepairRequest {
            existing_artifact: existing_artifact.to_string(),
            last_error: last_error.to_string(),
            modification_request: "fix the runtime error while preserving the artifact's intent".to_string(),
        };
        match self.synthesizer.repair(&request).await {
            Ok(result) => {
                self.synthesizer.pending_repairs.stage(owner_id, agent_id, result);
                info!(agent_id, "auto-repair patch staged for approval");
            }
            Err(e) => {
                warn!(agent_id, error = %e, "auto-repair attempt failed");
            }
        }
    }
}

fn summarize(outcome: &ExecutionOutcome) -> Option<String> {
    outcome.value.as_ref().map(|v| v.to_string())
}
