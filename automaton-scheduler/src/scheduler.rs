//! ABOUTME: Persistent, crash-surviving scheduler: one timer task per active scheduled agent
//! ABOUTME: Registered -> Waiting -> Firing -> Waiting -> ... -> Unregistered, restored at startup

use crate::trigger_router::{TriggerRouter, TriggerSource};
use automaton_core::types::{AgentId, OwnerId, Trigger, TriggerKind};
use automaton_state::ArtifactStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Fires a registered agent's scheduled trigger forever until unregistered.
/// Deadline arithmetic is `previous_deadline + period` unless the run
/// overran by more than one full period, in which case the next deadline
/// resets to `now + period` rather than scheduling a burst of catch-up
/// fires.
pub struct Scheduler {
    router: Arc<TriggerRouter>,
    handles: DashMap<AgentId, JoinHandle<()>>,
    immediate_fire: bool,
}

impl Scheduler {
    #[must_use]
    pub fn new(router: Arc<TriggerRouter>, immediate_fire: bool) -> Self {
        Self { router, handles: DashMap::new(), immediate_fire }
    }

    /// Scans the Artifact Store for every `active ∧ scheduled` agent and
    /// re-registers each. Idempotent: any already-running timer for an id
    /// found here is stopped and replaced, so a second restore never leaks
    /// timers.
    pub async fn restore(&self, artifacts: &ArtifactStore) -> automaton_state::StateResult<usize> {
        let agents = artifacts.list_active_scheduled().await?;
        let mut restored = 0;
        for agent in agents {
            if let Trigger::Scheduled { period_secs } = agent.trigger {
                self.register(agent.owner_id, agent.id, period_secs);
                restored += 1;
            }
        }
        info!(restored, "scheduler restored active scheduled agents");
        Ok(restored)
    }

    /// Registers (or re-registers) a timer for `agent_id`. Re-registration
    /// aborts any prior task for the same id before spawning the new one,
    /// so updating the period never leaves a stale timer running alongside
    /// the new one.
    pub fn register(&self, owner_id: OwnerId, agent_id: AgentId, period_secs: u64) {
        self.unregister(agent_id);

        let router = Arc::clone(&self.router);
        let period = Duration::from_secs(period_secs.max(1));
        let immediate_fire = self.immediate_fire;

        let handle = tokio::spawn(async move {
            let mut deadline = if immediate_fire { Instant::now() } else { Instant::now() + period };
            loop {
                tokio::time::sleep_until(deadline).await;

                match router.dispatch(owner_id, agent_id, TriggerKind::Scheduled, TriggerSource::Scheduled).await {
                    Ok(_) => {}
                    Err(e) => warn!(agent_id, error = %e, "scheduled dispatch failed"),
                }

                let now = Instant::now();
                let overrun = now.saturating_duration_since(deadline);
                deadline = if overrun > period { now + period } else { deadline + period };
            }
        });

        self.handles.insert(agent_id, handle);
    }

    /// `* -> Unregistered`: any in-flight run is left to complete (we only
    /// stop the timer loop, not the dispatch it's currently awaiting), the
    /// next tick simply never fires.
    pub fn unregister(&self, agent_id: AgentId) {
        if let Some((_, handle)) = self.handles.remove(&agent_id) {
            handle.abort();
        }
    }

    #[must_use]
    pub fn is_registered(&self, agent_id: AgentId) -> bool {
        self.handles.contains_key(&agent_id)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in self.handles.iter() {
            entry.value().abort();
        }
    }
}
