//! ABOUTME: Durable record of each agent: owner, artifact, trigger, activation flag
//! ABOUTME: Every mutation runs the safety gate before the code field is written

use crate::backend::StorageBackend;
use crate::error::{StateError, StateResult};
use automaton_core::types::{Agent, AgentId, OwnerId, Trigger};
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const AGENT_KEY_PREFIX: &str = "agent:";
const OWNER_INDEX_PREFIX: &str = "owner_index:";

fn agent_key(id: AgentId) -> String {
    format!("{AGENT_KEY_PREFIX}{id}")
}

fn owner_index_key(owner_id: OwnerId) -> String {
    format!("{OWNER_INDEX_PREFIX}{owner_id}")
}

/// Durable record store for agents. Every read that crosses a user
/// boundary takes an owner id and fails with `NotFoundOrForbidden` if the
/// row's owner differs — by design the two failures are indistinguishable
/// to callers.
pub struct ArtifactStore {
    backend: Arc<dyn StorageBackend>,
    next_id: AtomicI64,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend, next_id: AtomicI64::new(1) }
    }

    async fn load_agent(&self, id: AgentId) -> StateResult<Option<Agent>> {
        let bytes = self
            .backend
            .get(&agent_key(id))
            .await
            .map_err(StateError::Backend)?;
        match bytes {
            Some(b) => {
                let agent: Agent =
                    serde_json::from_slice(&b).map_err(|e| StateError::Backend(e.to_string()))?;
                Ok(Some(agent))
            }
            None => Ok(None),
        }
    }

    async fn save_agent(&self, agent: &Agent) -> StateResult<()> {
        let bytes = serde_json::to_vec(agent).map_err(|e| StateError::Backend(e.to_string()))?;
        self.backend
            .set(&agent_key(agent.id), bytes)
            .await
            .map_err(StateError::Backend)
    }

    async fn owner_index(&self, owner_id: OwnerId) -> StateResult<Vec<AgentId>> {
        let bytes = self
            .backend
            .get(&owner_index_key(owner_id))
            .await
            .map_err(StateError::Backend)?;
        match bytes {
            Some(b) => serde_json::from_slice(&b).map_err(|e| StateError::Backend(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn save_owner_index(&self, owner_id: OwnerId, ids: &[AgentId]) -> StateResult<()> {
        let bytes = serde_json::to_vec(ids).map_err(|e| StateError::Backend(e.to_string()))?;
        self.backend
            .set(&owner_index_key(owner_id), bytes)
            .await
            .map_err(StateError::Backend)
    }

    #[instrument(skip(self, artifact))]
    pub async fn create(
        &self,
        owner_id: OwnerId,
        name: String,
        description: String,
        artifact: String,
        trigger: Trigger,
    ) -> StateResult<Agent> {
        trigger
            .validate()
            .map_err(StateError::InvalidTrigger)?;

        if !artifact.trim().is_empty() {
            automaton_security::check(&artifact)
                .map_err(|e| StateError::SafetyGate { reason: e.reason })?;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let agent = Agent {
            id,
            owner_id,
            name,
            description,
            artifact,
            trigger,
            active: false,
            created_at: now,
            updated_at: now,
        };
        self.save_agent(&agent).await?;

        let mut ids = self.owner_index(owner_id).await?;
        ids.push(id);
        self.save_owner_index(owner_id, &ids).await?;

        info!(agent_id = id, owner_id, "agent created");
        Ok(agent)
    }

    pub async fn get(&self, owner_id: OwnerId, id: AgentId) -> StateResult<Agent> {
        let agent = self.load_agent(id).await?.ok_or(StateError::NotFoundOrForbidden)?;
        if agent.owner_id != owner_id {
            return Err(StateError::NotFoundOrForbidden);
        }
        Ok(agent)
    }

    /// Internal variant used by components that already own the agent
    /// context (the scheduler, the executor) and don't need an extra
    /// ownership round-trip.
    pub async fn get_unchecked(&self, id: AgentId) -> StateResult<Agent> {
        self.load_agent(id).await?.ok_or(StateError::NotFoundOrForbidden)
    }

    /// Ordered by id descending, per the Artifact Store contract.
    pub async fn list_by_owner(&self, owner_id: OwnerId) -> StateResult<Vec<Agent>> {
        let ids = self.owner_index(owner_id).await?;
        let mut agents = Vec::new();
        for id in ids {
            if let Some(agent) = self.load_agent(id).await? {
                agents.push(agent);
            }
        }
        agents.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(agents)
    }

    /// All active, scheduled agents across every owner — used by the
    /// Scheduler to restore timers at startup.
    pub async fn list_active_scheduled(&self) -> StateResult<Vec<Agent>> {
        let rows = self
            .backend
            .scan_prefix(AGENT_KEY_PREFIX)
            .await
            .map_err(StateError::Backend)?;
        let mut out = Vec::new();
        for (_, bytes) in rows {
            let agent: Agent =
                serde_json::from_slice(&bytes).map_err(|e| StateError::Backend(e.to_string()))?;
            if agent.active && matches!(agent.trigger, Trigger::Scheduled { .. }) {
                out.push(agent);
            }
        }
        Ok(out)
    }

    pub async fn update_metadata(
        &self,
        owner_id: OwnerId,
        id: AgentId,
        name: Option<String>,
        description: Option<String>,
        trigger: Option<Trigger>,
        active: Option<bool>,
    ) -> StateResult<Agent> {
        let mut agent = self.get(owner_id, id).await?;

        if let Some(t) = trigger {
            t.validate().map_err(StateError::InvalidTrigger)?;
            agent.trigger = t;
        }
        if let Some(n) = name {
            agent.name = n;
        }
        if let Some(d) = description {
            agent.description = d;
        }
        if let Some(a) = active {
            if a && agent.artifact.trim().is_empty() {
                return Err(StateError::SafetyGate {
                    reason: "cannot activate an agent with no artifact".to_string(),
                });
            }
            agent.active = a;
        }
        agent.updated_at = Utc::now();
        self.save_agent(&agent).await?;
        Ok(agent)
    }

    /// Refuses if the Safety Gate rejects the new code.
    #[instrument(skip(self, code))]
    pub async fn update_code(&self, owner_id: OwnerId, id: AgentId, code: String) -> StateResult<Agent> {
        let mut agent = self.get(owner_id, id).await?;
        automaton_security::check(&code).map_err(|e| {
            warn!(agent_id = id, reason = %e.reason, "safety gate rejected code update");
            StateError::SafetyGate { reason: e.reason }
        })?;
        agent.artifact = code;
        agent.updated_at = Utc::now();
        self.save_agent(&agent).await?;
        Ok(agent)
    }

    /// Deletion cascades to State/Log/History in the caller (those crates
    /// key entirely by `agent_id`; this store has no foreign-key
    /// constraint enforcing it, so the orchestrator's delete path is
    /// responsible for calling all three).
    pub async fn delete(&self, owner_id: OwnerId, id: AgentId) -> StateResult<()> {
        let agent = self.get(owner_id, id).await?;
        self.backend
            .delete(&agent_key(id))
            .await
            .map_err(StateError::Backend)?;
        let mut ids = self.owner_index(owner_id).await?;
        ids.retain(|&x| x != id);
        self.save_owner_index(owner_id, &ids).await?;
        let _ = agent;
        Ok(())
    }

    /// Marketplace copy semantics: the artifact text and trigger
    /// parameters are copied into a fresh agent row owned by the buyer; no
    /// row or state is shared with the seller.
    pub async fn copy_for_buyer(
        &self,
        seller_owner_id: OwnerId,
        seller_agent_id: AgentId,
        buyer_owner_id: OwnerId,
    ) -> StateResult<Agent> {
        let source = self.get(seller_owner_id, seller_agent_id).await?;
        self.create(
            buyer_owner_id,
            source.name.clone(),
            source.description.clone(),
            source.artifact.clone(),
            source.trigger.clone(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn store() -> ArtifactStore {
        ArtifactStore::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn create_then_get_round_trips_code_byte_exact() {
        let store = store();
        let agent = store
            .create(1, "n".into(), "d".into(), String::new(), Trigger::Manual)
            .await
            .unwrap();
        let fetched = store.get(1, agent.id).await.unwrap();
        assert_eq!(fetched.artifact, agent.artifact);
        assert_eq!(fetched.name, "n");
    }

    #[tokio::test]
    async fn cross_owner_get_is_not_found() {
        let store = store();
        let agent = store
            .create(1, "n".into(), "d".into(), String::new(), Trigger::Manual)
            .await
            .unwrap();
        let err = store.get(2, agent.id).await.unwrap_err();
        assert!(matches!(err, StateError::NotFoundOrForbidden));
    }

    #[tokio::test]
    async fn nonexistent_id_is_same_error_as_wrong_owner() {
        let store = store();
        let err = store.get(1, 9999).await.unwrap_err();
        assert!(matches!(err, StateError::NotFoundOrForbidden));
    }

    #[tokio::test]
    async fn scheduled_trigger_requires_positive_period() {
        let store = store();
        let err = store
            .create(1, "n".into(), "d".into(), String::new(), Trigger::Scheduled { period_secs: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTrigger(_)));
    }

    #[tokio::test]
    async fn list_by_owner_orders_newest_first() {
        let store = store();
        let a = store.create(1, "a".into(), "".into(), String::new(), Trigger::Manual).await.unwrap();
        let b = store.create(1, "b".into(), "".into(), String::new(), Trigger::Manual).await.unwrap();
        let listed = store.list_by_owner(1).await.unwrap();
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
    }

    #[tokio::test]
    async fn update_code_runs_safety_gate() {
        let store = store();
        let agent = store.create(1, "n".into(), "".into(), String::new(), Trigger::Manual).await.unwrap();
        let bad = "std::fs::read_to_string(\"x\")".to_string();
        assert!(store.update_code(1, agent.id, bad).await.is_err());
    }

    #[tokio::test]
    async fn marketplace_copy_gets_a_fresh_id_and_owner() {
        let store = store();
        let seller_agent = store.create(1, "n".into(), "".into(), String::new(), Trigger::Manual).await.unwrap();
        let copy = store.copy_for_buyer(1, seller_agent.id, 2).await.unwrap();
        assert_ne!(copy.id, seller_agent.id);
        assert_eq!(copy.owner_id, 2);
    }

    #[tokio::test]
    async fn delete_removes_from_owner_listing() {
        let store = store();
        let agent = store.create(1, "n".into(), "".into(), String::new(), Trigger::Manual).await.unwrap();
        store.delete(1, agent.id).await.unwrap();
        assert!(store.list_by_owner(1).await.unwrap().is_empty());
        assert!(store.get(1, agent.id).await.is_err());
    }
}
