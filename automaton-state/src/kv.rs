//! ABOUTME: Per-agent key/value store with a write-through cache
//! ABOUTME: The cache is never stale after a set() call returns, by construction

use crate::artifact_store::ArtifactStore;
use crate::backend::StorageBackend;
use crate::error::{StateError, StateResult};
use automaton_core::types::{AgentId, OwnerId};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

fn state_key(agent_id: AgentId, key: &str) -> String {
    format!("state:{agent_id}:{key}")
}

fn prefix(agent_id: AgentId) -> String {
    format!("state:{agent_id}:")
}

/// `get(agent_id, key)`, `set(agent_id, owner_id, key, value)`, `get_all`,
/// `delete_agent`. Reads check the cache first; `set` writes the backend
/// and only then updates the cache, so a reader racing a writer either
/// sees the old durable value or the new one — never a value the backend
/// doesn't yet have.
pub struct KvStore {
    backend: Arc<dyn StorageBackend>,
    artifacts: Arc<ArtifactStore>,
    cache: DashMap<(AgentId, String), Value>,
}

impl KvStore {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, artifacts: Arc<ArtifactStore>) -> Self {
        Self { backend, artifacts, cache: DashMap::new() }
    }

    pub async fn get(&self, agent_id: AgentId, key: &str) -> StateResult<Option<Value>> {
        if let Some(v) = self.cache.get(&(agent_id, key.to_string())) {
            return Ok(Some(v.clone()));
        }
        let bytes = self
            .backend
            .get(&state_key(agent_id, key))
            .await
            .map_err(StateError::Backend)?;
        match bytes {
            Some(b) => {
                let value: Value = serde_json::from_slice(&b).map_err(|e| StateError::Backend(e.to_string()))?;
                self.cache.insert((agent_id, key.to_string()), value.clone());
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, value))]
    pub async fn set(&self, agent_id: AgentId, owner_id: OwnerId, key: &str, value: Value) -> StateResult<()> {
        let agent = self.artifacts.get_unchecked(agent_id).await?;
        if agent.owner_id != owner_id {
            return Err(StateError::NotFoundOrForbidden);
        }
        let bytes = serde_json::to_vec(&value).map_err(|e| StateError::Backend(e.to_string()))?;
        self.backend
            .set(&state_key(agent_id, key), bytes)
            .await
            .map_err(StateError::Backend)?;
        self.cache.insert((agent_id, key.to_string()), value);
        Ok(())
    }

    pub async fn get_all(&self, agent_id: AgentId) -> StateResult<Vec<(String, Value)>> {
        let rows = self
            .backend
            .scan_prefix(&prefix(agent_id))
            .await
            .map_err(StateError::Backend)?;
        let pfx = prefix(agent_id);
        let mut out = Vec::new();
        for (k, bytes) in rows {
            let key = k.strip_prefix(&pfx).unwrap_or(&k).to_string();
            let value: Value = serde_json::from_slice(&bytes).map_err(|e| StateError::Backend(e.to_string()))?;
            out.push((key, value));
        }
        Ok(out)
    }

    pub async fn delete_agent(&self, agent_id: AgentId) -> StateResult<()> {
        let rows = self
            .backend
            .scan_prefix(&prefix(agent_id))
            .await
            .map_err(StateError::Backend)?;
        for (k, _) in rows {
            self.backend.delete(&k).await.map_err(StateError::Backend)?;
        }
        self.cache.retain(|(a, _), _| *a != agent_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use automaton_core::types::Trigger;

    async fn fixture() -> (Arc<ArtifactStore>, KvStore, AgentId) {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let artifacts = Arc::new(ArtifactStore::new(Arc::clone(&backend)));
        let agent = artifacts.create(1, "n".into(), "".into(), String::new(), Trigger::Manual).await.unwrap();
        let kv = KvStore::new(Arc::clone(&backend), Arc::clone(&artifacts));
        (artifacts, kv, agent.id)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (_a, kv, id) = fixture().await;
        kv.set(id, 1, "k", serde_json::json!("v")).await.unwrap();
        assert_eq!(kv.get(id, "k").await.unwrap(), Some(serde_json::json!("v")));
    }

    #[tokio::test]
    async fn non_owner_cannot_set() {
        let (_a, kv, id) = fixture().await;
        assert!(kv.set(id, 2, "k", serde_json::json!("v")).await.is_err());
    }

    #[tokio::test]
    async fn serializability_across_successive_invocations() {
        let (_a, kv, id) = fixture().await;
        kv.set(id, 1, "counter", serde_json::json!(1)).await.unwrap();
        kv.set(id, 1, "counter", serde_json::json!(2)).await.unwrap();
        assert_eq!(kv.get(id, "counter").await.unwrap(), Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn delete_agent_clears_all_keys() {
        let (_a, kv, id) = fixture().await;
        kv.set(id, 1, "k1", serde_json::json!(1)).await.unwrap();
        kv.set(id, 1, "k2", serde_json::json!(2)).await.unwrap();
        kv.delete_agent(id).await.unwrap();
        assert!(kv.get_all(id).await.unwrap().is_empty());
        assert_eq!(kv.get(id, "k1").await.unwrap(), None);
    }
}
