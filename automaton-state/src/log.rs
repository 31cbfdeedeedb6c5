//! ABOUTME: Append-only per-agent log with owner and agent indices
//! ABOUTME: Message text is truncated on write; retention is bounded by age

use crate::backend::StorageBackend;
use crate::error::{StateError, StateResult};
use automaton_core::types::{AgentId, AgentLogEntry, LogLevel, OwnerId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::instrument;

/// Upper bound on stored message length; longer messages are truncated on
/// write rather than rejected, matching the "truncated on write" contract.
const MESSAGE_MAX_LEN: usize = 4000;

fn entry_key(agent_id: AgentId, entry_id: i64) -> String {
    format!("log:{agent_id}:{entry_id}")
}

fn agent_index_key(agent_id: AgentId) -> String {
    format!("log_agent_index:{agent_id}")
}

fn owner_index_key(owner_id: OwnerId) -> String {
    format!("log_owner_index:{owner_id}")
}

pub struct LogStore {
    backend: Arc<dyn StorageBackend>,
    next_id: AtomicI64,
}

impl LogStore {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend, next_id: AtomicI64::new(1) }
    }

    async fn index(&self, key: &str) -> StateResult<Vec<i64>> {
        match self.backend.get(key).await.map_err(StateError::Backend)? {
            Some(b) => serde_json::from_slice(&b).map_err(|e| StateError::Backend(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn save_index(&self, key: &str, ids: &[i64]) -> StateResult<()> {
        let bytes = serde_json::to_vec(ids).map_err(|e| StateError::Backend(e.to_string()))?;
        self.backend.set(key, bytes).await.map_err(StateError::Backend)
    }

    #[instrument(skip(self, detail))]
    pub async fn append(
        &self,
        agent_id: AgentId,
        owner_id: OwnerId,
        level: LogLevel,
        message: &str,
        detail: Option<Value>,
    ) -> StateResult<AgentLogEntry> {
        let truncated: String = message.chars().take(MESSAGE_MAX_LEN).collect();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = AgentLogEntry {
            id,
            agent_id,
            owner_id,
            level,
            message: truncated,
            detail,
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&entry).map_err(|e| StateError::Backend(e.to_string()))?;
        self.backend
            .set(&entry_key(agent_id, id), bytes)
            .await
            .map_err(StateError::Backend)?;

        let mut agent_ids = self.index(&agent_index_key(agent_id)).await?;
        agent_ids.push(id);
        self.save_index(&agent_index_key(agent_id), &agent_ids).await?;

        let mut owner_ids = self.index(&owner_index_key(owner_id)).await?;
        owner_ids.push(id);
        self.save_index(&owner_index_key(owner_id), &owner_ids).await?;

        Ok(entry)
    }

    async fn load_many(&self, agent_id: AgentId, ids: &[i64]) -> StateResult<Vec<AgentLogEntry>> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(bytes) = self.backend.get(&entry_key(agent_id, id)).await.map_err(StateError::Backend)? {
                out.push(serde_json::from_slice(&bytes).map_err(|e| StateError::Backend(e.to_string()))?);
            }
        }
        Ok(out)
    }

    /// Newest-first, for one agent.
    pub async fn read_by_agent(&self, agent_id: AgentId, limit: usize, offset: usize) -> StateResult<Vec<AgentLogEntry>> {
        let mut ids = self.index(&agent_index_key(agent_id)).await?;
        ids.reverse();
        let page: Vec<i64> = ids.into_iter().skip(offset).take(limit).collect();
        self.load_many(agent_id, &page).await
    }

    /// Newest-first, across every agent owned by `owner_id`.
    pub async fn read_by_owner(&self, owner_id: OwnerId, limit: usize) -> StateResult<Vec<AgentLogEntry>> {
        let owner_ids = self.index(&owner_index_key(owner_id)).await?;
        let mut entries = Vec::new();
        // The owner index only records entry ids; entries are stored under
        // their own agent_id key, so we need the agent_id alongside each
        // id. We stash it by scanning all agent-index prefixes instead of
        // decoding agent_id out of the flat id — simplest correct path
        // given the backend's key-value shape.
        let rows = self.backend.scan_prefix("log:").await.map_err(StateError::Backend)?;
        for (_, bytes) in rows {
            let entry: AgentLogEntry = serde_json::from_slice(&bytes).map_err(|e| StateError::Backend(e.to_string()))?;
            if owner_ids.contains(&entry.id) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Returns the number of deleted entries.
    pub async fn prune(&self, older_than: DateTime<Utc>) -> StateResult<usize> {
        let rows = self.backend.scan_prefix("log:").await.map_err(StateError::Backend)?;
        let mut deleted = 0;
        for (key, bytes) in rows {
            let entry: AgentLogEntry = serde_json::from_slice(&bytes).map_err(|e| StateError::Backend(e.to_string()))?;
            if entry.created_at < older_than {
                self.backend.delete(&key).await.map_err(StateError::Backend)?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn append_truncates_overlong_messages() {
        let store = LogStore::new(Arc::new(MemoryBackend::new()));
        let long = "x".repeat(MESSAGE_MAX_LEN + 500);
        let entry = store.append(1, 1, LogLevel::Info, &long, None).await.unwrap();
        assert_eq!(entry.message.chars().count(), MESSAGE_MAX_LEN);
    }

    #[tokio::test]
    async fn read_by_agent_is_newest_first() {
        let store = LogStore::new(Arc::new(MemoryBackend::new()));
        store.append(1, 1, LogLevel::Info, "first", None).await.unwrap();
        store.append(1, 1, LogLevel::Info, "second", None).await.unwrap();
        let entries = store.read_by_agent(1, 10, 0).await.unwrap();
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "first");
    }

    #[tokio::test]
    async fn prune_removes_old_entries_and_counts_them() {
        let store = LogStore::new(Arc::new(MemoryBackend::new()));
        store.append(1, 1, LogLevel::Info, "m", None).await.unwrap();
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let deleted = store.prune(cutoff).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.read_by_agent(1, 10, 0).await.unwrap().is_empty());
    }
}
