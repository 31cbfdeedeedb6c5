//! ABOUTME: In-memory hot cache over the durable Pending Multi-Turn State
//! ABOUTME: Session Memory is the source of truth; this cache just avoids a round-trip on the common path

use crate::session::SessionStore;
use automaton_core::types::{OwnerId, PendingFlowKind, PendingFlowState};
use automaton_state::error::StateResult;
use dashmap::DashMap;
use std::sync::Arc;

/// Deterministic per-user slot: a new utterance from the same user always
/// resolves to at most one pending flow, set or cleared atomically with
/// the durable copy.
pub struct PendingFlows {
    sessions: Arc<SessionStore>,
    cache: DashMap<OwnerId, PendingFlowState>,
}

impl PendingFlows {
    #[must_use]
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions, cache: DashMap::new() }
    }

    /// Cache hit avoids the durable read; on a miss (e.g. after a restart)
    /// falls back to `SessionStore` and repopulates the cache.
    pub async fn get(&self, user_id: OwnerId) -> StateResult<Option<PendingFlowState>> {
        if let Some(state) = self.cache.get(&user_id) {
            return Ok(Some(state.clone()));
        }
        let durable = self.sessions.get_waiting_for_input(user_id).await?;
        if let Some(state) = &durable {
            self.cache.insert(user_id, state.clone());
        }
        Ok(durable)
    }

    pub async fn set(&self, user_id: OwnerId, kind: PendingFlowKind, payload: serde_json::Value) -> StateResult<()> {
        self.sessions.set_waiting_for_input(user_id, kind, payload.clone()).await?;
        self.cache.insert(
            user_id,
            PendingFlowState { user_id, kind, payload, created_at: chrono::Utc::now() },
        );
        Ok(())
    }

    pub async fn clear(&self, user_id: OwnerId) -> StateResult<()> {
        self.sessions.clear_waiting_for_input(user_id).await?;
        self.cache.remove(&user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automaton_state::backend::MemoryBackend;

    fn flows() -> PendingFlows {
        PendingFlows::new(Arc::new(SessionStore::new(Arc::new(MemoryBackend::new()))))
    }

    #[tokio::test]
    async fn set_then_get_hits_the_cache() {
        let flows = flows();
        flows.set(1, PendingFlowKind::AwaitingSchedule, serde_json::json!({})).await.unwrap();
        let state = flows.get(1).await.unwrap().unwrap();
        assert_eq!(state.kind, PendingFlowKind::AwaitingSchedule);
    }

    #[tokio::test]
    async fn miss_falls_back_to_durable_store_and_rehydrates() {
        let sessions = Arc::new(SessionStore::new(Arc::new(MemoryBackend::new())));
        sessions
            .set_waiting_for_input(1, PendingFlowKind::AwaitingName, serde_json::json!({}))
            .await
            .unwrap();
        let flows = PendingFlows::new(Arc::clone(&sessions));
        let state = flows.get(1).await.unwrap().unwrap();
        assert_eq!(state.kind, PendingFlowKind::AwaitingName);
    }

    #[tokio::test]
    async fn clear_removes_from_both_layers() {
        let flows = flows();
        flows.set(1, PendingFlowKind::AwaitingName, serde_json::json!({})).await.unwrap();
        flows.clear(1).await.unwrap();
        assert!(flows.get(1).await.unwrap().is_none());
    }
}
