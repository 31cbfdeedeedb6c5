//! ABOUTME: Durable per-user transcript and waiting-for-input parking
//! ABOUTME: Source of truth for multi-turn flows; the in-memory pending cache is a hot copy of this

use automaton_core::types::{PendingFlowKind, PendingFlowState, SessionMessage, SessionRole};
use automaton_state::backend::StorageBackend;
use automaton_state::error::{StateError, StateResult};
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::instrument;

fn message_key(user_id: i64, seq: i64) -> String {
    format!("session_msg:{user_id}:{seq}")
}

fn index_key(user_id: i64) -> String {
    format!("session_index:{user_id}")
}

fn waiting_key(user_id: i64) -> String {
    format!("session_waiting:{user_id}")
}

/// `append`/`recent`/`clear` for the transcript, plus
/// `set_waiting_for_input`/`get_waiting_for_input` for parking a multi-turn
/// flow across process restarts. Everything here is keyed by `user_id`
/// (the chat-facing identity, equal to `OwnerId` in this runtime).
pub struct SessionStore {
    backend: Arc<dyn StorageBackend>,
    next_seq: AtomicI64,
}

impl SessionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend, next_seq: AtomicI64::new(1) }
    }

    async fn index(&self, user_id: i64) -> StateResult<Vec<i64>> {
        match self.backend.get(&index_key(user_id)).await.map_err(StateError::Backend)? {
            Some(b) => serde_json::from_slice(&b).map_err(|e| StateError::Backend(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn save_index(&self, user_id: i64, seqs: &[i64]) -> StateResult<()> {
        let bytes = serde_json::to_vec(seqs).map_err(|e| StateError::Backend(e.to_string()))?;
        self.backend.set(&index_key(user_id), bytes).await.map_err(StateError::Backend)
    }

    #[instrument(skip(self, metadata))]
    pub async fn append(
        &self,
        user_id: i64,
        session_id: &str,
        role: SessionRole,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> StateResult<()> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let message = SessionMessage {
            user_id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&message).map_err(|e| StateError::Backend(e.to_string()))?;
        self.backend.set(&message_key(user_id, seq), bytes).await.map_err(StateError::Backend)?;

        let mut seqs = self.index(user_id).await?;
        seqs.push(seq);
        self.save_index(user_id, &seqs).await
    }

    /// Newest-first, up to `limit` lines.
    pub async fn recent(&self, user_id: i64, limit: usize) -> StateResult<Vec<SessionMessage>> {
        let mut seqs = self.index(user_id).await?;
        seqs.reverse();
        let mut out = Vec::new();
        for seq in seqs.into_iter().take(limit) {
            if let Some(bytes) = self.backend.get(&message_key(user_id, seq)).await.map_err(StateError::Backend)? {
                out.push(serde_json::from_slice(&bytes).map_err(|e| StateError::Backend(e.to_string()))?);
            }
        }
        Ok(out)
    }

    pub async fn clear(&self, user_id: i64) -> StateResult<()> {
        let seqs = self.index(user_id).await?;
        for seq in seqs {
            self.backend.delete(&message_key(user_id, seq)).await.map_err(StateError::Backend)?;
        }
        self.backend.delete(&index_key(user_id)).await.map_err(StateError::Backend)
    }

    pub async fn set_waiting_for_input(
        &self,
        user_id: i64,
        kind: PendingFlowKind,
        payload: serde_json::Value,
    ) -> StateResult<()> {
        let state = PendingFlowState { user_id, kind, payload, created_at: Utc::now() };
        let bytes = serde_json::to_vec(&state).map_err(|e| StateError::Backend(e.to_string()))?;
        self.backend.set(&waiting_key(user_id), bytes).await.map_err(StateError::Backend)
    }

    pub async fn get_waiting_for_input(&self, user_id: i64) -> StateResult<Option<PendingFlowState>> {
        match self.backend.get(&waiting_key(user_id)).await.map_err(StateError::Backend)? {
            Some(b) => Ok(Some(serde_json::from_slice(&b).map_err(|e| StateError::Backend(e.to_string()))?)),
            None => Ok(None),
        }
    }

    pub async fn clear_waiting_for_input(&self, user_id: i64) -> StateResult<()> {
        self.backend.delete(&waiting_key(user_id)).await.map_err(StateError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automaton_state::backend::MemoryBackend;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let store = store();
        store.append(1, "s", SessionRole::User, "first", None).await.unwrap();
        store.append(1, "s", SessionRole::Assistant, "second", None).await.unwrap();
        let recent = store.recent(1, 10).await.unwrap();
        assert_eq!(recent[0].content, "second");
        assert_eq!(recent[1].content, "first");
    }

    #[tokio::test]
    async fn clear_empties_the_transcript() {
        let store = store();
        store.append(1, "s", SessionRole::User, "hi", None).await.unwrap();
        store.clear(1).await.unwrap();
        assert!(store.recent(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn waiting_for_input_round_trips_and_clears() {
        let store = store();
        store
            .set_waiting_for_input(1, PendingFlowKind::AwaitingName, serde_json::json!({"task": "x"}))
            .await
            .unwrap();
        let waiting = store.get_waiting_for_input(1).await.unwrap().unwrap();
        assert_eq!(waiting.kind, PendingFlowKind::AwaitingName);
        store.clear_waiting_for_input(1).await.unwrap();
        assert!(store.get_waiting_for_input(1).await.unwrap().is_none());
    }
}
