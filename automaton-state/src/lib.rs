//! ABOUTME: Artifact store and the state/log/history substrate
//! ABOUTME: Every mutation routes through these APIs — never raw storage access from outside

pub mod artifact_store;
pub mod backend;
pub mod error;
pub mod history;
pub mod kv;
pub mod log;

pub use artifact_store::ArtifactStore;
pub use backend::{MemoryBackend, StorageBackend};
pub use error::{StateError, StateResult};
pub use history::{HistoryStats, HistoryStore};
pub use kv::KvStore;
pub use log::LogStore;

use std::sync::Arc;

/// Bundles the three state services plus the artifact store behind a
/// single handle so callers don't have to wire four `Arc`s by hand.
pub struct StateSubstrate {
    pub artifacts: Arc<ArtifactStore>,
    pub kv: Arc<KvStore>,
    pub logs: Arc<LogStore>,
    pub history: Arc<HistoryStore>,
}

impl StateSubstrate {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, stale_threshold: std::time::Duration) -> Self {
        let artifacts = Arc::new(ArtifactStore::new(Arc::clone(&backend)));
        let kv = Arc::new(KvStore::new(Arc::clone(&backend), Arc::clone(&artifacts)));
        let logs = Arc::new(LogStore::new(Arc::clone(&backend)));
        let history = Arc::new(HistoryStore::new(backend, stale_threshold));
        Self { artifacts, kv, logs, history }
    }

    /// Deletes an agent and cascades to every derived record, as the data
    /// model requires.
    pub async fn delete_agent_cascade(&self, owner_id: automaton_core::types::OwnerId, agent_id: automaton_core::types::AgentId) -> StateResult<()> {
        self.artifacts.delete(owner_id, agent_id).await?;
        self.kv.delete_agent(agent_id).await?;
        Ok(())
    }
}
