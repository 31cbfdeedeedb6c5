//! ABOUTME: Execution history: one row per invocation, running -> success|error exactly once
//! ABOUTME: A stale `running` row (>= 30 min) reads as `error`; a background sweep rewrites it too

use crate::backend::StorageBackend;
use crate::error::{StateError, StateResult};
use automaton_core::types::{AgentId, ExecutionHistoryRow, ExecutionId, ExecutionStatus, OwnerId, TriggerKind};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{info, instrument};

fn row_key(id: ExecutionId) -> String {
    format!("exec:{id}")
}

fn agent_index_key(agent_id: AgentId) -> String {
    format!("exec_agent_index:{agent_id}")
}

fn owner_index_key(owner_id: OwnerId) -> String {
    format!("exec_owner_index:{owner_id}")
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HistoryStats {
    pub total: u64,
    pub success: u64,
    pub error: u64,
    pub running: u64,
    pub last_24h: u64,
}

pub struct HistoryStore {
    backend: Arc<dyn StorageBackend>,
    next_id: AtomicI64,
    stale_threshold: ChronoDuration,
}

impl HistoryStore {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, stale_threshold: std::time::Duration) -> Self {
        Self {
            backend,
            next_id: AtomicI64::new(1),
            stale_threshold: ChronoDuration::from_std(stale_threshold).unwrap_or(ChronoDuration::minutes(30)),
        }
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

    async fn load_row(&self, id: ExecutionId) -> StateResult<Option<ExecutionHistoryRow>> {
        match self.backend.get(&row_key(id)).await.map_err(StateError::Backend)? {
            Some(b) => Ok(Some(serde_json::from_slice(&b).map_err(|e| StateError::Backend(e.to_string()))?)),
            None => Ok(None),
        }
    }

    async fn save_row(&self, row: &ExecutionHistoryRow) -> StateResult<()> {
        let bytes = serde_json::to_vec(row).map_err(|e| StateError::Backend(e.to_string()))?;
        self.backend.set(&row_key(row.id), bytes).await.map_err(StateError::Backend)
    }

    /// Inserts with `status=running, started_at=now`.
    #[instrument(skip(self))]
    pub async fn start(&self, agent_id: AgentId, owner_id: OwnerId, trigger_kind: TriggerKind) -> StateResult<ExecutionId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = ExecutionHistoryRow {
            id,
            agent_id,
            owner_id,
            trigger_kind,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            error_message: None,
            result_summary: None,
        };
        self.save_row(&row).await?;

        let mut agent_ids = self.index(&agent_index_key(agent_id)).await?;
        agent_ids.push(id);
        self.save_index(&agent_index_key(agent_id), &agent_ids).await?;

        let mut owner_ids = self.index(&owner_index_key(owner_id)).await?;
        owner_ids.push(id);
        self.save_index(&owner_index_key(owner_id), &owner_ids).await?;

        Ok(id)
    }

    /// A second call with the same id is a no-op and does not alter
    /// `duration_ms` — idempotent per the history service contract.
    #[instrument(skip(self, error, summary))]
    pub async fn finish(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        duration_ms: u64,
        error: Option<String>,
        summary: Option<String>,
    ) -> StateResult<()> {
        let mut row = self.load_row(id).await?.ok_or(StateError::ExecutionNotFound(id))?;
        if row.status != ExecutionStatus::Running {
            return Ok(());
        }
        row.status = status;
        row.finished_at = Some(Utc::now());
        row.duration_ms = Some(duration_ms);
        row.error_message = error;
        row.result_summary = summary;
        self.save_row(&row).await
    }

    /// Reclassifies a stale `running` row to `error` at read time without
    /// mutating storage; the background sweep (`reap_stale`) is what
    /// actually rewrites it.
    fn reclassify(&self, mut row: ExecutionHistoryRow) -> ExecutionHistoryRow {
        if row.status == ExecutionStatus::Running
            && Utc::now() - row.started_at >= self.stale_threshold
        {
            row.status = ExecutionStatus::Error;
            row.error_message = Some("stale running execution reclassified as error".to_string());
        }
        row
    }

    pub async fn by_agent(&self, agent_id: AgentId, limit: usize) -> StateResult<Vec<ExecutionHistoryRow>> {
        let mut ids = self.index(&agent_index_key(agent_id)).await?;
        ids.reverse();
        let mut out = Vec::new();
        for id in ids.into_iter().take(limit) {
            if let Some(row) = self.load_row(id).await? {
                out.push(self.reclassify(row));
            }
        }
        Ok(out)
    }

    pub async fn by_owner(&self, owner_id: OwnerId, limit: usize) -> StateResult<Vec<ExecutionHistoryRow>> {
        let mut ids = self.index(&owner_index_key(owner_id)).await?;
        ids.reverse();
        let mut out = Vec::new();
        for id in ids.into_iter().take(limit) {
            if let Some(row) = self.load_row(id).await? {
                out.push(self.reclassify(row));
            }
        }
        Ok(out)
    }

    pub async fn stats(&self, owner_id: OwnerId) -> StateResult<HistoryStats> {
        let ids = self.index(&owner_index_key(owner_id)).await?;
        let mut stats = HistoryStats { total: 0, success: 0, error: 0, running: 0, last_24h: 0 };
        let day_ago: DateTime<Utc> = Utc::now() - ChronoDuration::hours(24);
        for id in ids {
            if let Some(row) = self.load_row(id).await? {
                let row = self.reclassify(row);
                stats.total += 1;
                match row.status {
                    ExecutionStatus::Success => stats.success += 1,
                    ExecutionStatus::Error => stats.error += 1,
                    ExecutionStatus::Running => stats.running += 1,
                }
                if row.started_at >= day_ago {
                    stats.last_24h += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Background sweep (Open Question a): rewrites any `running` row
    /// older than the stale threshold to `error` so the reclassification
    /// isn't purely a read-time illusion. Returns the number reaped.
    pub async fn reap_stale(&self) -> StateResult<usize> {
        let rows = self.backend.scan_prefix("exec:").await.map_err(StateError::Backend)?;
        let mut reaped = 0;
        for (_, bytes) in rows {
            let row: ExecutionHistoryRow = serde_json::from_slice(&bytes).map_err(|e| StateError::Backend(e.to_string()))?;
            if row.status == ExecutionStatus::Running && Utc::now() - row.started_at >= self.stale_threshold {
                self.finish(
                    row.id,
                    ExecutionStatus::Error,
                    (Utc::now() - row.started_at).num_milliseconds().max(0) as u64,
                    Some("reaped: execution exceeded stale-running threshold".to_string()),
                    None,
                )
                .await?;
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!(reaped, "stale-running reaper swept rows");
        }
        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn store(stale: std::time::Duration) -> HistoryStore {
        HistoryStore::new(Arc::new(MemoryBackend::new()), stale)
    }

    #[tokio::test]
    async fn start_then_finish_transitions_once() {
        let store = store(std::time::Duration::from_secs(1800));
        let id = store.start(1, 1, TriggerKind::Manual).await.unwrap();
        store.finish(id, ExecutionStatus::Success, 10, None, Some("ok".into())).await.unwrap();
        let rows = store.by_agent(1, 10).await.unwrap();
        assert_eq!(rows[0].status, ExecutionStatus::Success);
        assert_eq!(rows[0].duration_ms, Some(10));
    }

    #[tokio::test]
    async fn second_finish_is_a_noop() {
        let store = store(std::time::Duration::from_secs(1800));
        let id = store.start(1, 1, TriggerKind::Manual).await.unwrap();
        store.finish(id, ExecutionStatus::Success, 10, None, None).await.unwrap();
        store.finish(id, ExecutionStatus::Error, 99, Some("x".into()), None).await.unwrap();
        let rows = store.by_agent(1, 10).await.unwrap();
        assert_eq!(rows[0].status, ExecutionStatus::Success);
        assert_eq!(rows[0].duration_ms, Some(10));
    }

    #[tokio::test]
    async fn stale_running_row_reads_as_error() {
        let store = store(std::time::Duration::from_millis(1));
        let id = store.start(1, 1, TriggerKind::Manual).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let rows = store.by_agent(1, 10).await.unwrap();
        assert_eq!(rows[0].status, ExecutionStatus::Error);
        let _ = id;
    }

    #[tokio::test]
    async fn reaper_rewrites_stale_rows_in_storage() {
        let store = store(std::time::Duration::from_millis(1));
        store.start(1, 1, TriggerKind::Manual).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let reaped = store.reap_stale().await.unwrap();
        assert_eq!(reaped, 1);
        let rows = store.by_agent(1, 10).await.unwrap();
        assert_eq!(rows[0].status, ExecutionStatus::Error);
        assert!(rows[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn stats_report_totals_and_last_24h() {
        let store = store(std::time::Duration::from_secs(1800));
        let id1 = store.start(1, 1, TriggerKind::Manual).await.unwrap();
        store.finish(id1, ExecutionStatus::Success, 5, None, None).await.unwrap();
        let id2 = store.start(1, 1, TriggerKind::Manual).await.unwrap();
        store.finish(id2, ExecutionStatus::Error, 5, Some("e".into()), None).await.unwrap();
        let stats = store.stats(1).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.error, 1);
        assert_eq!(stats.last_24h, 2);
    }
}
