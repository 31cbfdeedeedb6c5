//! ABOUTME: Shared domain types for agents, triggers, logs and execution history
//! ABOUTME: Pure data — no persistence or execution logic lives here

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AgentId = i64;
pub type OwnerId = i64;
pub type ExecutionId = i64;

/// Discriminator for `Trigger`, stored alongside the trigger's own
/// parameters so queries can filter by kind without deserializing the
/// whole variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Scheduled,
    Webhook,
}

/// What starts an execution.
///
/// `Scheduled` and `Webhook` carry their own parameters so the tagged union
/// round-trips through storage without a second lookup. Construction is
/// validated at the Artifact Store boundary (`Trigger::validate`), not
/// inside the scheduler — a malformed period should never reach a running
/// timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Scheduled { period_secs: u64 },
    Webhook { token: String },
}

impl Trigger {
    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Manual => TriggerKind::Manual,
            Self::Scheduled { .. } => TriggerKind::Scheduled,
            Self::Webhook { .. } => TriggerKind::Webhook,
        }
    }

    /// Enforces `trigger = scheduled ⇒ period > 0` and that webhook tokens
    /// are non-empty. Called by the Artifact Store before any write.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Scheduled { period_secs } if *period_secs == 0 => {
                Err("scheduled trigger requires period_secs > 0".to_string())
            }
            Self::Webhook { token } if token.trim().is_empty() => {
                Err("webhook trigger requires a non-empty token".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Durable record of an agent: identity, synthesized artifact, trigger and
/// activation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    /// Opaque synthesized artifact text. Never written unless it has
    /// already passed the Safety Gate.
    pub artifact: String,
    pub trigger: Trigger,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// `active ⇒ artifact passed the Safety Gate` is enforced by callers
    /// before flipping this flag; this just checks the cheap half of the
    /// invariant (a blank artifact can never be active).
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        if self.active && self.artifact.trim().is_empty() {
            return false;
        }
        self.trigger.validate().is_ok()
    }
}

/// `(agent_id, key) -> value` durable state entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStateEntry {
    pub agent_id: AgentId,
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

/// Append-only log line produced by an agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogEntry {
    pub id: i64,
    pub agent_id: AgentId,
    pub owner_id: OwnerId,
    pub level: LogLevel,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Error,
}

/// One row per invocation. Starts `Running`, transitions exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionHistoryRow {
    pub id: ExecutionId,
    pub agent_id: AgentId,
    pub owner_id: OwnerId,
    pub trigger_kind: TriggerKind,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub result_summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    User,
    Assistant,
    System,
}

/// One line of a durable per-user transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub user_id: OwnerId,
    pub session_id: String,
    pub role: SessionRole,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// The handful of multi-turn interaction flows the orchestrator can be
/// waiting on for a given user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingFlowKind {
    AwaitingName,
    AwaitingSchedule,
    AwaitingEdit,
    AwaitingRename,
    AwaitingTemplateVariable,
    AwaitingPublishName,
    AwaitingWithdrawalStep,
}

/// Transient per-user state parking a multi-turn flow between utterances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingFlowState {
    pub user_id: OwnerId,
    pub kind: PendingFlowKind,
    /// Just enough context to resume: draft description, target agent id,
    /// partially filled template variables, etc.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Result of one sandboxed invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub value: Option<serde_json::Value>,
    pub error: Option<String>,
    pub logs: Vec<ExecutionLogLine>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogLine {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_trigger_requires_positive_period() {
        assert!(Trigger::Scheduled { period_secs: 0 }.validate().is_err());
        assert!(Trigger::Scheduled { period_secs: 60 }.validate().is_ok());
    }

    #[test]
    fn webhook_trigger_requires_token() {
        assert!(Trigger::Webhook { token: String::new() }.validate().is_err());
        assert!(Trigger::Webhook { token: "abc".into() }.validate().is_ok());
    }

    #[test]
    fn active_agent_cannot_have_blank_artifact() {
        let agent = Agent {
            id: 1,
            owner_id: 1,
            name: "n".into(),
            description: "d".into(),
            artifact: String::new(),
            trigger: Trigger::Manual,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!agent.invariants_hold());
    }
}
