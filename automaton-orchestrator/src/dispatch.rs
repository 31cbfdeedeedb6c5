//! ABOUTME: Intent dispatch, the creation multi-turn flow, and auto-repair approval UX
//! ABOUTME: Any error escaping a handler is caught by the caller and rendered as a generic failure

use crate::pending::PendingFlows;
use crate::session::SessionStore;
use crate::transport_adapter::Reply;
use automaton_core::error::{AgentError, Result};
use automaton_core::types::{OwnerId, PendingFlowKind, SessionRole, Trigger};
use automaton_scheduler::{Scheduler, TriggerRouter, TriggerSource};
use automaton_state::StateSubstrate;
use automaton_synthesizer::{DraftRequest, Intent, Synthesizer};
use std::sync::Arc;
use tracing::warn;

pub struct Dispatcher {
    pub state: Arc<StateSubstrate>,
    pub synthesizer: Arc<Synthesizer>,
    pub router: Arc<TriggerRouter>,
    pub scheduler: Arc<Scheduler>,
    pub sessions: Arc<SessionStore>,
    pub pending: Arc<PendingFlows>,
}

/// Garbage-input short-circuit: empty, whitespace-only, or no alphanumeric
/// content at all. Deliberately cheap — a model round-trip isn't worth it
/// for input this degenerate.
#[must_use]
pub fn looks_like_garbage(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.len() < 2 || !trimmed.chars().any(char::is_alphanumeric)
}

/// Best-effort natural-language schedule parse: `"every N <unit>"` ->
/// `Scheduled`, anything else -> `Manual`. A dedicated NL scheduling parser
/// is out of scope; the synthesizer's draft prompt carries the raw text too
/// so a capable model can still interpret cadences this parser misses.
#[must_use]
pub fn parse_schedule(text: &str) -> Trigger {
    let lower = text.to_ascii_lowercase();
    let Some(rest) = lower.strip_prefix("every ") else { return Trigger::Manual };
    let mut parts = rest.split_whitespace();
    let Some(n) = parts.next().and_then(|n| n.parse::<u64>().ok()) else { return Trigger::Manual };
    let unit = parts.next().unwrap_or("");
    let period_secs = if unit.starts_with("sec") {
        n
    } else if unit.starts_with("min") {
        n * 60
    } else if unit.starts_with("hour") {
        n * 3600
    } else {
        return Trigger::Manual;
    };
    if period_secs == 0 {
        Trigger::Manual
    } else {
        Trigger::Scheduled { period_secs }
    }
}

impl Dispatcher {
    pub async fn handle(&self, owner_id: OwnerId, text: &str) -> Result<Reply> {
        self.sessions
            .append(owner_id, "default", SessionRole::User, text, None)
            .await
            .map_err(|e| AgentError::fatal(e.to_string()))?;

        if looks_like_garbage(text) {
            return Ok(Reply::plain("I didn't catch that — describe what you'd like automated."));
        }

        if let Some(flow) = self.pending.get(owner_id).await.map_err(|e| AgentError::fatal(e.to_string()))? {
            return self.resume_flow(owner_id, flow.kind, flow.payload, text).await;
        }

        if let Some(reply) = self.try_repair_approval(owner_id, text).await? {
            return Ok(reply);
        }

        let intent = self.synthesizer.classify(text).await?;
        match intent {
            Intent::Create => self.begin_create_flow(owner_id, text).await,
            Intent::Modify => Ok(Reply::plain("Tell me which agent to modify and what to change.")),
            Intent::Run => self.run_by_name(owner_id, text).await,
            Intent::List => self.list_agents(owner_id).await,
            Intent::Question => Ok(Reply::plain("I can create, run, or list your agents — what would you like?")),
        }
    }

    async fn begin_create_flow(&self, owner_id: OwnerId, task: &str) -> Result<Reply> {
        self.pending
            .set(owner_id, PendingFlowKind::AwaitingName, serde_json::json!({ "task": task }))
            .await
            .map_err(|e| AgentError::fatal(e.to_string()))?;
        Ok(Reply::plain("What should I call this agent?"))
    }

    async fn resume_flow(
        &self,
        owner_id: OwnerId,
        kind: PendingFlowKind,
        payload: serde_json::Value,
        text: &str,
    ) -> Result<Reply> {
        match kind {
            PendingFlowKind::AwaitingName => {
                let task = payload.get("task").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                self.pending
                    .set(
                        owner_id,
                        PendingFlowKind::AwaitingSchedule,
                        serde_json::json!({ "task": task, "name": text.trim() }),
                    )
                    .await
                    .map_err(|e| AgentError::fatal(e.to_string()))?;
                Ok(Reply::plain("When should it run? (e.g. \"every 5 min\" or \"manual\")"))
            }
            PendingFlowKind::AwaitingSchedule => {
                let task = payload.get("task").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let name = payload.get("name").and_then(|v| v.as_str()).unwrap_or("agent").to_string();
                let trigger = parse_schedule(text);
                self.pending.clear(owner_id).await.map_err(|e| AgentError::fatal(e.to_string()))?;
                self.synthesize_and_activate(owner_id, &task, &name, trigger).await
            }
            PendingFlowKind::AwaitingEdit
            | PendingFlowKind::AwaitingRename
            | PendingFlowKind::AwaitingTemplateVariable
            | PendingFlowKind::AwaitingPublishName
            | PendingFlowKind::AwaitingWithdrawalStep => {
                self.pending.clear(owner_id).await.map_err(|e| AgentError::fatal(e.to_string()))?;
                Ok(Reply::plain("That flow isn't available yet; let's start over — what would you like to automate?"))
            }
        }
    }

    async fn synthesize_and_activate(&self, owner_id: OwnerId, task: &str, name: &str, trigger: Trigger) -> Result<Reply> {
        let session_context: Vec<String> = self
            .sessions
            .recent(owner_id, 5)
            .await
            .map_err(|e| AgentError::fatal(e.to_string()))?
            .into_iter()
            .map(|m| m.content)
            .collect();

        let request = DraftRequest {
            task: task.to_string(),
            proposed_name: Some(name.to_string()),
            trigger: trigger.clone(),
            session_context,
        };

        let draft = match self.synthesizer.draft(&request).await {
            Ok(d) => d,
            Err(e) => {
                warn!(owner_id, error = %e, "synthesis exhausted its retry budget");
                return Ok(Reply::plain(format!("I couldn't build that automation: {e}")));
            }
        };

        let agent = self
            .state
            .artifacts
            .create(owner_id, draft.proposed_name.clone(), task.to_string(), draft.artifact_text, trigger.clone())
            .await
            .map_err(|e| AgentError::fatal(e.to_string()))?;

        self.state
            .artifacts
            .update_metadata(owner_id, agent.id, None, None, None, Some(true))
            .await
            .map_err(|e| AgentError::fatal(e.to_string()))?;

        if let Trigger::Scheduled { period_secs } = trigger {
            self.scheduler.register(owner_id, agent.id, period_secs);
        }

        Ok(Reply::plain(format!("\"{}\" is live (agent #{}).", draft.proposed_name, agent.id)))
    }

    async fn run_by_name(&self, owner_id: OwnerId, text: &str) -> Result<Reply> {
        let agents = self.state.artifacts.list_by_owner(owner_id).await.map_err(|e| AgentError::fatal(e.to_string()))?;
        let lower = text.to_ascii_lowercase();
        let Some(agent) = agents.iter().find(|a| lower.contains(&a.name.to_ascii_lowercase())) else {
            return Ok(Reply::plain("I couldn't tell which agent you mean — try naming it exactly."));
        };

        match self.router.dispatch(owner_id, agent.id, agent.trigger.kind(), TriggerSource::Manual).await? {
            automaton_scheduler::DispatchOutcome::Ran { outcome, .. } if outcome.success => {
                Ok(Reply::plain(format!("\"{}\" ran successfully.", agent.name)))
            }
            automaton_scheduler::DispatchOutcome::Ran { outcome, .. } => {
                Ok(Reply::plain(format!("\"{}\" failed: {}", agent.name, outcome.error.unwrap_or_default())))
            }
            automaton_scheduler::DispatchOutcome::Busy { .. } => Ok(Reply::plain("That agent is already running — try again shortly.")),
            automaton_scheduler::DispatchOutcome::Dropped => Ok(Reply::plain("That agent is busy.")),
        }
    }

    async fn list_agents(&self, owner_id: OwnerId) -> Result<Reply> {
        let agents = self.state.artifacts.list_by_owner(owner_id).await.map_err(|e| AgentError::fatal(e.to_string()))?;
        if agents.is_empty() {
            return Ok(Reply::plain("You don't have any agents yet."));
        }
        let lines: Vec<String> = agents
            .iter()
            .map(|a| format!("#{} {} — {}", a.id, a.name, if a.active { "active" } else { "inactive" }))
            .collect();
        Ok(Reply::plain(lines.join("\n")))
    }

    /// Auto-repair approval: a bare "approve"/"yes" after an agent has a
    /// staged repair applies it; "discard"/"no" drops it. Only triggers
    /// when a staged patch actually exists for this user against one of
    /// their agents, so it never hijacks an unrelated yes/no reply.
    async fn try_repair_approval(&self, owner_id: OwnerId, text: &str) -> Result<Option<Reply>> {
        let lower = text.trim().to_ascii_lowercase();
        let approving = matches!(lower.as_str(), "approve" | "yes" | "apply");
        let discarding = matches!(lower.as_str(), "discard" | "no" | "reject");
        if !approving && !discarding {
            return Ok(None);
        }

        let agents = self.state.artifacts.list_by_owner(owner_id).await.map_err(|e| AgentError::fatal(e.to_string()))?;
        for agent in agents {
            if let Some(patch) = self.synthesizer.pending_repairs.peek(owner_id, agent.id) {
                if approving {
                    let _ = patch;
                    let taken = self.synthesizer.pending_repairs.take(owner_id, agent.id).expect("peeked above");
                    self.state
                        .artifacts
                        .update_code(owner_id, agent.id, taken.artifact_text)
                        .await
                        .map_err(|e| AgentError::fatal(e.to_string()))?;
                    return Ok(Some(Reply::plain(format!("Applied the repair to \"{}\".", agent.name))));
                }
                self.synthesizer.pending_repairs.discard(owner_id, agent.id);
                return Ok(Some(Reply::plain(format!("Discarded the proposed repair for \"{}\".", agent.name))));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_detection_flags_empty_and_symbol_only_input() {
        assert!(looks_like_garbage(""));
        assert!(looks_like_garbage("   "));
        assert!(looks_like_garbage("???"));
        assert!(!looks_like_garbage("notify me at 8"));
    }

    #[test]
    fn schedule_parsing_recognizes_common_units() {
        assert_eq!(parse_schedule("every 5 min"), Trigger::Scheduled { period_secs: 300 });
        assert_eq!(parse_schedule("every 2 hours"), Trigger::Scheduled { period_secs: 7200 });
        assert_eq!(parse_schedule("every 30 seconds"), Trigger::Scheduled { period_secs: 30 });
        assert_eq!(parse_schedule("manual"), Trigger::Manual);
        assert_eq!(parse_schedule("every 0 min"), Trigger::Manual);
    }
}
