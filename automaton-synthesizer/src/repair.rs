//! ABOUTME: Repair mode and the pending-repairs staging map
//! ABOUTME: A patched artifact is never written to the Artifact Store until the user approves it

use automaton_core::error::{AgentError, Result};
use automaton_core::types::{AgentId, OwnerId};
use automaton_providers::{ModelChain, ModelRequest};
use automaton_security::{check, ArtifactProgram};
use dashmap::DashMap;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RepairRequest {
    pub existing_artifact: String,
    pub last_error: String,
    pub modification_request: String,
}

#[derive(Debug, Clone)]
pub struct RepairResult {
    pub artifact_text: String,
    pub program: ArtifactProgram,
}

const SYSTEM_PROMPT: &str = "You patch small sandboxed automation artifacts (JSON) to fix a \
runtime error without changing their intent. Respond with only the patched JSON artifact.";

/// Tries the model chain up to `max_attempts` times, same Safety Gate
/// policy as draft mode. Returns the patched artifact without writing it
/// anywhere — callers stage it via `PendingRepairs`.
pub async fn repair(chain: &ModelChain, request: &RepairRequest, max_attempts: u32) -> Result<RepairResult> {
    let mut last_rejection: Option<String> = None;

    for attempt in 1..=max_attempts.max(1) {
        let prompt = build_prompt(request, last_rejection.as_deref());
        let response = chain
            .complete(&prompt)
            .await
            .map_err(|e| AgentError::synthesis(format!("model chain exhausted during repair: {e}")))?;

        match check(&response.text) {
            Ok(program) => {
                info!(attempt, model = %response.model_name, "repair accepted by safety gate");
                return Ok(RepairResult { artifact_text: response.text, program });
            }
            Err(rejection) => {
                warn!(attempt, reason = %rejection.reason, "repair candidate rejected by safety gate");
                last_rejection = Some(rejection.reason);
            }
        }
    }

    Err(AgentError::synthesis(format!(
        "repair exhausted {max_attempts} attempts; last rejection: {}",
        last_rejection.unwrap_or_else(|| "<no attempts ran>".to_string())
    )))
}

fn build_prompt(request: &RepairRequest, rejection_reason: Option<&str>) -> ModelRequest {
    let mut user_prompt = format!(
        "Existing artifact:\n{}\n\nLast runtime error: {}\n\nRequested change: {}\n",
        request.existing_artifact, request.last_error, request.modification_request
    );
    if let Some(reason) = rejection_reason {
        user_prompt.push_str(&format!(
            "\nThe previous patch was rejected by the safety gate: {reason}\nProduce a compliant patch.\n"
        ));
    }
    ModelRequest { system_prompt: SYSTEM_PROMPT.to_string(), user_prompt }
}

/// Staged repairs awaiting user approval, keyed `(owner_id, agent_id)` per
/// the preview-and-apply contract — nothing here is durable, a process
/// restart loses unapproved patches, which is the correct behavior since
/// they were never applied.
#[derive(Default)]
pub struct PendingRepairs {
    staged: DashMap<(OwnerId, AgentId), RepairResult>,
}

impl PendingRepairs {
    #[must_use]
    pub fn new() -> Self {
        Self { staged: DashMap::new() }
    }

    pub fn stage(&self, owner_id: OwnerId, agent_id: AgentId, result: RepairResult) {
        self.staged.insert((owner_id, agent_id), result);
    }

    #[must_use]
    pub fn peek(&self, owner_id: OwnerId, agent_id: AgentId) -> Option<RepairResult> {
        self.staged.get(&(owner_id, agent_id)).map(|r| r.clone())
    }

    /// Removes and returns the staged patch on approval; callers write it
    /// to the Artifact Store themselves.
    pub fn take(&self, owner_id: OwnerId, agent_id: AgentId) -> Option<RepairResult> {
        self.staged.remove(&(owner_id, agent_id)).map(|(_, v)| v)
    }

    pub fn discard(&self, owner_id: OwnerId, agent_id: AgentId) {
        self.staged.remove(&(owner_id, agent_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automaton_providers::EchoProvider;
    use std::sync::Arc;
    use std::time::Duration;

    fn clean_artifact() -> String {
        automaton_security::ArtifactProgram {
            statements: vec![automaton_security::Stmt::Return(Some(automaton_security::Expr::Literal(
                serde_json::json!(1),
            )))],
        }
        .to_text()
    }

    #[tokio::test]
    async fn repair_produces_patch_without_applying_it() {
        let provider: Arc<dyn automaton_providers::ModelProvider> = Arc::new(EchoProvider::new("m", clean_artifact()));
        let chain = ModelChain::new(vec![(provider, Duration::from_secs(1))]);
        let req = RepairRequest {
            existing_artifact: clean_artifact(),
            last_error: "missing field data.price".to_string(),
            modification_request: "guard the access".to_string(),
        };
        let result = repair(&chain, &req, 1).await.unwrap();

        let pending = PendingRepairs::new();
        pending.stage(1, 1, result);
        assert!(pending.peek(1, 1).is_some());
        let taken = pending.take(1, 1);
        assert!(taken.is_some());
        assert!(pending.peek(1, 1).is_none());
    }

    #[tokio::test]
    async fn discard_drops_without_returning() {
        let pending = PendingRepairs::new();
        pending.stage(
            1,
            1,
            RepairResult { artifact_text: clean_artifact(), program: ArtifactProgram::default() },
        );
        pending.discard(1, 1);
        assert!(pending.peek(1, 1).is_none());
    }
}
