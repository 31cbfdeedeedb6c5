//! ABOUTME: Draft mode: natural-language task -> candidate artifact, retried against the Safety Gate
//! ABOUTME: Each rejection feeds its reason back into the next prompt as a constraint

use automaton_core::error::{AgentError, Result};
use automaton_core::types::Trigger;
use automaton_providers::{ModelChain, ModelRequest};
use automaton_security::{check, ArtifactProgram};
use tracing::{info, warn};

/// What the orchestrator has gathered before calling into draft mode: the
/// raw task description, an optional user-supplied name, the trigger the
/// user chose (or `Manual` if none), and whatever recent session lines help
/// disambiguate pronouns/references in the task text.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub task: String,
    pub proposed_name: Option<String>,
    pub trigger: Trigger,
    pub session_context: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DraftResult {
    pub artifact_text: String,
    pub program: ArtifactProgram,
    pub proposed_name: String,
    pub attempts: u32,
}

const SYSTEM_PROMPT: &str = "You write small sandboxed automation artifacts as JSON. \
Only the host calls notify, get_state, set_state, fetch, get_ton_balance, get_secret and \
call_plugin are available. Respond with only the JSON artifact, no prose.";

/// Tries the model chain up to `max_attempts` times, running the Safety
/// Gate after every candidate and feeding its rejection reason back as a
/// prompt constraint on the next attempt.
pub async fn draft(chain: &ModelChain, request: &DraftRequest, max_attempts: u32) -> Result<DraftResult> {
    let mut last_rejection: Option<String> = None;

    for attempt in 1..=max_attempts.max(1) {
        let prompt = build_prompt(request, last_rejection.as_deref());
        let response = chain
            .complete(&prompt)
            .await
            .map_err(|e| AgentError::synthesis(format!("model chain exhausted: {e}")))?;

        match check(&response.text) {
            Ok(program) => {
                info!(attempt, model = %response.model_name, "draft accepted by safety gate");
                return Ok(DraftResult {
                    artifact_text: response.text,
                    program,
                    proposed_name: request.proposed_name.clone().unwrap_or_else(|| default_name(request)),
                    attempts: attempt,
                });
            }
            Err(rejection) => {
                warn!(attempt, reason = %rejection.reason, "draft rejected by safety gate, retrying");
                last_rejection = Some(rejection.reason);
            }
        }
    }

    Err(AgentError::synthesis(format!(
        "exhausted {max_attempts} attempts; last rejection: {}",
        last_rejection.unwrap_or_else(|| "<no attempts ran>".to_string())
    )))
}

fn default_name(request: &DraftRequest) -> String {
    request.task.split_whitespace().take(4).collect::<Vec<_>>().join("-").to_lowercase()
}

fn build_prompt(request: &DraftRequest, rejection_reason: Option<&str>) -> ModelRequest {
    let mut user_prompt = format!(
        "Task: {}\nTrigger: {:?}\n",
        request.task, request.trigger
    );
    if !request.session_context.is_empty() {
        user_prompt.push_str("Recent conversation:\n");
        for line in &request.session_context {
            user_prompt.push_str("- ");
            user_prompt.push_str(line);
            user_prompt.push('\n');
        }
    }
    if let Some(reason) = rejection_reason {
        user_prompt.push_str(&format!(
            "\nThe previous draft was rejected by the safety gate: {reason}\n\
             Do not use that primitive. Produce a compliant draft.\n"
        ));
    }
    ModelRequest { system_prompt: SYSTEM_PROMPT.to_string(), user_prompt }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automaton_providers::EchoProvider;
    use std::sync::Arc;
    use std::time::Duration;

    fn clean_artifact() -> String {
        automaton_security::ArtifactProgram {
            statements: vec![automaton_security::Stmt::Expr(automaton_security::Expr::HostCall {
                call: automaton_security::HostCall::Notify,
                args: vec![automaton_security::Expr::Literal(serde_json::json!("hi"))],
            })],
        }
        .to_text()
    }

    fn dirty_artifact() -> String {
        format!("{} // std::fs::read", clean_artifact())
    }

    fn req() -> DraftRequest {
        DraftRequest {
            task: "notify me when price crosses 8".to_string(),
            proposed_name: None,
            trigger: Trigger::Manual,
            session_context: vec![],
        }
    }

    #[tokio::test]
    async fn accepts_first_clean_draft() {
        let provider: std::sync::Arc<dyn automaton_providers::ModelProvider> =
            Arc::new(EchoProvider::new("m", clean_artifact()));
        let chain = ModelChain::new(vec![(provider, Duration::from_secs(1))]);
        let result = draft(&chain, &req(), 3).await.unwrap();
        assert_eq!(result.attempts, 1);
        assert!(!result.proposed_name.is_empty());
    }

    #[tokio::test]
    async fn retries_after_gate_rejection_then_succeeds() {
        // first call returns a dirty artifact, a second EchoProvider entry
        // down the chain returns a clean one — simulates a model correction
        // across attempts by swapping the single provider's canned output
        // is not directly possible with EchoProvider, so we chain two
        // providers and rely on retry re-invoking the whole chain each time.
        struct Toggle {
            calls: std::sync::atomic::AtomicU32,
        }
        #[async_trait::async_trait]
        impl automaton_providers::ModelProvider for Toggle {
            fn name(&self) -> &str {
                "toggle"
            }
            async fn complete(
                &self,
                _req: &ModelRequest,
            ) -> std::result::Result<automaton_providers::ModelResponse, automaton_providers::ModelError> {
                let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let text = if n == 0 { dirty_artifact() } else { clean_artifact() };
                Ok(automaton_providers::ModelResponse { text, model_name: "toggle".to_string() })
            }
        }
        let provider: std::sync::Arc<dyn automaton_providers::ModelProvider> =
            Arc::new(Toggle { calls: std::sync::atomic::AtomicU32::new(0) });
        let chain = ModelChain::new(vec![(provider, Duration::from_secs(1))]);
        let result = draft(&chain, &req(), 3).await.unwrap();
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn exhausts_budget_and_fails_with_reason() {
        let provider: std::sync::Arc<dyn automaton_providers::ModelProvider> =
            Arc::new(EchoProvider::new("m", dirty_artifact()));
        let chain = ModelChain::new(vec![(provider, Duration::from_secs(1))]);
        let err = draft(&chain, &req(), 2).await.unwrap_err();
        assert!(matches!(err, AgentError::Synthesis { .. }));
    }
}
