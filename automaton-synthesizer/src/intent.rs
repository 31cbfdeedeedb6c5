//! ABOUTME: Intent classification for the orchestrator's free-form utterance dispatch
//! ABOUTME: Uses the same model chain as draft/repair mode, with a constrained output vocabulary

use automaton_core::error::{AgentError, Result};
use automaton_providers::{ModelChain, ModelRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Modify,
    Run,
    List,
    Question,
}

const SYSTEM_PROMPT: &str = "Classify the user's message into exactly one of: create, modify, run, \
list, question. Respond with only that single word.";

pub async fn classify(chain: &ModelChain, utterance: &str) -> Result<Intent> {
    let request = ModelRequest {
        system_prompt: SYSTEM_PROMPT.to_string(),
        user_prompt: utterance.to_string(),
    };
    let response = chain
        .complete(&request)
        .await
        .map_err(|e| AgentError::synthesis(format!("intent classification failed: {e}")))?;

    parse_intent(&response.text)
}

fn parse_intent(text: &str) -> Result<Intent> {
    match text.trim().to_ascii_lowercase().as_str() {
        "create" => Ok(Intent::Create),
        "modify" => Ok(Intent::Modify),
        "run" => Ok(Intent::Run),
        "list" => Ok(Intent::List),
        "question" => Ok(Intent::Question),
        other => Err(AgentError::synthesis(format!("model returned an unrecognized intent: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automaton_providers::EchoProvider;
    use std::sync::Arc;
    use std::time::Duration;

    async fn classify_with(response: &str) -> Result<Intent> {
        let provider: Arc<dyn automaton_providers::ModelProvider> = Arc::new(EchoProvider::new("m", response));
        let chain = ModelChain::new(vec![(provider, Duration::from_secs(1))]);
        classify(&chain, "anything").await
    }

    #[tokio::test]
    async fn recognizes_each_vocabulary_word() {
        assert_eq!(classify_with("create").await.unwrap(), Intent::Create);
        assert_eq!(classify_with(" List \n").await.unwrap(), Intent::List);
        assert_eq!(classify_with("QUESTION").await.unwrap(), Intent::Question);
    }

    #[tokio::test]
    async fn rejects_out_of_vocabulary_response() {
        assert!(classify_with("delete everything").await.is_err());
    }
}
