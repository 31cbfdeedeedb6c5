//! ABOUTME: AI code synthesis: draft mode, repair mode, and intent classification
//! ABOUTME: The only crate that talks to a model chain and the only writer of candidate artifacts

pub mod draft;
pub mod intent;
pub mod repair;

pub use draft::{draft, DraftRequest, DraftResult};
pub use intent::{classify, Intent};
pub use repair::{repair, PendingRepairs, RepairRequest, RepairResult};

use automaton_config::AgentConfig;
use automaton_core::error::Result;
use automaton_providers::ModelChain;

/// Bundles the model chain with the configured retry budgets so callers
/// don't have to thread `max_attempts` through every call site.
pub struct Synthesizer {
    chain: ModelChain,
    synthesis_max_attempts: u32,
    repair_budget: u32,
    pub pending_repairs: PendingRepairs,
}

impl Synthesizer {
    #[must_use]
    pub fn new(chain: ModelChain, config: &AgentConfig) -> Self {
        Self {
            chain,
            synthesis_max_attempts: config.synthesis_max_attempts,
            repair_budget: config.repair_budget,
            pending_repairs: PendingRepairs::new(),
        }
    }

    pub async fn draft(&self, request: &DraftRequest) -> Result<DraftResult> {
        draft(&self.chain, request, self.synthesis_max_attempts).await
    }

    pub async fn repair(&self, request: &RepairRequest) -> Result<RepairResult> {
        repair(&self.chain, request, self.repair_budget).await
    }

    pub async fn classify(&self, utterance: &str) -> Result<Intent> {
        classify(&self.chain, utterance).await
    }
}
