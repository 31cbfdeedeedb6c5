//! ABOUTME: Conversational orchestrator: intent dispatch, multi-turn flows, progress UX
//! ABOUTME: Any exception escaping this crate is caught here and reported as a generic failure

pub mod dispatch;
pub mod pending;
pub mod progress;
pub mod session;
pub mod transport_adapter;

pub use dispatch::Dispatcher;
pub use pending::PendingFlows;
pub use progress::{Phase, ProgressAnimator};
pub use session::SessionStore;
pub use transport_adapter::{deliver, Reply};

use automaton_core::types::OwnerId;
use automaton_scheduler::{Scheduler, TriggerRouter};
use automaton_state::StateSubstrate;
use automaton_synthesizer::Synthesizer;
use std::sync::Arc;
use tracing::{error, instrument};

/// Top-level conversational entry point. Holds every collaborator the
/// dispatch logic needs and is the one place a panic-adjacent error gets
/// turned into a user-facing message instead of propagating — a failure
/// here must never take down the Scheduler or Trigger Router, which run
/// independently of any chat turn.
pub struct Orchestrator {
    dispatcher: Dispatcher,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        state: Arc<StateSubstrate>,
        synthesizer: Arc<Synthesizer>,
        router: Arc<TriggerRouter>,
        scheduler: Arc<Scheduler>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let pending = Arc::new(PendingFlows::new(Arc::clone(&sessions)));
        Self { dispatcher: Dispatcher { state, synthesizer, router, scheduler, sessions, pending } }
    }

    /// Handles one inbound utterance end to end. Never returns an `Err` —
    /// any internal failure is logged and swapped for a generic reply, so a
    /// bug in one user's flow can't surface a stack-trace-shaped message or
    /// wedge the conversation.
    #[instrument(skip(self, text))]
    pub async fn handle_utterance(&self, owner_id: OwnerId, text: &str) -> Reply {
        match self.dispatcher.handle(owner_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(owner_id, error = %e, "orchestrator dispatch failed, reporting generic error");
                Reply::plain("Something went wrong on my end — please try again.")
            }
        }
    }
}
