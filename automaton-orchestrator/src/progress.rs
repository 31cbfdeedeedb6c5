//! ABOUTME: Coarse progress animation for long-running synthesis calls
//! ABOUTME: Updates the transport on a fixed cadence so the user sees liveness, not just silence

use automaton_core::traits::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Analyze,
    Design,
    Write,
    Scan,
    Finalize,
}

impl Phase {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Analyze => "analyzing your request...",
            Self::Design => "designing the automation...",
            Self::Write => "writing the artifact...",
            Self::Scan => "running the safety scan...",
            Self::Finalize => "finalizing...",
        }
    }

    const SEQUENCE: [Self; 5] = [Self::Analyze, Self::Design, Self::Write, Self::Scan, Self::Finalize];
}

/// Spawns a task that cycles through `Phase::SEQUENCE`, editing the given
/// message on `cadence`, until dropped. The handle owns the task: dropping
/// it (or calling `stop`) ends the animation, typically once synthesis
/// actually completes.
pub struct ProgressAnimator {
    handle: JoinHandle<()>,
}

impl ProgressAnimator {
    #[must_use]
    pub fn start(transport: Arc<dyn Transport>, user_id: i64, message_id: String, cadence: Duration) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                for phase in Phase::SEQUENCE {
                    if let Err(e) = transport.edit(user_id, &message_id, phase.label()).await {
                        warn!(user_id, error = %e, "progress animation edit failed");
                    }
                    tokio::time::sleep(cadence).await;
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for ProgressAnimator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
