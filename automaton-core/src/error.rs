//! ABOUTME: Shared error taxonomy for the agent execution runtime
//! ABOUTME: Mirrors the error kinds enumerated in the error handling design

use thiserror::Error;

/// Error taxonomy shared across every crate in the runtime.
///
/// Each variant corresponds to one of the error kinds in the error handling
/// design: everything below `Fatal` is handled locally by its owning
/// component and reported through the closest user-visible channel.
#[derive(Debug, Error)]
pub enum AgentError {
    /// User-supplied input rejected (bad address, garbage text, out of range).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Cross-user access to an agent or its derived records.
    ///
    /// Deliberately carries no detail: ownership failures and "not found"
    /// must render identically to callers.
    #[error("not found")]
    Ownership,

    /// Artifact failed the static safety gate.
    #[error("safety gate rejected artifact: {reason}")]
    SafetyGate { reason: String },

    /// The synthesizer's model chain was exhausted without producing a
    /// compliant artifact.
    #[error("synthesis failed: {reason}")]
    Synthesis { reason: String },

    /// The sandboxed executor exceeded its wall-clock budget.
    #[error("sandbox timeout after {elapsed_ms}ms")]
    SandboxTimeout { elapsed_ms: u64 },

    /// The sandboxed executor exceeded its memory cap.
    #[error("sandbox memory exhausted: used {used} bytes, cap {cap} bytes")]
    SandboxMemory { used: u64, cap: u64 },

    /// The artifact raised a runtime error during execution.
    #[error("sandbox runtime error: {message}")]
    SandboxRuntime { message: String },

    /// Outbound chat delivery failed.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// A downstream HTTP/chain/plugin call failed.
    #[error("integration error: {message}")]
    Integration { message: String },

    /// Per-agent lock is held; caller should treat this as "try later".
    #[error("agent busy")]
    Busy,

    /// Requested a plugin that is not installed for this user/agent.
    #[error("plugin not installed: {plugin_id}")]
    PluginNotInstalled { plugin_id: String },

    /// Unrecoverable condition: database unreachable at startup, invalid
    /// configuration. The process is expected to log and exit.
    #[error("fatal error: {message}")]
    Fatal { message: String },
}

impl AgentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn safety_gate(reason: impl Into<String>) -> Self {
        Self::SafetyGate { reason: reason.into() }
    }

    pub fn synthesis(reason: impl Into<String>) -> Self {
        Self::Synthesis { reason: reason.into() }
    }

    pub fn sandbox_runtime(message: impl Into<String>) -> Self {
        Self::SandboxRuntime { message: message.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    pub fn integration(message: impl Into<String>) -> Self {
        Self::Integration { message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }

    /// Whether this error belongs to a class the auto-repair flow may act on.
    ///
    /// Only runtime faults inside the artifact are repairable; sandbox
    /// resource limits and infra errors are not something a code patch can
    /// fix.
    #[must_use]
    pub fn is_repairable(&self) -> bool {
        matches!(self, Self::SandboxRuntime { .. })
    }
}

/// Same classification as `AgentError::is_repairable`, applied to an
/// already-rendered error message (e.g. `ExecutionOutcome::error`) once the
/// original variant has been flattened to text. Relies on `SandboxRuntime`'s
/// `Display` prefix, the only variant `is_repairable` accepts.
#[must_use]
pub fn message_is_repairable(message: &str) -> bool {
    message.starts_with("sandbox runtime error:")
}

pub type Result<T> = std::result::Result<T, AgentError>;
