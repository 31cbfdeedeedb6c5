//! ABOUTME: Core traits, types and error taxonomy for the agent execution runtime
//! ABOUTME: Foundation layer shared by every other crate in the workspace

pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use error::{AgentError, Result};
pub use traits::{FetchOptions, FetchResponse, HostCallSurface, HttpMethod, InlineAction, LoggingTransport, Transport};
pub use types::{
    Agent, AgentId, AgentLogEntry, AgentStateEntry, ExecutionHistoryRow, ExecutionId,
    ExecutionLogLine, ExecutionOutcome, ExecutionStatus, LogLevel, OwnerId, PendingFlowKind,
    PendingFlowState, SessionMessage, SessionRole, Trigger, TriggerKind,
};
