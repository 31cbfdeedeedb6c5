//! ABOUTME: Sandboxed artifact execution: host-call surface, interpreter, and resource caps
//! ABOUTME: The only place an artifact's JSON text turns into running behavior

pub mod adapters;
pub mod executor;
pub mod surface;
pub mod vm;

pub use adapters::{ChainDataAdapter, NullAdapters, PluginRegistry, SecretsProvider};
pub use executor::{SandboxLimits, SandboxedExecutor};
pub use surface::AgentHostCallSurface;
