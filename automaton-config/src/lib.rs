//! ABOUTME: Central configuration management for the agent execution runtime
//! ABOUTME: Layered defaults -> file -> environment, validated once at startup

pub mod error;

use error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One entry in the AI-model fallback chain used by the synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelChainEntry {
    pub name: String,
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl ModelChainEntry {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The single configuration object for the whole runtime. No global
/// mutable runtime configuration exists beyond this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Chat transport bot token.
    pub transport_token: String,
    /// Ordered AI-model chain with per-model timeouts.
    pub model_chain: Vec<ModelChainEntry>,
    /// Sandbox wall-clock budget in milliseconds (default 30s per the
    /// sandboxed executor contract).
    pub sandbox_wall_clock_ms: u64,
    /// Sandbox heap growth cap in bytes.
    pub sandbox_memory_cap_bytes: u64,
    /// Global concurrency cap across all agents.
    pub max_concurrent_executions: usize,
    /// Log retention window; entries older than this are pruned.
    pub log_retention: DurationSecs,
    /// Whether the scheduler performs an immediate first fire on
    /// registration.
    pub scheduler_immediate_fire: bool,
    /// Bounded retry budget for synthesis draft mode (Open Question b).
    pub synthesis_max_attempts: u32,
    /// Bounded retry budget for auto-repair mode (Open Question b).
    pub repair_budget: u32,
    /// Threshold past which a still-`running` execution history row is
    /// treated as stale (Open Question a).
    pub stale_running_threshold: DurationSecs,
    /// Cadence of the background reaper sweep that rewrites stale rows.
    pub stale_reaper_interval: DurationSecs,
    /// HTTP bind address for the thin dashboard API.
    pub http_bind_addr: String,
    /// Bounded drain window for graceful shutdown.
    pub shutdown_drain: DurationSecs,
}

/// Wrapper so `Duration` round-trips through TOML/JSON as whole seconds
/// without pulling in a serde-duration crate the teacher doesn't carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurationSecs(pub u64);

impl DurationSecs {
    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            transport_token: String::new(),
            model_chain: vec![ModelChainEntry {
                name: "primary".to_string(),
                endpoint: None,
                timeout_ms: 20_000,
            }],
            sandbox_wall_clock_ms: 30_000,
            sandbox_memory_cap_bytes: 64 * 1024 * 1024,
            max_concurrent_executions: 32,
            log_retention: DurationSecs(30 * 24 * 3600),
            scheduler_immediate_fire: true,
            synthesis_max_attempts: 3,
            repair_budget: 1,
            stale_running_threshold: DurationSecs(30 * 60),
            stale_reaper_interval: DurationSecs(5 * 60),
            http_bind_addr: "127.0.0.1:8080".to_string(),
            shutdown_drain: DurationSecs(15),
        }
    }
}

impl AgentConfig {
    /// Load defaults, overlay a TOML file if present, then environment
    /// variables prefixed `AUTOMATON_`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&Self::default())
                .map_err(|e| ConfigError::Validation {
                    field: "<defaults>".to_string(),
                    message: e.to_string(),
                })?,
        );

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("AUTOMATON").separator("__"),
        );

        let built = builder.build().map_err(|e| ConfigError::Validation {
            field: "<config>".to_string(),
            message: e.to_string(),
        })?;

        let cfg: Self = built.try_deserialize().map_err(|e| ConfigError::Validation {
            field: "<config>".to_string(),
            message: e.to_string(),
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates everything §6 requires: positive periods, non-empty model
    /// chain, a positive sandbox budget.
    pub fn validate(&self) -> Result<()> {
        if self.model_chain.is_empty() {
            return Err(ConfigError::Validation {
                field: "model_chain".to_string(),
                message: "at least one model must be configured".to_string(),
            });
        }
        for entry in &self.model_chain {
            if entry.timeout_ms == 0 {
                return Err(ConfigError::Validation {
                    field: "model_chain[].timeout_ms".to_string(),
                    message: format!("model '{}' has a zero timeout", entry.name),
                });
            }
        }
        if self.sandbox_wall_clock_ms == 0 {
            return Err(ConfigError::Validation {
                field: "sandbox_wall_clock_ms".to_string(),
                message: "sandbox wall-clock budget must be positive".to_string(),
            });
        }
        if self.max_concurrent_executions == 0 {
            return Err(ConfigError::Validation {
                field: "max_concurrent_executions".to_string(),
                message: "concurrency cap must be at least 1".to_string(),
            });
        }
        if self.synthesis_max_attempts == 0 {
            return Err(ConfigError::Validation {
                field: "synthesis_max_attempts".to_string(),
                message: "synthesis retry budget must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn sandbox_wall_clock(&self) -> Duration {
        Duration::from_millis(self.sandbox_wall_clock_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_model_chain_rejected() {
        let mut cfg = AgentConfig::default();
        cfg.model_chain.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_wall_clock_rejected() {
        let mut cfg = AgentConfig::default();
        cfg.sandbox_wall_clock_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let cfg = AgentConfig::load(Some(Path::new("/nonexistent/path.toml"))).unwrap();
        assert_eq!(cfg.max_concurrent_executions, 32);
    }
}
