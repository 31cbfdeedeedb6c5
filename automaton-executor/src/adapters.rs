//! ABOUTME: Trait boundaries for the external collaborators the host-call surface delegates to
//! ABOUTME: Wallet/chain reads, user secrets and the plugin catalog are opaque callables per scope

use async_trait::async_trait;
use automaton_core::types::OwnerId;
use serde_json::Value;

/// Read-only chain-data adapter. Concrete TON/DEX plumbing is out of
/// scope; this is the seam the host-call surface calls through.
#[async_trait]
pub trait ChainDataAdapter: Send + Sync {
    async fn get_ton_balance(&self, address: &str) -> Result<u128, String>;
}

/// Per-user secret/variable store (wallet addresses, API keys the user
/// pasted in). Never logs the value.
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    async fn get_secret(&self, owner_id: OwnerId, name: &str) -> Result<Option<String>, String>;
}

/// Installed-plugin registry. Only installed plugins resolve; anything
/// else is `not_installed`.
#[async_trait]
pub trait PluginRegistry: Send + Sync {
    async fn is_installed(&self, owner_id: OwnerId, plugin_id: &str) -> bool;
    async fn call(&self, owner_id: OwnerId, plugin_id: &str, op: &str, args: Value) -> Result<Value, String>;
}

/// Test double that knows nothing and installs nothing.
pub struct NullAdapters;

#[async_trait]
impl ChainDataAdapter for NullAdapters {
    async fn get_ton_balance(&self, _address: &str) -> Result<u128, String> {
        Ok(0)
    }
}

#[async_trait]
impl SecretsProvider for NullAdapters {
    async fn get_secret(&self, _owner_id: OwnerId, _name: &str) -> Result<Option<String>, String> {
        Ok(None)
    }
}

#[async_trait]
impl PluginRegistry for NullAdapters {
    async fn is_installed(&self, _owner_id: OwnerId, _plugin_id: &str) -> bool {
        false
    }

    async fn call(&self, _owner_id: OwnerId, plugin_id: &str, _op: &str, _args: Value) -> Result<Value, String> {
        Err(format!("plugin not installed: {plugin_id}"))
    }
}
