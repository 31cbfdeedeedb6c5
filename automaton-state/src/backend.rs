//! ABOUTME: Pluggable durable byte-store backend behind a narrow trait
//! ABOUTME: Only the in-memory implementation ships; a disk-backed one plugs in behind the same contract

use async_trait::async_trait;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), String>;
    async fn delete(&self, key: &str) -> Result<(), String>;
    /// All keys with the given prefix, unordered.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, String>;
}

/// `DashMap`-backed in-memory store. Durable for the life of the process;
/// a disk-backed implementation (e.g. sled) plugs in behind the same
/// trait without any caller changing — matching the teacher's own
/// `StorageBackendType::RocksDB` "not yet implemented" placeholder
/// pattern for a backend variant that exists in the type but not in code.
#[derive(Default)]
pub struct MemoryBackend {
    map: dashmap::DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        Ok(self.map.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), String> {
        self.map.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), String> {
        self.map.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, String> {
        Ok(self
            .map
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }
}
