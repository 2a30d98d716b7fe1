use super::error::{Result, StoreError};
use super::types::{KVConfig, KVStats};
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key-value store using a radix trie for memory-efficient storage
#[derive(Clone)]
pub struct KVStore {
    data: Arc<RwLock<Trie<String, String>>>,
    stats: Arc<RwLock<KVStats>>,
    config: KVConfig,
}

impl KVStore {
    /// Create a new KV store with the given configuration
    pub fn new(config: KVConfig) -> Self {
        info!("Initializing KV store with max_memory={}MB", config.max_memory_mb);

        Self {
            data: Arc::new(RwLock::new(Trie::new())),
            stats: Arc::new(RwLock::new(KVStats::default())),
            config,
        }
    }

    /// Set a key-value pair
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        debug!("PUT key={}, size={}", key, value.len());

        let entry_size = key.len() + value.len();

        {
            let stats = self.stats.read();
            let max_bytes = self.config.max_memory_mb * 1024 * 1024;
            if stats.total_memory_bytes + entry_size > max_bytes {
                warn!(
                    "Memory limit exceeded: {}/{}",
                    stats.total_memory_bytes, max_bytes
                );
                return Err(StoreError::MemoryLimitExceeded);
            }
        }

        let mut data = self.data.write();
        let previous = data.insert(key.to_string(), value.to_string());

        let mut stats = self.stats.write();
        stats.sets += 1;
        match previous {
            Some(old) => {
                stats.total_memory_bytes = stats.total_memory_bytes - old.len() + value.len();
            }
            None => {
                stats.total_keys += 1;
                stats.total_memory_bytes += entry_size;
            }
        }

        Ok(())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<String> {
        debug!("GET key={}", key);

        let data = self.data.read();
        let mut stats = self.stats.write();
        stats.gets += 1;

        match data.get(key) {
            Some(value) => {
                stats.hits += 1;
                Some(value.clone())
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Delete a key, returning whether it was present
    pub fn delete(&self, key: &str) -> bool {
        debug!("DELETE key={}", key);

        let mut data = self.data.write();
        let removed = data.remove(key);

        if let Some(old) = removed {
            let mut stats = self.stats.write();
            stats.dels += 1;
            stats.total_keys = stats.total_keys.saturating_sub(1);
            stats.total_memory_bytes = stats
                .total_memory_bytes
                .saturating_sub(key.len() + old.len());
            true
        } else {
            false
        }
    }

    /// Check if a key exists
    pub fn exists(&self, key: &str) -> bool {
        self.data.read().get(key).is_some()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> KVStats {
        self.stats.read().clone()
    }
}
