use serde::{Deserialize, Serialize};

/// Storage engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KVConfig {
    /// Maximum memory for stored entries (MB)
    pub max_memory_mb: usize,
}

impl Default for KVConfig {
    fn default() -> Self {
        Self { max_memory_mb: 1024 }
    }
}

/// Storage engine statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KVStats {
    pub total_keys: usize,
    pub total_memory_bytes: usize,
    pub sets: u64,
    pub gets: u64,
    pub dels: u64,
    pub hits: u64,
    pub misses: u64,
}
