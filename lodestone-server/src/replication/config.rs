use crate::cluster::NodeRole;
use serde::{Deserialize, Serialize};

/// Replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Node role; the coordinator's mode is fixed at construction
    pub role: NodeRole,

    /// Master address (required for slave nodes)
    pub master_host: Option<String>,
    pub master_port: Option<u16>,

    /// Master shipping loop period in milliseconds
    pub ship_interval_ms: u64,

    /// Maximum entries shipped to one slave per tick
    pub ship_batch: usize,

    /// Timeout for one ship round trip in milliseconds
    pub ship_timeout_ms: u64,

    /// Slave sync loop period in milliseconds
    pub sync_interval_ms: u64,

    /// Delay before the slave's first sync attempt in milliseconds
    pub sync_startup_delay_ms: u64,

    /// Maximum entries requested per sync round trip
    pub sync_batch: u32,

    /// Timeout for one sync round trip in milliseconds
    pub sync_timeout_ms: u64,

    /// Consecutive sync failures tolerated before the slave marks itself
    /// unsynced; retries continue at the capped backoff interval
    pub sync_max_retries: u32,

    /// Base backoff after a failed sync in milliseconds (doubles per
    /// consecutive failure up to `sync_backoff_max_ms`)
    pub sync_backoff_base_ms: u64,
    pub sync_backoff_max_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::Master,
            master_host: None,
            master_port: None,
            ship_interval_ms: 100,
            ship_batch: 10,
            ship_timeout_ms: 2000,
            sync_interval_ms: 500,
            sync_startup_delay_ms: 1000,
            sync_batch: 100,
            sync_timeout_ms: 3000,
            sync_max_retries: 10,
            sync_backoff_base_ms: 1000,
            sync_backoff_max_ms: 8000,
        }
    }
}

impl ReplicationConfig {
    /// Validate configuration for the configured role
    pub fn validate(&self) -> Result<(), String> {
        match self.role {
            NodeRole::Master => Ok(()),
            NodeRole::Slave => {
                if self.master_host.is_none() || self.master_port.is_none() {
                    return Err("Slave node requires master_host and master_port".to_string());
                }
                Ok(())
            }
            NodeRole::Candidate => {
                Err("Candidate is a transient election role, not a startup role".to_string())
            }
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    pub fn is_slave(&self) -> bool {
        self.role == NodeRole::Slave
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_master() {
        let config = ReplicationConfig::default();
        assert!(config.is_master());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_slave_requires_master_address() {
        let mut config = ReplicationConfig::default();
        config.role = NodeRole::Slave;
        assert!(config.validate().is_err());

        config.master_host = Some("127.0.0.1".to_string());
        config.master_port = Some(7600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_candidate_rejected_at_startup() {
        let mut config = ReplicationConfig::default();
        config.role = NodeRole::Candidate;
        assert!(config.validate().is_err());
    }
}
