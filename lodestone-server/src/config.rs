use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::cluster::{HeartbeatConfig, NodeRole};
use crate::core::KVConfig;
use crate::replication::ReplicationConfig;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub node: NodeSettings,
    pub kv_store: KVConfig,
    pub replication: ReplicationConfig,
    pub heartbeat: HeartbeatConfig,
    pub failover: FailoverSettings,
    /// Static membership bootstrap list, including this node
    pub cluster: Vec<BootstrapNode>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Node id; generated when absent
    pub id: Option<String>,
    pub host: String,
    /// Client endpoint port
    pub port: u16,
    /// Peer endpoint port (replication + heartbeat frames)
    pub peer_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverSettings {
    /// Master-failure monitor period in milliseconds
    pub monitor_interval_ms: u64,
    /// Failure detector scan period in milliseconds
    pub failure_scan_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapNode {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub role: NodeRole,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                id: None,
                host: "0.0.0.0".to_string(),
                port: 7500,
                peer_port: 7600,
            },
            kv_store: KVConfig::default(),
            replication: ReplicationConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            failover: FailoverSettings {
                monitor_interval_ms: 3000,
                failure_scan_interval_ms: 2000,
            },
            cluster: Vec::new(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        config
            .replication
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid replication config: {}", e))?;
        Ok(config)
    }

    /// This node's id, generated when the config leaves it unset
    pub fn node_id(&self) -> String {
        self.node
            .id
            .clone()
            .unwrap_or_else(|| format!("node-{}", Uuid::new_v4()))
    }

    /// Client endpoint address
    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.node.host, self.node.port)
    }

    /// Peer endpoint address
    pub fn peer_addr(&self) -> String {
        format!("{}:{}", self.node.host, self.node.peer_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.client_addr(), "0.0.0.0:7500");
        assert_eq!(config.peer_addr(), "0.0.0.0:7600");
        assert!(config.node_id().starts_with("node-"));
        assert!(config.replication.validate().is_ok());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let yaml = r#"
node:
  id: node-1
  host: 127.0.0.1
  port: 7500
  peer_port: 7600
kv_store:
  max_memory_mb: 256
replication:
  role: slave
  master_host: 127.0.0.1
  master_port: 7601
  ship_interval_ms: 100
  ship_batch: 10
  ship_timeout_ms: 2000
  sync_interval_ms: 500
  sync_startup_delay_ms: 1000
  sync_batch: 100
  sync_timeout_ms: 3000
  sync_max_retries: 10
  sync_backoff_base_ms: 1000
  sync_backoff_max_ms: 8000
heartbeat:
  interval_ms: 1000
  timeout_ms: 3000
  probe_timeout_ms: 1000
failover:
  monitor_interval_ms: 3000
  failure_scan_interval_ms: 2000
cluster:
  - id: node-1
    host: 127.0.0.1
    port: 7600
    role: slave
    priority: 50
  - id: node-2
    host: 127.0.0.1
    port: 7601
    role: master
    priority: 100
logging:
  level: debug
  format: text
"#;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.node_id(), "node-1");
        assert!(config.replication.is_slave());
        assert_eq!(config.cluster.len(), 2);
        assert_eq!(config.cluster[1].role, NodeRole::Master);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_replication_config_is_rejected() {
        let yaml = r#"
node:
  id: node-1
  host: 127.0.0.1
  port: 7500
  peer_port: 7600
kv_store:
  max_memory_mb: 256
replication:
  role: slave
  master_host: null
  master_port: null
  ship_interval_ms: 100
  ship_batch: 10
  ship_timeout_ms: 2000
  sync_interval_ms: 500
  sync_startup_delay_ms: 1000
  sync_batch: 100
  sync_timeout_ms: 3000
  sync_max_retries: 10
  sync_backoff_base_ms: 1000
  sync_backoff_max_ms: 8000
heartbeat:
  interval_ms: 1000
  timeout_ms: 3000
  probe_timeout_ms: 1000
failover:
  monitor_interval_ms: 3000
  failure_scan_interval_ms: 2000
cluster: []
logging:
  level: info
  format: text
"#;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        assert!(ServerConfig::from_file(file.path()).is_err());
    }
}
