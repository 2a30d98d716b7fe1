use crate::core::StoreError;
use crate::protocol::ProtocolError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mutation variants recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Put,
    Delete,
}

/// One immutable record in the mutation log.
///
/// `log_id` is assigned by the owning log, strictly increasing from 1.
/// `term` is fixed at 1; there is no term advancement in this design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub log_id: u64,
    pub term: u64,
    pub kind: MutationKind,
    pub key: String,
    pub value: String,
    pub timestamp: u64,
}

/// Per-slave shipping progress held by a master coordinator.
///
/// `next_log_id` is always >= 1 and advances only after a confirmed ship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaCursor {
    pub replica_id: String,
    pub host: String,
    pub port: u16,
    pub alive: bool,
    pub next_log_id: u64,
    /// Set when the cursor fell below the retention floor; incremental
    /// shipping stops until an external full-state transfer re-arms it.
    pub needs_resync: bool,
}

/// Diagnostic snapshot of a coordinator; never used for control decisions
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationReport {
    pub node_id: String,
    pub role: String,
    pub running: bool,
    pub last_log_id: u64,
    pub last_applied_log_id: u64,
    pub unsynced: bool,
    pub master: Option<(String, u16)>,
    pub replicas: Vec<ReplicaCursor>,
}

/// Replication error types
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Operation requires the master role")]
    NotMaster,

    #[error("Operation requires the slave role")]
    NotSlave,

    #[error("Invalid replication role: {0}")]
    InvalidRole(String),

    #[error("Entries from {requested} no longer retained (floor: {floor}); full resync required")]
    ResyncRequired { requested: u64, floor: u64 },

    #[error("Log sequence gap: expected {expected}, got {actual}")]
    SequenceGap { expected: u64, actual: u64 },

    #[error("Failed to apply log {log_id} to store: {key}")]
    ApplyFailed { log_id: u64, key: String },

    #[error("Peer connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Peer rejected request: {0}")]
    Rejected(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for replication operations
pub type ReplicationResult<T> = std::result::Result<T, ReplicationError>;
