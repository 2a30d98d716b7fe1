use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Node role in the cluster.
///
/// Candidate is transient: a node only holds it while self-nominating
/// during an election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Slave,
    Candidate,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Slave => "slave",
            NodeRole::Candidate => "candidate",
        }
    }
}

/// One row of the authoritative membership table.
///
/// `alive` is fed externally (failure detector callback); it is independent
/// from the heartbeat monitor's own health records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub role: NodeRole,
    pub priority: i32,
    pub alive: bool,
}

impl ClusterNode {
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        role: NodeRole,
        priority: i32,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            role,
            priority,
            alive: true,
        }
    }
}

/// Aggregate counts over the membership table
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterSummary {
    pub total_nodes: usize,
    pub masters: usize,
    pub slaves: usize,
    pub alive_nodes: usize,
    pub dead_nodes: usize,
}

/// Cluster error types
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node {id} is not a slave (role: {role})")]
    NotSlave { id: String, role: String },

    #[error("Node {id} is not a master (role: {role})")]
    NotMaster { id: String, role: String },

    #[error("No suitable slave available for promotion")]
    NoCandidate,

    #[error("Node {0} cannot participate in the election")]
    NotEligible(String),
}

/// Result type alias for cluster operations
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;
