//! Cluster coordination - liveness, failure detection and failover.
//!
//! - `HeartbeatMonitor` probes peers and keeps per-node health records
//! - `FailureDetector` turns the dead set into edge-triggered notifications
//! - `FailoverController` owns the membership table and executes promotion,
//!   demotion and the simplified election
//! - `AdminConsole` exposes the control plane as text commands
//!
//! Health records and the membership table are deliberately separate: the
//! detector's callback is the only bridge between them.

pub mod admin;
pub mod failover;
pub mod failure;
pub mod heartbeat;
pub mod types;

pub use admin::{AdminConsole, AdminError, CommandHandler};
pub use failover::FailoverController;
pub use failure::{FailureCallback, FailureDetector};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, HeartbeatSummary, NodeHealth};
pub use types::{ClusterError, ClusterNode, ClusterResult, ClusterSummary, NodeRole};
