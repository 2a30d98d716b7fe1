//! Replication - master/slave mutation log shipping.
//!
//! - 1 master (accepts writes, appends to the mutation log, ships entries)
//! - N slaves (pull or receive entries, replay them against local storage)
//! - Async shipping in contiguous batches, per-slave cursors
//! - Explicit resync flagging when a cursor falls below the retention floor
//!
//! No consensus protocol is involved; ordering comes entirely from the
//! master's monotonic log ids.

pub mod config;
pub mod coordinator;
pub mod log;
pub mod types;

pub use config::ReplicationConfig;
pub use coordinator::ReplicationCoordinator;
pub use log::MutationLog;
pub use types::{
    LogEntry, MutationKind, ReplicaCursor, ReplicationError, ReplicationReport, ReplicationResult,
};

#[cfg(test)]
mod tests;
