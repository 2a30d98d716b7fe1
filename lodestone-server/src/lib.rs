pub mod cluster;
pub mod config;
pub mod core;
pub mod protocol;
pub mod replication;
pub mod server;
pub mod transport;

// Re-export commonly used types
pub use cluster::{
    AdminConsole, ClusterError, ClusterNode, FailoverController, FailureDetector, HeartbeatConfig,
    HeartbeatMonitor, NodeRole,
};
pub use config::ServerConfig;
pub use crate::core::{KVConfig, KVStore, StoreError};
pub use protocol::{PeerMessage, Request, Response};
pub use replication::{
    LogEntry, MutationKind, MutationLog, ReplicationConfig, ReplicationCoordinator,
    ReplicationError,
};
pub use server::{PeerService, run_client_listener, run_peer_listener};
pub use transport::{Connection, MemoryTransport, TcpTransport, Transport};
