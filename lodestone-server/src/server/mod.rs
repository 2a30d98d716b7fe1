//! Node front-ends: the line-protocol listener for clients and the framed
//! peer endpoint serving replication and heartbeat traffic.

pub mod client;
pub mod peer;

pub use client::run_client_listener;
pub use peer::{PeerService, run_peer_listener};
