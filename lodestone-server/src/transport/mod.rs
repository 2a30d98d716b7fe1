//! Transport abstraction for peer traffic.
//!
//! Every network interaction in the replication and heartbeat paths is a
//! short request/response exchange: connect, send one frame, receive one
//! frame, close. The traits below capture exactly that, so the in-memory
//! implementation can stand in for TCP everywhere in tests.

pub mod memory;
pub mod tcp;

pub use memory::{MemoryConnection, MemoryTransport};
pub use tcp::{TcpConnection, TcpTransport};

use crate::protocol::{self, PeerMessage};
use std::future::Future;
use std::io;
use std::time::Duration;

/// A single peer connection carrying framed payloads
pub trait Connection: Send {
    /// Send one frame payload
    fn send(&mut self, payload: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Receive one frame payload, bounded by `timeout`
    fn receive(&mut self, timeout: Duration) -> impl Future<Output = io::Result<Vec<u8>>> + Send;

    /// Close the connection
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Connection factory; the seam between the cluster core and the network
pub trait Transport: Send + Sync + 'static {
    type Conn: Connection;

    /// Open a connection to `host:port`, bounded by `timeout`
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}

/// One request/response round trip against a peer.
///
/// Decode failures surface as `InvalidData` I/O errors; callers treat every
/// failure here as transient peer trouble, never as fatal.
pub async fn exchange<T: Transport>(
    transport: &T,
    host: &str,
    port: u16,
    request: &PeerMessage,
    timeout: Duration,
) -> io::Result<PeerMessage> {
    let payload = protocol::encode_message(request)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut conn = transport.connect(host, port, timeout).await?;
    conn.send(&payload).await?;
    let reply = conn.receive(timeout).await?;
    conn.close().await;

    protocol::decode_message(&reply).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
