//! In-memory transport for tests.
//!
//! Peers register a frame handler under a `host:port` endpoint. A connect
//! to an unregistered endpoint fails like a refused connection; an endpoint
//! marked unreachable fails like a timeout, which is how tests simulate
//! partitions and crashed nodes.

use super::{Connection, Transport};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Handler invoked with a request frame payload, returning the reply payload
pub type FrameHandler = Arc<dyn Fn(&[u8]) -> io::Result<Vec<u8>> + Send + Sync>;

type Endpoint = (String, u16);

/// Loopback transport routing frames to registered handlers
#[derive(Clone, Default)]
pub struct MemoryTransport {
    peers: Arc<RwLock<HashMap<Endpoint, FrameHandler>>>,
    unreachable: Arc<RwLock<HashSet<Endpoint>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer endpoint
    pub fn register(&self, host: &str, port: u16, handler: FrameHandler) {
        self.peers
            .write()
            .insert((host.to_string(), port), handler);
    }

    /// Remove a peer endpoint entirely
    pub fn unregister(&self, host: &str, port: u16) {
        self.peers.write().remove(&(host.to_string(), port));
    }

    /// Make an endpoint time out on connect, simulating a partition
    pub fn set_unreachable(&self, host: &str, port: u16) {
        self.unreachable
            .write()
            .insert((host.to_string(), port));
    }

    /// Undo `set_unreachable`
    pub fn set_reachable(&self, host: &str, port: u16) {
        self.unreachable
            .write()
            .remove(&(host.to_string(), port));
    }
}

/// One in-flight loopback exchange
pub struct MemoryConnection {
    handler: FrameHandler,
    pending_reply: Option<Vec<u8>>,
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("pending_reply", &self.pending_reply)
            .finish_non_exhaustive()
    }
}

impl Transport for MemoryTransport {
    type Conn = MemoryConnection;

    fn connect(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> impl Future<Output = io::Result<Self::Conn>> + Send {
        let endpoint = (host.to_string(), port);
        let unreachable = self.unreachable.read().contains(&endpoint);
        let handler = self.peers.read().get(&endpoint).cloned();

        async move {
            if unreachable {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "peer unreachable"));
            }
            match handler {
                Some(handler) => Ok(MemoryConnection {
                    handler,
                    pending_reply: None,
                }),
                None => Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "no such peer",
                )),
            }
        }
    }
}

impl Connection for MemoryConnection {
    fn send(&mut self, payload: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        let reply = (self.handler)(payload);
        async move {
            self.pending_reply = Some(reply?);
            Ok(())
        }
    }

    fn receive(&mut self, _timeout: Duration) -> impl Future<Output = io::Result<Vec<u8>>> + Send {
        let reply = self.pending_reply.take();
        async move {
            reply.ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "no reply pending")
            })
        }
    }

    fn close(self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PeerMessage;
    use crate::transport::exchange;

    fn echo_handler() -> FrameHandler {
        Arc::new(|payload: &[u8]| Ok(payload.to_vec()))
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let transport = MemoryTransport::new();
        transport.register("10.0.0.1", 7000, echo_handler());

        let reply = exchange(
            &transport,
            "10.0.0.1",
            7000,
            &PeerMessage::Probe {
                from: "node-1".to_string(),
            },
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(
            reply,
            PeerMessage::Probe {
                from: "node-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_peer_refused() {
        let transport = MemoryTransport::new();
        let err = transport
            .connect("10.0.0.9", 7000, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn test_unreachable_peer_times_out() {
        let transport = MemoryTransport::new();
        transport.register("10.0.0.1", 7000, echo_handler());
        transport.set_unreachable("10.0.0.1", 7000);

        let err = transport
            .connect("10.0.0.1", 7000, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        transport.set_reachable("10.0.0.1", 7000);
        assert!(
            transport
                .connect("10.0.0.1", 7000, Duration::from_secs(1))
                .await
                .is_ok()
        );
    }
}
