use crate::protocol::{self, PeerErrorCode, PeerMessage, frame};
use crate::replication::{ReplicationCoordinator, ReplicationError};
use crate::transport::Transport;
use crate::transport::memory::FrameHandler;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Answers peer frames: heartbeat probes, pull requests from slaves, and
/// pushed entry batches from the master. One request frame in, one reply
/// frame out.
pub struct PeerService<T: Transport> {
    node_id: String,
    coordinator: Arc<ReplicationCoordinator<T>>,
}

impl<T: Transport> PeerService<T> {
    pub fn new(node_id: impl Into<String>, coordinator: Arc<ReplicationCoordinator<T>>) -> Self {
        Self {
            node_id: node_id.into(),
            coordinator,
        }
    }

    /// Dispatch one peer request to its reply
    pub fn handle(&self, message: PeerMessage) -> PeerMessage {
        match message {
            PeerMessage::Probe { from } => {
                debug!("Heartbeat probe from {}", from);
                PeerMessage::ProbeAck {
                    node_id: self.node_id.clone(),
                }
            }
            PeerMessage::FetchEntries {
                start_id,
                max_count,
            } => match self.coordinator.serve_entries(start_id, max_count as usize) {
                Ok(entries) => PeerMessage::Entries { entries },
                Err(ReplicationError::ResyncRequired { floor, .. }) => {
                    PeerMessage::ResyncRequired { floor }
                }
                Err(ReplicationError::NotMaster) => PeerMessage::Error {
                    code: PeerErrorCode::NotMaster,
                    message: "fetch rejected: not a master".to_string(),
                },
                Err(e) => PeerMessage::Error {
                    code: PeerErrorCode::Internal,
                    message: e.to_string(),
                },
            },
            PeerMessage::ShipEntries { entries } => {
                match self.coordinator.ingest_entries(entries) {
                    Ok(_) => PeerMessage::Ack,
                    Err(ReplicationError::NotSlave) => PeerMessage::Error {
                        code: PeerErrorCode::NotSlave,
                        message: "ship rejected: not a slave".to_string(),
                    },
                    Err(e) => {
                        warn!("Failed to ingest shipped entries: {}", e);
                        PeerMessage::Error {
                            code: PeerErrorCode::Internal,
                            message: e.to_string(),
                        }
                    }
                }
            }
            other => PeerMessage::Error {
                code: PeerErrorCode::Internal,
                message: format!("unexpected request: {:?}", other),
            },
        }
    }

    /// Adapter for registering this service on a `MemoryTransport`
    pub fn frame_handler(self: &Arc<Self>) -> FrameHandler {
        let service = Arc::clone(self);
        Arc::new(move |payload: &[u8]| {
            let request = protocol::decode_message(payload)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let reply = service.handle(request);
            protocol::encode_message(&reply)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        })
    }
}

/// Accept loop for the peer endpoint. Binding errors are returned to the
/// caller; they are fatal at startup.
pub async fn run_peer_listener<T: Transport>(
    addr: SocketAddr,
    service: Arc<PeerService<T>>,
    running: Arc<AtomicBool>,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Peer endpoint listening on {}", addr);

    while running.load(Ordering::SeqCst) {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept peer connection: {}", e);
                continue;
            }
        };

        debug!("Peer connection from {}", peer_addr);
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if let Err(e) = serve_peer_connection(stream, service).await {
                debug!("Peer connection {} closed: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

async fn serve_peer_connection<T: Transport>(
    mut stream: TcpStream,
    service: Arc<PeerService<T>>,
) -> io::Result<()> {
    loop {
        let payload = frame::read_frame(&mut stream).await?;
        let request = protocol::decode_message(&payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let reply = service.handle(request);
        let reply_payload = protocol::encode_message(&reply)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        frame::write_frame(&mut stream, &reply_payload).await?;
    }
}
