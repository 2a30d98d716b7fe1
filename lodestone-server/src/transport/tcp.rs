use super::{Connection, Transport};
use crate::protocol::frame;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// TCP transport for peer traffic
#[derive(Debug, Clone, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Framed TCP connection
pub struct TcpConnection {
    stream: TcpStream,
}

impl Transport for TcpTransport {
    type Conn = TcpConnection;

    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = io::Result<Self::Conn>> + Send {
        let target = (host.to_string(), port);
        async move {
            let stream = tokio::time::timeout(timeout, TcpStream::connect(target))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
            Ok(TcpConnection { stream })
        }
    }
}

impl Connection for TcpConnection {
    fn send(&mut self, payload: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        async move { frame::write_frame(&mut self.stream, payload).await }
    }

    fn receive(&mut self, timeout: Duration) -> impl Future<Output = io::Result<Vec<u8>>> + Send {
        async move {
            tokio::time::timeout(timeout, frame::read_frame(&mut self.stream))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "receive timed out"))?
        }
    }

    fn close(mut self) -> impl Future<Output = ()> + Send {
        async move {
            if let Err(e) = self.stream.shutdown().await {
                debug!("Error closing connection: {}", e);
            }
        }
    }
}
