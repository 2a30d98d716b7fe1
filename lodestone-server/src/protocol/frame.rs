//! Frame layout: 1 version byte, 4-byte big-endian payload length, payload.
//!
//! Every peer exchange is framed this way so that payloads containing
//! delimiters or binary data can never be misparsed.

use super::ProtocolError;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Current peer protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Upper bound on a single frame payload
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Write one frame: version byte, length prefix, payload
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            ProtocolError::FrameTooLarge(payload.len()),
        ));
    }

    writer.write_all(&[PROTOCOL_VERSION]).await?;
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    Ok(())
}

/// Read one frame, validating version and size; returns the payload
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; 5];
    reader.read_exact(&mut header).await?;

    let version = header[0];
    if version != PROTOCOL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            ProtocolError::Version(version),
        ));
    }

    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            ProtocolError::FrameTooLarge(len),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let mut buf = std::io::Cursor::new(Vec::new());
        write_frame(&mut buf, b"hello frame").await.unwrap();

        let mut cursor = std::io::Cursor::new(buf.into_inner());
        let payload = read_frame(&mut cursor).await.unwrap();
        assert_eq!(payload, b"hello frame");
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let mut buf = std::io::Cursor::new(Vec::new());
        write_frame(&mut buf, b"x").await.unwrap();
        let mut bytes = buf.into_inner();
        bytes[0] = 99;

        let mut cursor = std::io::Cursor::new(bytes);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_rejects_oversized_length() {
        let mut buf = vec![PROTOCOL_VERSION];
        buf.extend_from_slice(&(u32::MAX).to_be_bytes());

        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_frame(&mut cursor).await.is_err());
    }
}
