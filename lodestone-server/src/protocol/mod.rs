//! Wire protocols.
//!
//! Two surfaces share this module:
//! - the line-oriented text protocol spoken by clients (`text`), and
//! - the versioned, length-prefixed binary frames exchanged between peers
//!   for replication and heartbeats (`frame` + `message`).

pub mod frame;
pub mod message;
pub mod text;

pub use frame::{MAX_FRAME_BYTES, PROTOCOL_VERSION, read_frame, write_frame};
pub use message::{PeerErrorCode, PeerMessage, decode_message, encode_message};
pub use text::{Command, Request, Response};

use thiserror::Error;

/// Protocol-level error types
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unsupported protocol version: {0}")]
    Version(u8),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
