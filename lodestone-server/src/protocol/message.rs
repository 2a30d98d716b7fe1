use super::{ProtocolError, Result};
use crate::replication::types::LogEntry;
use serde::{Deserialize, Serialize};

/// Message exchanged between cluster peers over framed connections.
///
/// One request frame is answered by exactly one response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Liveness probe, tagged with the sender's node id
    Probe { from: String },
    /// Probe acknowledgment, tagged with the responder's node id
    ProbeAck { node_id: String },
    /// Master pushes a contiguous batch of log entries to a slave
    ShipEntries { entries: Vec<LogEntry> },
    /// Slave pulls entries starting at `start_id` from its master
    FetchEntries { start_id: u64, max_count: u32 },
    /// Reply to `FetchEntries`
    Entries { entries: Vec<LogEntry> },
    /// Reply to `FetchEntries` whose `start_id` fell below the retention
    /// floor; the slave must obtain a full-state transfer before resuming
    ResyncRequired { floor: u64 },
    /// Generic success reply
    Ack,
    /// Generic failure reply
    Error { code: PeerErrorCode, message: String },
}

/// Machine-readable failure categories carried in `PeerMessage::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerErrorCode {
    /// Operation requires the master role
    NotMaster,
    /// Operation requires the slave role
    NotSlave,
    /// Anything else
    Internal,
}

/// Encode a peer message into a frame payload
pub fn encode_message(message: &PeerMessage) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(message, bincode::config::standard())
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode a peer message from a frame payload
pub fn decode_message(payload: &[u8]) -> Result<PeerMessage> {
    let (message, _) = bincode::serde::decode_from_slice(payload, bincode::config::standard())
        .map_err(|e| ProtocolError::Decode(e.to_string()))?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::types::MutationKind;

    #[test]
    fn test_message_round_trip() {
        let message = PeerMessage::ShipEntries {
            entries: vec![LogEntry {
                log_id: 7,
                term: 1,
                kind: MutationKind::Put,
                key: "user:42".to_string(),
                value: "payload with spaces and : colons".to_string(),
                timestamp: 1_700_000_000_000,
            }],
        };

        let bytes = encode_message(&message).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), message);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_message(&[0xff, 0xfe, 0xfd]).is_err());
    }
}
