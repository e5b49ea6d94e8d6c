use crate::connection::ConnectionState;
use crate::peer::PeerDevice;
use serde::{Deserialize, Serialize};

/// Everything the embedding layer can observe. Delivered over a single
/// unbounded queue so events for one peer are never reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A peer became visible during the current scan
    PeerDiscovered(PeerDevice),
    /// A previously visible peer is no longer reachable
    PeerLost(String),
    /// The scan stopped or timed out; carries peers first seen in it
    ScanEnded { new_peers: Vec<PeerDevice> },
    /// A per-peer connection state machine moved to a new state
    ConnectionStateChanged {
        peer_id: String,
        state: ConnectionState,
    },
    /// A connect attempt ended in an error
    ConnectionFailed { peer_id: String, error: String },
    /// A transfer job was accepted and is about to start copying
    TransferStarting {
        id: String,
        peer_id: String,
        total_size: Option<u64>,
    },
    /// Cumulative bytes written after each chunk
    TransferProgress {
        id: String,
        bytes_transferred: u64,
        total_size: Option<u64>,
    },
    TransferCompleted {
        id: String,
        bytes_transferred: u64,
    },
    TransferFailed {
        id: String,
        error: String,
    },
    TransferCancelled {
        id: String,
        bytes_transferred: u64,
    },
    /// An inbound payload that parsed as a framed text message
    MessageReceived { peer_id: String, text: String },
    /// Raw inbound bytes passed through unchanged
    PayloadReceived { peer_id: String, data: Vec<u8> },
    /// Critical error in a subsystem
    Error(String),
}
