//! The seam between the kernel and the excluded platform layer. Outbound
//! commands go through [`PlatformDriver`]; platform callbacks come back in as
//! [`PlatformEvent`] messages so each state machine processes one event at a
//! time instead of nesting callback objects.

use crate::error::Result;
use async_trait::async_trait;
use tokio::io::AsyncWrite;

/// The owned byte sink of an established connection. Inbound bytes arrive
/// separately as [`PlatformEvent::InboundPayload`].
pub type Channel = Box<dyn AsyncWrite + Send + Unpin>;

/// Commands the kernel issues to the platform. Any of them may fail with
/// `PermissionDenied` when the capability is unavailable.
#[async_trait]
pub trait PlatformDriver: Send + Sync + 'static {
    async fn start_scan(&self) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    /// Initiate platform bonding with the peer. The result arrives later as
    /// [`PlatformEvent::BondingResult`].
    async fn start_bonding(&self, peer_id: &str) -> Result<()>;

    /// Open a reliable byte channel to the peer. May block on I/O; the
    /// connection manager bounds the wait.
    async fn open_channel(&self, peer_id: &str) -> Result<Channel>;
}

#[derive(Debug, Clone)]
pub enum PlatformEvent {
    PeerFound { id: String, name: Option<String> },
    PeerLost { id: String },
    BondingResult { id: String, success: bool },
    InboundPayload { id: String, data: Vec<u8> },
}
