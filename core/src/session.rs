use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionManager, ConnectionState};
use crate::discovery::DiscoverySession;
use crate::error::Result;
use crate::events::SessionEvent;
use crate::framing;
use crate::peer::PeerDevice;
use crate::platform::{PlatformDriver, PlatformEvent};
use crate::registry::{DeviceRegistry, PeerFilter};
use crate::transfer::{TransferEngine, TransferHandle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::debug;

/// The single external-facing API: composes the registry, discovery session,
/// connection manager and transfer engine, and owns the event stream the
/// embedding UI layer consumes.
pub struct NearlinkSession<P: PlatformDriver> {
    config: SessionConfig,
    registry: Arc<DeviceRegistry>,
    discovery: Arc<DiscoverySession<P>>,
    connections: Arc<ConnectionManager<P>>,
    transfers: Arc<TransferEngine>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl<P: PlatformDriver> NearlinkSession<P> {
    /// Build a session over the given platform driver. Returns the session
    /// and the receiving end of its event stream.
    pub fn new(
        platform: Arc<P>,
        config: SessionConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(DeviceRegistry::new());
        let discovery = Arc::new(DiscoverySession::new(
            platform.clone(),
            registry.clone(),
            event_tx.clone(),
        ));
        let connections = Arc::new(ConnectionManager::new(
            platform,
            registry.clone(),
            config.clone(),
            event_tx.clone(),
        ));
        let transfers = Arc::new(TransferEngine::new(event_tx.clone()));

        let session = Arc::new(Self {
            config,
            registry,
            discovery,
            connections,
            transfers,
            event_tx,
        });
        (session, event_rx)
    }

    /// Seed the registry from the platform's bonded list, the equivalent of
    /// loading already-paired devices at startup.
    pub fn register_paired_peer(&self, id: &str, name: Option<&str>) {
        self.registry.upsert_paired(id, name);
    }

    /// Start a scan with the configured timeout. No-op when already scanning.
    pub async fn scan(&self) -> Result<bool> {
        self.discovery.start(self.config.scan_timeout).await
    }

    pub async fn scan_for(&self, timeout: Duration) -> Result<bool> {
        self.discovery.start(timeout).await
    }

    pub async fn stop_scan(&self) {
        self.discovery.stop().await;
    }

    /// Current peer list in stable (insertion) order.
    pub fn peers(&self, filter: PeerFilter) -> Vec<PeerDevice> {
        self.registry.list(filter)
    }

    pub fn peer(&self, peer_id: &str) -> Option<PeerDevice> {
        self.registry.get(peer_id)
    }

    pub fn connection_state(&self, peer_id: &str) -> Option<ConnectionState> {
        self.connections.state_of(peer_id)
    }

    /// Claim the peer's connection slot and drive the attempt in a spawned
    /// task, so one peer's slow bonding never blocks another. Fails fast with
    /// `AlreadyConnecting` while an attempt is in flight; the attempt itself
    /// reports through the event stream.
    pub fn connect(&self, peer_id: &str) -> Result<()> {
        let (conn, pairing) = self.connections.begin_connect(peer_id)?;
        let manager = self.connections.clone();
        let event_tx = self.event_tx.clone();
        let peer_id = peer_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = manager.drive_connect(conn, pairing).await {
                let _ = event_tx.send(SessionEvent::ConnectionFailed {
                    peer_id,
                    error: e.to_string(),
                });
            }
        });
        Ok(())
    }

    /// Like [`connect`](Self::connect), but awaits the outcome in place.
    pub async fn connect_and_wait(&self, peer_id: &str) -> Result<Connection> {
        self.connections.connect(peer_id).await
    }

    pub async fn disconnect(&self, peer_id: &str) -> Result<()> {
        self.connections.disconnect(peer_id).await
    }

    /// Stream a file to the peer in configured-size chunks.
    pub async fn send_file(
        &self,
        peer_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<TransferHandle> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let total = file.metadata().await?.len();
        let conn = self.connections.connection(peer_id)?;
        self.transfers
            .send(conn, file, Some(total), self.config.chunk_size)
    }

    /// Send a UTF-8 text message, framed so it can share the channel with
    /// file bytes.
    pub fn send_message(&self, peer_id: &str, text: &str) -> Result<TransferHandle> {
        let conn = self.connections.connection(peer_id)?;
        let frame = framing::encode_message(text);
        let total = frame.len() as u64;
        self.transfers.send(
            conn,
            std::io::Cursor::new(frame),
            Some(total),
            self.config.chunk_size,
        )
    }

    /// Stream an arbitrary byte source with an explicit chunk size.
    pub fn send_bytes<S>(
        &self,
        peer_id: &str,
        source: S,
        total_size: Option<u64>,
        chunk_size: usize,
    ) -> Result<TransferHandle>
    where
        S: AsyncRead + Send + Unpin + 'static,
    {
        let conn = self.connections.connection(peer_id)?;
        self.transfers.send(conn, source, total_size, chunk_size)
    }

    pub fn cancel_transfer(&self, job_id: &str) -> bool {
        self.transfers.cancel(job_id)
    }

    /// The single inbound entry point for the platform layer. Callback-style
    /// deliveries are turned into messages routed to the owning component.
    pub fn handle_platform_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::PeerFound { id, name } => {
                self.discovery.handle_found(&id, name.as_deref());
            }
            PlatformEvent::PeerLost { id } => {
                self.discovery.handle_lost(&id);
            }
            PlatformEvent::BondingResult { id, success } => {
                self.connections.deliver_bonding_result(&id, success);
            }
            PlatformEvent::InboundPayload { id, data } => match framing::decode_message(&data) {
                Some(text) => {
                    let _ = self.event_tx.send(SessionEvent::MessageReceived {
                        peer_id: id,
                        text,
                    });
                }
                None => {
                    debug!(peer = %id, len = data.len(), "raw inbound payload");
                    let _ = self
                        .event_tx
                        .send(SessionEvent::PayloadReceived { peer_id: id, data });
                }
            },
        }
    }
}
