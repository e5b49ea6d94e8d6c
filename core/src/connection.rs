use crate::config::SessionConfig;
use crate::error::{NearlinkError, Result};
use crate::events::SessionEvent;
use crate::peer::PairingState;
use crate::platform::{Channel, PlatformDriver};
use crate::registry::DeviceRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Per-peer connection lifecycle. `Failed` is reachable from Pairing,
/// Connecting and Established; `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Pairing,
    Bonded,
    Connecting,
    Established,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

pub(crate) struct ConnectionShared {
    peer_id: String,
    state: Mutex<ConnectionState>,
    // The channel is exclusively owned here: the transfer engine writes under
    // this lock and the manager takes it out on disconnect, so a close always
    // lands on a chunk boundary.
    channel: tokio::sync::Mutex<Option<Channel>>,
}

/// Cloneable handle to one peer's connection attempt.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<ConnectionShared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_id", &self.shared.peer_id)
            .field("state", &*self.shared.state.lock())
            .finish_non_exhaustive()
    }
}

impl Connection {
    fn new(peer_id: &str) -> Self {
        Self {
            shared: Arc::new(ConnectionShared {
                peer_id: peer_id.to_string(),
                state: Mutex::new(ConnectionState::Idle),
                channel: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.shared.peer_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub(crate) fn channel(&self) -> &tokio::sync::Mutex<Option<Channel>> {
        &self.shared.channel
    }

    /// Established -> Failed on a channel write error. Returns false when the
    /// connection already reached a terminal state.
    pub(crate) fn mark_failed(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = ConnectionState::Failed;
        true
    }
}

/// Owns every [`Connection`] and drives the per-peer state machine
/// Idle -> Pairing -> Bonded -> Connecting -> Established -> Closed.
/// At most one non-terminal attempt exists per peer id.
pub struct ConnectionManager<P: PlatformDriver> {
    platform: Arc<P>,
    registry: Arc<DeviceRegistry>,
    config: SessionConfig,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    connections: Mutex<HashMap<String, Connection>>,
    bonding_waiters: Mutex<HashMap<String, oneshot::Sender<bool>>>,
}

impl<P: PlatformDriver> ConnectionManager<P> {
    pub fn new(
        platform: Arc<P>,
        registry: Arc<DeviceRegistry>,
        config: SessionConfig,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            platform,
            registry,
            config,
            event_tx,
            connections: Mutex::new(HashMap::new()),
            bonding_waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Synchronous admission check: claims the peer's connection slot or
    /// fails fast with `AlreadyConnecting`. No other side effect.
    pub fn begin_connect(&self, peer_id: &str) -> Result<(Connection, PairingState)> {
        let peer = self
            .registry
            .get(peer_id)
            .ok_or_else(|| NearlinkError::PeerUnknown(peer_id.to_string()))?;

        let mut table = self.connections.lock();
        if let Some(existing) = table.get(peer_id) {
            if !existing.state().is_terminal() {
                return Err(NearlinkError::AlreadyConnecting(peer_id.to_string()));
            }
        }
        let conn = Connection::new(peer_id);
        table.insert(peer_id.to_string(), conn.clone());
        Ok((conn, peer.pairing))
    }

    pub async fn connect(&self, peer_id: &str) -> Result<Connection> {
        let (conn, pairing) = self.begin_connect(peer_id)?;
        self.drive_connect(conn, pairing).await
    }

    /// Runs the claimed attempt through bonding and channel open. Emits a
    /// state-changed event on every transition.
    pub async fn drive_connect(
        &self,
        conn: Connection,
        pairing: PairingState,
    ) -> Result<Connection> {
        let peer_id = conn.peer_id().to_string();

        if pairing == PairingState::Paired {
            debug!(peer = %peer_id, "peer already paired, skipping bonding");
            self.set_state(&conn, ConnectionState::Bonded);
        } else {
            self.set_state(&conn, ConnectionState::Pairing);
            self.registry.set_pairing(&peer_id, PairingState::Pairing);

            let (tx, rx) = oneshot::channel();
            self.bonding_waiters.lock().insert(peer_id.clone(), tx);

            if let Err(e) = self.platform.start_bonding(&peer_id).await {
                self.bonding_waiters.lock().remove(&peer_id);
                self.registry.set_pairing(&peer_id, PairingState::Unpaired);
                self.fail(&conn, &e);
                return Err(e);
            }

            match timeout(self.config.bonding_timeout, rx).await {
                Ok(Ok(true)) => {
                    info!(peer = %peer_id, "bonding succeeded");
                    self.registry.set_pairing(&peer_id, PairingState::Paired);
                    self.set_state(&conn, ConnectionState::Bonded);
                }
                Ok(Ok(false)) => {
                    self.registry.set_pairing(&peer_id, PairingState::Unpaired);
                    let err = NearlinkError::BondingFailed(peer_id);
                    self.fail(&conn, &err);
                    return Err(err);
                }
                Ok(Err(_)) => {
                    // waiter dropped by a concurrent disconnect
                    self.registry.set_pairing(&peer_id, PairingState::Unpaired);
                    let err = NearlinkError::BondingFailed(peer_id);
                    self.fail(&conn, &err);
                    return Err(err);
                }
                Err(_) => {
                    self.bonding_waiters.lock().remove(&peer_id);
                    self.registry.set_pairing(&peer_id, PairingState::Unpaired);
                    let err = NearlinkError::BondingTimeout(peer_id);
                    self.fail(&conn, &err);
                    return Err(err);
                }
            }
        }

        self.set_state(&conn, ConnectionState::Connecting);
        let channel = match timeout(
            self.config.connect_timeout,
            self.platform.open_channel(&peer_id),
        )
        .await
        {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                self.fail(&conn, &e);
                return Err(e);
            }
            Err(_) => {
                let err = NearlinkError::ChannelOpenFailed(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "channel open timed out",
                ));
                self.fail(&conn, &err);
                return Err(err);
            }
        };

        // A disconnect may have raced us while the open was in flight; shut
        // the fresh channel back down instead of leaking it.
        let leftover = {
            let mut guard = conn.channel().lock().await;
            let mut state = conn.shared.state.lock();
            if state.is_terminal() {
                Some(channel)
            } else {
                *guard = Some(channel);
                *state = ConnectionState::Established;
                None
            }
        };
        if let Some(mut channel) = leftover {
            if let Err(e) = channel.shutdown().await {
                debug!(peer = %peer_id, "channel shutdown error: {}", e);
            }
            return Err(NearlinkError::ChannelClosed);
        }

        self.emit_state(&peer_id, ConnectionState::Established);
        info!(peer = %peer_id, "connection established");
        Ok(conn)
    }

    /// Bonding result delivered by the platform layer.
    pub fn deliver_bonding_result(&self, peer_id: &str, success: bool) {
        match self.bonding_waiters.lock().remove(peer_id) {
            Some(tx) => {
                let _ = tx.send(success);
            }
            None => debug!(peer = peer_id, "unsolicited bonding result, ignoring"),
        }
    }

    /// Valid from any non-terminal state; idempotent once terminal. Always
    /// releases the channel, and any in-flight transfer observes the close at
    /// its next chunk boundary.
    pub async fn disconnect(&self, peer_id: &str) -> Result<()> {
        let conn = self
            .connections
            .lock()
            .get(peer_id)
            .cloned()
            .ok_or_else(|| NearlinkError::NotConnected(peer_id.to_string()))?;

        // A connect waiting on bonding sees its waiter dropped and fails out.
        drop(self.bonding_waiters.lock().remove(peer_id));

        let closed = {
            let mut guard = conn.channel().lock().await;
            let channel = {
                let mut state = conn.shared.state.lock();
                if state.is_terminal() {
                    None
                } else {
                    *state = ConnectionState::Closed;
                    Some(guard.take())
                }
            };
            match channel {
                None => false,
                Some(channel) => {
                    if let Some(mut channel) = channel {
                        if let Err(e) = channel.shutdown().await {
                            debug!(peer = peer_id, "channel shutdown error: {}", e);
                        }
                    }
                    true
                }
            }
        };

        if closed {
            self.emit_state(peer_id, ConnectionState::Closed);
            info!(peer = peer_id, "disconnected");
        }
        Ok(())
    }

    /// The established connection for a peer, for the transfer engine.
    pub fn connection(&self, peer_id: &str) -> Result<Connection> {
        let conn = self
            .connections
            .lock()
            .get(peer_id)
            .cloned()
            .ok_or_else(|| NearlinkError::NotConnected(peer_id.to_string()))?;
        if conn.state() != ConnectionState::Established {
            return Err(NearlinkError::NotConnected(peer_id.to_string()));
        }
        Ok(conn)
    }

    pub fn state_of(&self, peer_id: &str) -> Option<ConnectionState> {
        self.connections
            .lock()
            .get(peer_id)
            .map(Connection::state)
    }

    fn set_state(&self, conn: &Connection, next: ConnectionState) {
        {
            let mut state = conn.shared.state.lock();
            if state.is_terminal() {
                // a concurrent disconnect already finalized this attempt
                return;
            }
            *state = next;
        }
        self.emit_state(conn.peer_id(), next);
    }

    fn fail(&self, conn: &Connection, err: &NearlinkError) {
        warn!(peer = conn.peer_id(), "connect attempt failed: {}", err);
        self.set_state(conn, ConnectionState::Failed);
    }

    fn emit_state(&self, peer_id: &str, state: ConnectionState) {
        let _ = self.event_tx.send(SessionEvent::ConnectionStateChanged {
            peer_id: peer_id.to_string(),
            state,
        });
    }
}
