use crate::error::Result;
use crate::events::SessionEvent;
use crate::peer::PeerDevice;
use crate::platform::PlatformDriver;
use crate::registry::DeviceRegistry;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

enum ScanState {
    Idle,
    Scanning {
        serial: u64,
        seen: HashSet<String>,
        new_peers: Vec<PeerDevice>,
    },
}

/// Time-bounded scan session feeding found peers into the registry.
/// Idle -> Scanning on `start`, back to Idle on `stop` or timeout; discovery
/// events delivered after the session ended are dropped, so a cancelled scan
/// can never race an in-flight event into the registry.
pub struct DiscoverySession<P: PlatformDriver> {
    platform: Arc<P>,
    registry: Arc<DeviceRegistry>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    state: Mutex<ScanState>,
    next_serial: AtomicU64,
}

impl<P: PlatformDriver> DiscoverySession<P> {
    pub fn new(
        platform: Arc<P>,
        registry: Arc<DeviceRegistry>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            platform,
            registry,
            event_tx,
            state: Mutex::new(ScanState::Idle),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Begin a scan that ends on its own after `timeout`. Returns false
    /// without side effect when a scan is already running.
    pub async fn start(self: &Arc<Self>, timeout: Duration) -> Result<bool> {
        let serial = {
            let mut state = self.state.lock();
            if matches!(*state, ScanState::Scanning { .. }) {
                debug!("scan already running");
                return Ok(false);
            }
            let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
            *state = ScanState::Scanning {
                serial,
                seen: HashSet::new(),
                new_peers: Vec::new(),
            };
            serial
        };

        if let Err(e) = self.platform.start_scan().await {
            let mut state = self.state.lock();
            if matches!(*state, ScanState::Scanning { serial: s, .. } if s == serial) {
                *state = ScanState::Idle;
            }
            return Err(e);
        }

        info!(timeout_ms = timeout.as_millis() as u64, "scan started");

        // The serial keeps a stale timer from stopping a later session.
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            session.stop_serial(serial).await;
        });

        Ok(true)
    }

    pub async fn stop(&self) {
        let serial = match &*self.state.lock() {
            ScanState::Scanning { serial, .. } => Some(*serial),
            ScanState::Idle => None,
        };
        if let Some(serial) = serial {
            self.stop_serial(serial).await;
        }
    }

    pub fn is_scanning(&self) -> bool {
        matches!(*self.state.lock(), ScanState::Scanning { .. })
    }

    async fn stop_serial(&self, serial: u64) {
        let ended = {
            let mut state = self.state.lock();
            match &mut *state {
                ScanState::Scanning {
                    serial: current,
                    new_peers,
                    ..
                } if *current == serial => {
                    let peers = std::mem::take(new_peers);
                    *state = ScanState::Idle;
                    Some(peers)
                }
                _ => None,
            }
        };

        let Some(new_peers) = ended else { return };

        if let Err(e) = self.platform.stop_scan().await {
            warn!("failed to stop platform scan: {}", e);
        }
        info!(new_peers = new_peers.len(), "scan ended");
        let _ = self.event_tx.send(SessionEvent::ScanEnded { new_peers });
    }

    /// Platform reported a visible peer. Duplicate reports of one id within a
    /// session are suppressed; reports outside a session are ignored.
    pub fn handle_found(&self, id: &str, name: Option<&str>) {
        let mut state = self.state.lock();
        match &mut *state {
            ScanState::Idle => {
                debug!(peer = id, "found event outside scan session, ignoring");
            }
            ScanState::Scanning {
                seen, new_peers, ..
            } => {
                if !seen.insert(id.to_string()) {
                    return;
                }
                let newly_known = self.registry.upsert_discovered(id, name);
                let Some(peer) = self.registry.get(id) else {
                    return;
                };
                if newly_known {
                    new_peers.push(peer.clone());
                }
                let _ = self.event_tx.send(SessionEvent::PeerDiscovered(peer));
            }
        }
    }

    /// Platform reported a peer out of reach. Ignored outside a session.
    pub fn handle_lost(&self, id: &str) {
        let state = self.state.lock();
        match *state {
            ScanState::Idle => {
                debug!(peer = id, "lost event outside scan session, ignoring");
            }
            ScanState::Scanning { .. } => {
                if self.registry.mark_lost(id) {
                    let _ = self.event_tx.send(SessionEvent::PeerLost(id.to_string()));
                }
            }
        }
    }
}
