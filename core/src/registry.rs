//! In-memory registry of known and discovered peers. Pure map plus insertion
//! order for stable listing; no I/O. Mutation is serialized behind one lock
//! since discovery writes can race connection-manager reads.

use crate::peer::{DiscoveryState, PairingState, PeerDevice};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerFilter {
    All,
    Paired,
    Discovered,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, PeerDevice>,
    order: Vec<String>,
}

pub struct DeviceRegistry {
    inner: RwLock<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Idempotent on id. Returns true when the peer was not known before;
    /// re-discovery of a known peer only refreshes its discovery state.
    pub fn upsert_discovered(&self, id: &str, name: Option<&str>) -> bool {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(id) {
            Some(existing) => {
                existing.discovery = DiscoveryState::Discovered;
                if let Some(name) = name {
                    existing.name = Some(name.to_string());
                }
                false
            }
            None => {
                debug!(peer = id, "registering discovered peer");
                inner.order.push(id.to_string());
                inner
                    .entries
                    .insert(id.to_string(), PeerDevice::discovered(id, name));
                true
            }
        }
    }

    /// Record a peer from the platform's bonded list, or mark a known one as
    /// paired. Returns true when the peer was not known before.
    pub fn upsert_paired(&self, id: &str, name: Option<&str>) -> bool {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(id) {
            Some(existing) => {
                existing.pairing = PairingState::Paired;
                if let Some(name) = name {
                    existing.name = Some(name.to_string());
                }
                false
            }
            None => {
                debug!(peer = id, "registering paired peer");
                inner.order.push(id.to_string());
                inner
                    .entries
                    .insert(id.to_string(), PeerDevice::paired(id, name));
                true
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<PeerDevice> {
        let mut inner = self.inner.write();
        let removed = inner.entries.remove(id);
        if removed.is_some() {
            inner.order.retain(|entry| entry != id);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<PeerDevice> {
        self.inner.read().entries.get(id).cloned()
    }

    /// Peers in insertion order, optionally filtered.
    pub fn list(&self, filter: PeerFilter) -> Vec<PeerDevice> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .filter(|peer| match filter {
                PeerFilter::All => true,
                PeerFilter::Paired => peer.pairing == PairingState::Paired,
                PeerFilter::Discovered => peer.discovery == DiscoveryState::Discovered,
            })
            .cloned()
            .collect()
    }

    pub fn mark_lost(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(id) {
            Some(peer) => {
                peer.discovery = DiscoveryState::Lost;
                true
            }
            None => false,
        }
    }

    pub fn set_pairing(&self, id: &str, state: PairingState) -> bool {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(id) {
            Some(peer) => {
                peer.pairing = state;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_is_idempotent_on_id() {
        let registry = DeviceRegistry::new();
        assert!(registry.upsert_discovered("A1:B2:C3", Some("Pixel")));
        assert!(!registry.upsert_discovered("A1:B2:C3", Some("Pixel")));
        assert_eq!(registry.list(PeerFilter::All).len(), 1);
    }

    #[test]
    fn rediscovery_updates_state_without_duplicating() {
        let registry = DeviceRegistry::new();
        registry.upsert_discovered("A1:B2:C3", None);
        registry.mark_lost("A1:B2:C3");
        assert!(registry.list(PeerFilter::Discovered).is_empty());

        registry.upsert_discovered("A1:B2:C3", Some("Pixel"));
        let listed = registry.list(PeerFilter::All);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].discovery, DiscoveryState::Discovered);
        assert_eq!(listed[0].name.as_deref(), Some("Pixel"));
    }

    #[test]
    fn list_preserves_insertion_order() {
        let registry = DeviceRegistry::new();
        registry.upsert_discovered("cc", None);
        registry.upsert_discovered("aa", None);
        registry.upsert_paired("bb", None);
        // re-upserting must not move an entry
        registry.upsert_discovered("cc", None);

        let listed = registry.list(PeerFilter::All);
        let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["cc", "aa", "bb"]);
    }

    #[test]
    fn paired_filter_excludes_unpaired() {
        let registry = DeviceRegistry::new();
        registry.upsert_discovered("aa", None);
        registry.upsert_paired("bb", Some("Laptop"));

        let paired = registry.list(PeerFilter::Paired);
        assert_eq!(paired.len(), 1);
        assert_eq!(paired[0].id, "bb");
    }

    #[test]
    fn remove_drops_entry_and_order() {
        let registry = DeviceRegistry::new();
        registry.upsert_discovered("aa", None);
        registry.upsert_discovered("bb", None);
        assert!(registry.remove("aa").is_some());
        assert!(registry.remove("aa").is_none());
        let listed = registry.list(PeerFilter::All);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "bb");
    }
}
