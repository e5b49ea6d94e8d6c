use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairingState {
    Unpaired,
    Pairing,
    Paired,
}

impl PairingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairingState::Unpaired => "unpaired",
            PairingState::Pairing => "pairing",
            PairingState::Paired => "paired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryState {
    Discovered,
    Lost,
}

/// A remote device known to the registry, keyed by its stable identifier
/// (hardware address or endpoint id, depending on the platform layer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDevice {
    pub id: String,
    pub name: Option<String>,
    pub pairing: PairingState,
    pub discovery: DiscoveryState,
}

impl PeerDevice {
    pub fn discovered(id: &str, name: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.map(str::to_string),
            pairing: PairingState::Unpaired,
            discovery: DiscoveryState::Discovered,
        }
    }

    /// A peer loaded from the platform's bonded list; not currently visible
    /// until a scan reports it.
    pub fn paired(id: &str, name: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.map(str::to_string),
            pairing: PairingState::Paired,
            discovery: DiscoveryState::Lost,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.pairing == PairingState::Paired
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
