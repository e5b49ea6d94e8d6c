pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod events;
pub mod framing;
pub mod peer;
pub mod platform;
pub mod registry;
pub mod session;
pub mod transfer;

pub use config::{DEFAULT_CHUNK_SIZE, SessionConfig};
pub use connection::{Connection, ConnectionManager, ConnectionState};
pub use discovery::DiscoverySession;
pub use error::{NearlinkError, Result};
pub use events::SessionEvent;
pub use peer::{DiscoveryState, PairingState, PeerDevice};
pub use platform::{Channel, PlatformDriver, PlatformEvent};
pub use registry::{DeviceRegistry, PeerFilter};
pub use session::NearlinkSession;
pub use transfer::{TransferEngine, TransferHandle, TransferState};
