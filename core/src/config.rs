use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reference chunk size for transfers; callers may pass any size >= 1.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

const DEFAULT_BONDING_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(12);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bounded wait for the platform bonding result. The attempt fails with
    /// a timeout error instead of hanging on a peer that never answers.
    pub bonding_timeout: Duration,
    /// Bounded wait for the platform channel open call.
    pub connect_timeout: Duration,
    /// How long a scan runs before the session ends on its own.
    pub scan_timeout: Duration,
    /// Chunk size used by the facade's send operations.
    pub chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bonding_timeout: DEFAULT_BONDING_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let config = SessionConfig::default();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"chunk_size": 4096}"#).unwrap();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.bonding_timeout, Duration::from_secs(20));
    }
}
