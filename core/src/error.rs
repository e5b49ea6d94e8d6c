use thiserror::Error;

#[derive(Error, Debug)]
pub enum NearlinkError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Bonding failed for peer {0}")]
    BondingFailed(String),

    #[error("Bonding timed out for peer {0}")]
    BondingTimeout(String),

    #[error("Channel open failed: {0}")]
    ChannelOpenFailed(#[source] std::io::Error),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Connect already in progress for peer {0}")]
    AlreadyConnecting(String),

    #[error("No established connection to peer {0}")]
    NotConnected(String),

    #[error("Unknown peer: {0}")]
    PeerUnknown(String),

    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NearlinkError>;
