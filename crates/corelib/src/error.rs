//! Error types for the core library.

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Not enough free slots to place every virtual node of a server
    #[error("hash ring is full, cannot add server {hostname}")]
    RingFull { hostname: String },
    /// A lookup was made against a ring with no registered servers
    #[error("no available servers")]
    NoAvailableServers,
    /// The ring was built with unusable dimensions
    #[error("invalid ring configuration: {0}")]
    InvalidConfig(String),
}
