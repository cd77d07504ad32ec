//! Replica identity.
//!
//! A replica is known by its hostname. The ring places it using a compact
//! `ServerId` derived from that hostname, so the same hostname always lands
//! on the same slots regardless of which balancer process registers it.

use std::fmt;

use crate::hash::md5_prefix;

/// Compact identifier for a replica on the ring.
///
/// Newtype over `u32`; derived deterministically from the hostname.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ServerId(pub u32);

impl ServerId {
    /// Derive the id for `hostname` (first 32 bits of its MD5 digest).
    pub fn from_hostname(hostname: &str) -> Self {
        ServerId(md5_prefix(hostname.as_bytes()))
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A physical replica participating in the ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replica {
    /// Hostname the replica is reachable at; also its routing identity.
    pub hostname: String,
    pub server_id: ServerId,
}

impl Replica {
    /// Build a replica, deriving its id from the hostname.
    pub fn new(hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        let server_id = ServerId::from_hostname(&hostname);
        Self {
            hostname,
            server_id,
        }
    }

    /// Build a replica with an explicit id.
    pub fn with_id(hostname: impl Into<String>, server_id: ServerId) -> Self {
        Self {
            hostname: hostname.into(),
            server_id,
        }
    }
}
