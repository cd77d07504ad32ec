//! In-flight markers for hostnames being spawned, removed or replaced.
//!
//! Claiming a hostname is an atomic test-and-set; the claim is released when
//! the returned guard drops, including on early returns and panics.

use std::sync::Arc;

use dashmap::DashSet;

/// Set of hostnames with a lifecycle operation underway.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    hostnames: Arc<DashSet<String>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `hostname`, or `None` if someone else already holds it.
    pub fn try_claim(&self, hostname: &str) -> Option<InFlightGuard> {
        if self.hostnames.insert(hostname.to_owned()) {
            Some(InFlightGuard {
                hostnames: Arc::clone(&self.hostnames),
                hostname: hostname.to_owned(),
            })
        } else {
            None
        }
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.hostnames.contains(hostname)
    }

    pub fn len(&self) -> usize {
        self.hostnames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hostnames.is_empty()
    }
}

/// Releases its hostname's in-flight marker on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    hostnames: Arc<DashSet<String>>,
    hostname: String,
}

impl InFlightGuard {
    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.hostnames.remove(&self.hostname);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_drop() {
        let inflight = InFlight::new();
        let guard = inflight.try_claim("a").unwrap();
        assert!(inflight.contains("a"));
        assert!(inflight.try_claim("a").is_none());
        assert!(inflight.try_claim("b").is_some());
        drop(guard);
        assert!(!inflight.contains("a"));
        assert!(inflight.try_claim("a").is_some());
    }

    #[test]
    fn test_clones_share_markers() {
        let inflight = InFlight::new();
        let other = inflight.clone();
        let _guard = inflight.try_claim("a").unwrap();
        assert!(other.contains("a"));
        assert_eq!(other.len(), 1);
    }
}
