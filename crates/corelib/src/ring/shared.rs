//! Shared handle to a ring.
//!
//! One [`SlotRing`] is built at startup and handed to every component as a
//! cheap-to-clone [`SharedRing`]. Readers take the read lock and always see a
//! fully applied state; writers take the write lock for the whole mutation.
//! The lock is synchronous and must never be held across an `.await`.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use crate::hash::HashMode;
use crate::ring::SlotRing;

/// Reference-counted, lock-guarded ring.
#[derive(Clone, Debug)]
pub struct SharedRing {
    inner: Arc<RwLock<SlotRing>>,
}

impl SharedRing {
    pub fn new(ring: SlotRing) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ring)),
        }
    }

    /// Consistent read snapshot of the ring.
    pub fn read(&self) -> RwLockReadGuard<'_, SlotRing> {
        self.inner.read()
    }

    /// Exclusive access for mutation.
    ///
    /// Only the orchestrator should call this; everything else reads.
    pub fn write(&self) -> RwLockWriteGuard<'_, SlotRing> {
        self.inner.write()
    }

    /// Resolve a request key to an owned hostname.
    pub fn get_server(&self, request_key: u64) -> Result<String> {
        self.read().get_server(request_key).map(str::to_owned)
    }

    pub fn list_replicas(&self) -> Vec<String> {
        self.read().list_replicas()
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.read().contains(hostname)
    }

    pub fn is_full(&self) -> bool {
        self.read().is_full()
    }

    pub fn has_capacity(&self) -> bool {
        self.read().has_capacity()
    }

    pub fn hash_mode(&self) -> HashMode {
        self.read().hash_mode()
    }
}

impl From<SlotRing> for SharedRing {
    fn from(ring: SlotRing) -> Self {
        Self::new(ring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ServerId;

    #[test]
    fn test_clones_share_state() {
        let ring = SharedRing::new(SlotRing::new(64, 2).unwrap());
        let reader = ring.clone();
        ring.write().add_server("a", ServerId(1)).unwrap();
        assert_eq!(reader.list_replicas(), vec!["a".to_string()]);
        assert_eq!(reader.get_server(5).unwrap(), "a");
    }

    #[test]
    fn test_concurrent_readers_see_whole_registrations() {
        let ring = SharedRing::new(SlotRing::new(512, 9).unwrap());
        let writer = ring.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..40 {
                let host = format!("server-{}", i);
                writer
                    .write()
                    .add_server(&host, ServerId::from_hostname(&host))
                    .unwrap();
            }
        });
        for _ in 0..200 {
            let snapshot = ring.read();
            // every registered host owns exactly its vnode count
            assert_eq!(snapshot.occupied_slots(), snapshot.len() * 9);
        }
        handle.join().unwrap();
        assert_eq!(ring.list_replicas().len(), 40);
    }
}
