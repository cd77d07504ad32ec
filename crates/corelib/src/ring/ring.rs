//! Slot-array hash ring and its builder.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::hash::HashMode;
use crate::node::{Replica, ServerId};
use crate::ring::{DEFAULT_NUM_SLOTS, DEFAULT_VIRTUAL_NODES};
use crate::vnode::VirtualNode;

/// The replica bound to an occupied slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotBinding {
    pub hostname: String,
    pub server_id: ServerId,
}

/// Fixed-size consistent hash ring with virtual nodes.
///
/// # Invariants
///
/// - A hostname is in the registry iff exactly `num_virtual` slots reference it
/// - No slot is referenced by two hostnames
/// - `num_virtual * registered <= num_slots`
///
/// Mutation goes through `&mut self`; share it across tasks with
/// [`SharedRing`](crate::ring::SharedRing).
#[derive(Clone, Debug)]
pub struct SlotRing {
    num_slots: usize,
    num_virtual: usize,
    mode: HashMode,
    slots: Vec<Option<SlotBinding>>,
    registry: HashMap<String, ServerId>,
    occupied: usize,
}

impl SlotRing {
    /// Create an empty ring in default hash mode.
    ///
    /// # Errors
    /// `InvalidConfig` if either dimension is zero or `num_virtual > num_slots`.
    pub fn new(num_slots: usize, num_virtual: usize) -> Result<Self> {
        RingBuilder::new()
            .with_slots(num_slots)
            .with_vnodes(num_virtual)
            .build()
    }

    fn empty(num_slots: usize, num_virtual: usize, mode: HashMode) -> Self {
        Self {
            num_slots,
            num_virtual,
            mode,
            slots: vec![None; num_slots],
            registry: HashMap::new(),
            occupied: 0,
        }
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn num_virtual(&self) -> usize {
        self.num_virtual
    }

    pub fn hash_mode(&self) -> HashMode {
        self.mode
    }

    /// Number of registered replicas.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn occupied_slots(&self) -> usize {
        self.occupied
    }

    pub fn free_slots(&self) -> usize {
        self.num_slots - self.occupied
    }

    /// True iff no slot is empty.
    pub fn is_full(&self) -> bool {
        self.occupied == self.num_slots
    }

    /// True iff one more replica fits (enough free slots for all its vnodes).
    pub fn has_capacity(&self) -> bool {
        self.free_slots() >= self.num_virtual
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.registry.contains_key(hostname)
    }

    pub fn server_id(&self, hostname: &str) -> Option<ServerId> {
        self.registry.get(hostname).copied()
    }

    /// Binding at `index`, or `None` if the slot is empty or out of range.
    pub fn slot(&self, index: usize) -> Option<&SlotBinding> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Register a replica and claim `num_virtual` slots for it.
    ///
    /// Returns `Ok(false)` without touching the ring when `hostname` is
    /// already registered.
    ///
    /// # Algorithm
    ///
    /// 1. Refuse with `RingFull` unless every vnode is guaranteed a slot
    /// 2. For each vnode, start at its preferred slot and probe forward
    ///    (wrapping) past occupied slots and slots claimed earlier in this call
    /// 3. Commit all claims at once
    ///
    /// Planning happens before any slot is written, so a failed call leaves
    /// the ring untouched.
    ///
    /// # Performance
    /// - **Time**: O(v * n) worst case where v = vnodes, n = slots
    pub fn add_server(&mut self, hostname: &str, server_id: ServerId) -> Result<bool> {
        if self.registry.contains_key(hostname) {
            return Ok(false);
        }
        if !self.has_capacity() {
            return Err(Error::RingFull {
                hostname: hostname.to_owned(),
            });
        }

        let placement = self.plan_placement(hostname, server_id)?;
        for slot in placement {
            self.slots[slot] = Some(SlotBinding {
                hostname: hostname.to_owned(),
                server_id,
            });
        }
        self.occupied += self.num_virtual;
        self.registry.insert(hostname.to_owned(), server_id);
        Ok(true)
    }

    fn plan_placement(&self, hostname: &str, server_id: ServerId) -> Result<Vec<usize>> {
        let mut claimed = Vec::with_capacity(self.num_virtual);
        for vnode in VirtualNode::for_server(server_id, self.num_virtual) {
            let preferred = vnode.preferred_slot(self.mode, self.num_slots);
            let slot = self
                .walk_from(preferred)
                .find(|i| self.slots[*i].is_none() && !claimed.contains(i))
                .ok_or_else(|| Error::RingFull {
                    hostname: hostname.to_owned(),
                })?;
            claimed.push(slot);
        }
        Ok(claimed)
    }

    /// Unregister a replica and free its slots.
    ///
    /// Returns `false` (and does nothing) for an unknown hostname.
    pub fn remove_server(&mut self, hostname: &str) -> bool {
        if self.registry.remove(hostname).is_none() {
            return false;
        }
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|b| b.hostname == hostname) {
                *slot = None;
                self.occupied -= 1;
            }
        }
        true
    }

    /// Resolve a request key to the hostname that should serve it.
    ///
    /// # Errors
    /// `NoAvailableServers` when nothing is registered.
    pub fn get_server(&self, request_key: u64) -> Result<&str> {
        let home = self.mode.request_slot(request_key, self.num_slots);
        self.successor(home).map(|binding| binding.hostname.as_str())
    }

    /// First occupied slot at or after `slot`, wrapping past the end.
    ///
    /// The emptiness check comes first: with nothing registered there is no
    /// successor to find.
    pub fn successor(&self, slot: usize) -> Result<&SlotBinding> {
        if self.registry.is_empty() {
            return Err(Error::NoAvailableServers);
        }
        self.walk_from(slot % self.num_slots)
            .find_map(|i| self.slots[i].as_ref())
            .ok_or(Error::NoAvailableServers)
    }

    /// Switch hashing strategy. Existing bindings stay where they are.
    pub fn set_hash_mode(&mut self, mode: HashMode) {
        self.mode = mode;
    }

    /// Registered hostnames, sorted.
    pub fn list_replicas(&self) -> Vec<String> {
        let mut hostnames: Vec<String> = self.registry.keys().cloned().collect();
        hostnames.sort();
        hostnames
    }

    /// Registered replicas with their ids, sorted by hostname.
    pub fn members(&self) -> Vec<Replica> {
        let mut members: Vec<Replica> = self
            .registry
            .iter()
            .map(|(hostname, id)| Replica::with_id(hostname.clone(), *id))
            .collect();
        members.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        members
    }

    /// Slots held by each hostname, in increasing order.
    pub fn layout(&self) -> BTreeMap<String, Vec<usize>> {
        let mut layout: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(binding) = slot {
                layout.entry(binding.hostname.clone()).or_default().push(index);
            }
        }
        layout
    }

    /// Slot indexes starting at `start`, one full lap in increasing order.
    fn walk_from(&self, start: usize) -> impl Iterator<Item = usize> {
        let n = self.num_slots;
        (0..n).map(move |step| (start + step) % n)
    }
}

/// Builder for [`SlotRing`].
///
/// # Example
///
/// ```rust
/// use corelib::{HashMode, Replica, RingBuilder};
///
/// let ring = RingBuilder::new()
///     .with_slots(64)
///     .with_vnodes(3)
///     .with_mode(HashMode::Alternate)
///     .add_replica(Replica::new("server-0"))
///     .build()
///     .unwrap();
/// assert_eq!(ring.occupied_slots(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct RingBuilder {
    num_slots: usize,
    num_virtual: usize,
    mode: HashMode,
    replicas: Vec<Replica>,
}

impl Default for RingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RingBuilder {
    /// Start from 512 slots, 9 vnodes per replica, default hash mode.
    pub fn new() -> Self {
        Self {
            num_slots: DEFAULT_NUM_SLOTS,
            num_virtual: DEFAULT_VIRTUAL_NODES,
            mode: HashMode::Default,
            replicas: Vec::new(),
        }
    }

    pub fn with_slots(mut self, num_slots: usize) -> Self {
        self.num_slots = num_slots;
        self
    }

    pub fn with_vnodes(mut self, num_virtual: usize) -> Self {
        self.num_virtual = num_virtual;
        self
    }

    pub fn with_mode(mut self, mode: HashMode) -> Self {
        self.mode = mode;
        self
    }

    /// Register a replica as part of the build.
    pub fn add_replica(mut self, replica: Replica) -> Self {
        self.replicas.push(replica);
        self
    }

    /// Validate the dimensions and build the ring.
    ///
    /// # Errors
    /// `InvalidConfig` for unusable dimensions, `RingFull` if the listed
    /// replicas do not fit.
    pub fn build(self) -> Result<SlotRing> {
        if self.num_slots == 0 {
            return Err(Error::InvalidConfig("ring needs at least one slot".into()));
        }
        if self.num_virtual == 0 {
            return Err(Error::InvalidConfig(
                "replicas need at least one virtual node".into(),
            ));
        }
        if self.num_virtual > self.num_slots {
            return Err(Error::InvalidConfig(format!(
                "{} virtual nodes do not fit in {} slots",
                self.num_virtual, self.num_slots
            )));
        }

        let mut ring = SlotRing::empty(self.num_slots, self.num_virtual, self.mode);
        for replica in &self.replicas {
            ring.add_server(&replica.hostname, replica.server_id)?;
        }
        Ok(ring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(slots: usize, vnodes: usize) -> SlotRing {
        SlotRing::new(slots, vnodes).unwrap()
    }

    #[test]
    fn test_add_claims_preferred_slots_when_free() {
        let mut ring = ring(512, 3);
        assert!(ring.add_server("a", ServerId(0)).unwrap());
        // (0 + 3j + 25) for j = 0..3
        assert_eq!(ring.layout()["a"], vec![25, 28, 31]);
    }

    #[test]
    fn test_collision_probes_forward() {
        let mut ring = ring(512, 1);
        ring.add_server("a", ServerId(0)).unwrap(); // slot 25
        ring.add_server("b", ServerId(0)).unwrap(); // wants 25, gets 26
        assert_eq!(ring.slot(25).unwrap().hostname, "a");
        assert_eq!(ring.slot(26).unwrap().hostname, "b");
    }

    #[test]
    fn test_probe_wraps_to_start() {
        let mut ring = ring(8, 1);
        // (5 + 25) % 8 = 6, (6 + 25) % 8 = 7
        ring.add_server("a", ServerId(5)).unwrap();
        ring.add_server("b", ServerId(6)).unwrap();
        // also wants 7; 7 taken so wraps to 0
        ring.add_server("c", ServerId(6)).unwrap();
        assert_eq!(ring.slot(0).unwrap().hostname, "c");
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let mut ring = ring(64, 4);
        assert!(ring.add_server("a", ServerId(1)).unwrap());
        let before = ring.layout();
        assert!(!ring.add_server("a", ServerId(99)).unwrap());
        assert_eq!(ring.layout(), before);
        assert_eq!(ring.server_id("a"), Some(ServerId(1)));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut ring = ring(64, 4);
        ring.add_server("a", ServerId(1)).unwrap();
        assert!(!ring.remove_server("ghost"));
        assert_eq!(ring.occupied_slots(), 4);
    }

    #[test]
    fn test_failed_add_leaves_ring_untouched() {
        let mut ring = ring(10, 4);
        ring.add_server("a", ServerId(1)).unwrap();
        ring.add_server("b", ServerId(2)).unwrap();
        let before = ring.layout();
        let err = ring.add_server("c", ServerId(3)).unwrap_err();
        assert_eq!(err, Error::RingFull { hostname: "c".into() });
        assert_eq!(ring.layout(), before);
        assert!(!ring.contains("c"));
        assert_eq!(ring.free_slots(), 2);
    }

    #[test]
    fn test_successor_on_empty_ring() {
        let ring = ring(16, 2);
        assert_eq!(ring.successor(3), Err(Error::NoAvailableServers));
        assert_eq!(ring.get_server(3), Err(Error::NoAvailableServers));
    }

    #[test]
    fn test_builder_rejects_bad_dimensions() {
        assert!(matches!(
            RingBuilder::new().with_slots(0).build(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            RingBuilder::new().with_vnodes(0).build(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            RingBuilder::new().with_slots(4).with_vnodes(5).build(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_mode_switch_keeps_bindings() {
        let mut ring = ring(128, 3);
        ring.add_server("a", ServerId(7)).unwrap();
        let before = ring.layout();
        ring.set_hash_mode(HashMode::Alternate);
        assert_eq!(ring.hash_mode(), HashMode::Alternate);
        assert_eq!(ring.layout(), before);
    }
}
