//! Consistent hash ring implementation.
//!
//! The ring is a fixed-size slot array. Replicas claim slots through their
//! virtual nodes; requests resolve to the first claimed slot at or after
//! their home slot, wrapping at the end.

pub mod ring;
pub mod shared;

pub use ring::{RingBuilder, SlotBinding, SlotRing};
pub use shared::SharedRing;

/// Default number of slots in a ring.
pub const DEFAULT_NUM_SLOTS: usize = 512;

/// Default number of virtual nodes per replica.
pub const DEFAULT_VIRTUAL_NODES: usize = 9;
