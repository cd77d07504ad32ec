//! Core library for the slot-ring load balancer.
//!
//! This crate provides the fundamental abstractions for consistent hashing
//! over a fixed-size slot array:
//! - Replica identity (`ServerId`, `Replica`)
//! - Virtual nodes and their preferred slots
//! - Hashing strategies (`HashMode`)
//! - The ring itself and a shared, lock-guarded handle to it

pub mod error;
pub mod hash;
pub mod node;
pub mod ring;
pub mod vnode;

pub use error::{Error, Result};
pub use hash::HashMode;
pub use node::{Replica, ServerId};
pub use ring::{RingBuilder, SharedRing, SlotBinding, SlotRing};
pub use vnode::VirtualNode;
