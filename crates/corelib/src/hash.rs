//! Hashing strategies for placing virtual nodes and requests on the ring.
//!
//! Each strategy is a matched pair: one function places virtual nodes, the
//! other places requests. Switching strategy always switches both, so a ring
//! can never place nodes with one scheme and look requests up with another.

use std::fmt;

use md5::{Digest, Md5};

use crate::node::ServerId;

/// The hashing strategy used by a ring.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum HashMode {
    /// Simple polynomial maps, reproducible by hand.
    ///
    /// - node: `(server_id + 3j + 25) mod slots`
    /// - request: `(key + 2key² + 17) mod slots`
    #[default]
    Default,
    /// MD5 over a canonical string key, first 32 bits reduced mod slots.
    ///
    /// - node: `md5("{server_id}-{j}")`
    /// - request: `md5("{key}")`
    Alternate,
}

impl HashMode {
    /// Pick a mode from the API's `useDefault` toggle.
    pub fn from_use_default(use_default: bool) -> Self {
        if use_default {
            HashMode::Default
        } else {
            HashMode::Alternate
        }
    }

    /// Preferred slot for virtual node `virtual_index` of `server_id`.
    ///
    /// # Arguments
    ///
    /// * `server_id` - The owning server
    /// * `virtual_index` - Index of the virtual node, `0..num_virtual`
    /// * `num_slots` - Size of the ring, must be non-zero
    pub fn node_slot(self, server_id: ServerId, virtual_index: usize, num_slots: usize) -> usize {
        let slots = num_slots as u64;
        match self {
            HashMode::Default => {
                let id = u64::from(server_id.0) % slots;
                let offset = (3 * (virtual_index as u64 % slots) + 25) % slots;
                ((id + offset) % slots) as usize
            }
            HashMode::Alternate => {
                let key = format!("{}-{}", server_id, virtual_index);
                (u64::from(md5_prefix(key.as_bytes())) % slots) as usize
            }
        }
    }

    /// Home slot for a request key.
    ///
    /// The default polynomial is evaluated modulo `num_slots` at every step so
    /// it stays exact for any `u64` key.
    pub fn request_slot(self, key: u64, num_slots: usize) -> usize {
        match self {
            HashMode::Default => {
                let slots = num_slots as u128;
                let k = u128::from(key) % slots;
                let square = (k * k) % slots;
                ((k + 2 * square + 17) % slots) as usize
            }
            HashMode::Alternate => {
                let key = key.to_string();
                (u64::from(md5_prefix(key.as_bytes())) % num_slots as u64) as usize
            }
        }
    }

    /// Name reported back to API callers.
    pub fn label(self) -> &'static str {
        match self {
            HashMode::Default => "default",
            HashMode::Alternate => "custom",
        }
    }
}

impl fmt::Display for HashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// First 32 bits of the MD5 digest of `data`, read big-endian.
///
/// This matches taking the first eight hex characters of the digest.
pub fn md5_prefix(data: &[u8]) -> u32 {
    let digest = Md5::digest(data);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}
