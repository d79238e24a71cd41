//! Cheap change detection for a whole device
//!
//! Scanning every entry on a memory card takes seconds. The root block and the
//! allocation table together are a single kilobyte, and any write, delete or
//! card swap changes at least one of them, so a digest over that pair stands in
//! for a full directory scan.

use crate::core::device::SaveDevice;
use crate::core::error::{Result, SaveError};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 over the device root block followed by its allocation table
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_metadata(root: &[u8], allocation_table: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(root);
        hasher.update(allocation_table);
        Fingerprint(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell cards apart in logs
        write!(f, "Fingerprint({}..)", hex::encode(&self.0[..4]))
    }
}

/// Read the device metadata blocks and digest them
///
/// Any failure to read the metadata means the device cannot be trusted for
/// this operation and is reported as [`SaveError::DeviceUnavailable`].
pub fn compute(device: &dyn SaveDevice) -> Result<Fingerprint> {
    let root = device.read_root_descriptor().map_err(unavailable)?;
    let table = device.read_allocation_table(&root).map_err(unavailable)?;
    Ok(Fingerprint::from_metadata(&root, &table))
}

fn unavailable(err: SaveError) -> SaveError {
    match err {
        SaveError::DeviceUnavailable(_) => err,
        other => SaveError::DeviceUnavailable(format!("could not read device metadata: {}", other)),
    }
}
