//! Device adapter boundary
//!
//! The save cache never talks to hardware directly. A [`SaveDevice`] exposes
//! the handful of primitives the native filesystem offers, and a
//! [`DeviceBus`] resolves a port/unit address to the device plugged in there.

pub mod memory;

use crate::core::error::{Result, SaveError};
use std::fmt;

/// Native block size of the device filesystem
pub const BLOCK_SIZE: usize = 512;

/// A directory entry as reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    /// Size on the device in bytes (whole blocks)
    pub size: usize,
}

/// Primitives offered by the device's native filesystem
///
/// All calls are synchronous and may block for a long time on real hardware.
/// Implementations report an absent or unreadable device as
/// [`SaveError::DeviceUnavailable`].
pub trait SaveDevice {
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    /// Largest single entry the device can hold
    fn max_entry_bytes(&self) -> usize;

    /// List entries whose names start with `prefix`
    fn enumerate_entries(&self, prefix: &str) -> Result<Vec<DirEntry>>;

    /// Directory entry for exactly `name`, if present
    ///
    /// Devices that can look a name up directly should override this; the
    /// default walks the listing.
    fn stat_entry(&self, name: &str) -> Result<Option<DirEntry>> {
        Ok(self
            .enumerate_entries(name)?
            .into_iter()
            .find(|entry| entry.name == name))
    }

    /// Read a whole entry; the result may carry block padding
    fn read_entry(&self, name: &str) -> Result<Vec<u8>>;

    fn write_entry(&mut self, name: &str, bytes: &[u8], overwrite: bool) -> Result<()>;

    /// Delete an entry, returning whether it existed
    fn delete_entry(&mut self, name: &str) -> Result<bool>;

    fn free_space_bytes(&self) -> Result<usize>;

    /// Raw root block of the filesystem
    fn read_root_descriptor(&self) -> Result<Vec<u8>>;

    /// Raw allocation table located through `descriptor`
    fn read_allocation_table(&self, descriptor: &[u8]) -> Result<Vec<u8>>;
}

/// Number of device blocks needed to store `len` bytes
pub fn blocks_for(len: usize, block_size: usize) -> usize {
    len.div_ceil(block_size).max(1)
}

/// Port/unit address of a device on the bus, e.g. `a1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    port: u8,
    unit: u8,
}

impl DeviceAddress {
    pub const PORTS: u8 = 4;
    pub const UNITS: u8 = 6;

    /// Build an address from a port letter (`a`..=`d`) and unit (`0`..=`5`)
    pub fn new(port: char, unit: u8) -> Result<Self> {
        let port = port.to_ascii_lowercase();
        if !('a'..='d').contains(&port) || unit >= Self::UNITS {
            return Err(SaveError::DeviceUnavailable(format!(
                "invalid device address {}{}",
                port, unit
            )));
        }
        Ok(DeviceAddress {
            port: port as u8 - b'a',
            unit,
        })
    }

    /// Parse the address part of a device path, such as `/a1` or `/B0/`
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = || SaveError::DeviceUnavailable(format!("invalid device path {:?}", path));

        let rest = path.strip_prefix('/').ok_or_else(invalid)?;
        let rest = rest.trim_end_matches('/');
        let mut chars = rest.chars();
        let (port, unit) = match (chars.next(), chars.next(), chars.next()) {
            (Some(port), Some(unit), None) => (port, unit),
            _ => return Err(invalid()),
        };
        let unit = unit.to_digit(10).ok_or_else(invalid)? as u8;

        Self::new(port, unit).map_err(|_| invalid())
    }

    pub fn port(&self) -> char {
        (b'a' + self.port) as char
    }

    pub fn unit(&self) -> u8 {
        self.unit
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.port(), self.unit)
    }
}

/// Resolves addresses to attached devices
pub trait DeviceBus {
    fn device(&mut self, addr: DeviceAddress) -> Option<&mut dyn SaveDevice>;
}
