//! # vmu-saves - Save Cache for Block-Organized Memory Cards
//!
//! `vmu-saves` stores arbitrary named saves on small memory cards whose native
//! filesystem only offers twelve-character names and whole-block allocation.
//!
//! - **Package codec** for the card's fixed header, icon and eye-catch layout
//! - **Long names** carried inside each package, with private short names on the card
//! - **Fingerprinted cache**: a one-kilobyte metadata read decides whether to rescan
//! - **Staged writes** that reach the card only on commit, bounded by its free space
//! - **Transparent LZ4** compression and a host directory backend for other paths
//!
//! ## Quick Start
//!
//! ```rust
//! use vmu_saves::{DeviceAddress, MemoryBus, MemoryDevice, Result, SaveManagerBuilder};
//!
//! # fn main() -> Result<()> {
//! let a1 = DeviceAddress::new('a', 1)?;
//! let bus = MemoryBus::new().with_device(a1, MemoryDevice::new(1));
//!
//! let mut saves = SaveManagerBuilder::new()
//!     .device_bus(bus)
//!     .save_path("/vmu/a1")
//!     .build()?;
//!
//! saves.save("monkey.s01", b"grog")?;
//! assert_eq!(saves.load("MONKEY.S01")?, b"grog");
//! assert_eq!(saves.list("monkey.*")?, vec!["monkey.s01".to_string()]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Streaming
//!
//! ```rust
//! use std::io::{Read, Write};
//! use vmu_saves::{DeviceAddress, MemoryBus, MemoryDevice, Result, SaveManagerBuilder};
//!
//! # fn main() -> Result<()> {
//! let a1 = DeviceAddress::new('a', 1)?;
//! let mut saves = SaveManagerBuilder::new()
//!     .device_bus(MemoryBus::new().with_device(a1, MemoryDevice::new(1)))
//!     .save_path("/vmu/a1")
//!     .compress(false)
//!     .build()?;
//!
//! let mut writer = saves.open_for_write("loom.s01")?;
//! writer.write_all(b"draft ")?;
//! writer.write_all(b"of the weave")?;
//! writer.commit()?;
//!
//! let mut text = String::new();
//! saves.open_for_read("loom.s01")?.read_to_string(&mut text)?;
//! assert_eq!(text, "draft of the weave");
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    backend::{
        DeviceBackend, DirectoryBackend, ReadSeek, SaveBackend, SaveReader, SaveWriter,
    },
    cache::{Reconciled, SaveCache, SaveRecord},
    config::SaveConfig,
    device::{
        memory::{DeviceStats, MemoryBus, MemoryDevice},
        DeviceAddress, DeviceBus, DirEntry, SaveDevice, BLOCK_SIZE,
    },
    error::{Result, SaveError},
    fingerprint::Fingerprint,
    manager::SaveFileManager,
    package::{EyecatchType, Package, PackageHeader, PackageTemplate},
    pattern::PatternMatcher,
    stream::{Committed, SaveBytes, StagedTarget, StagedWriteStream},
};

use std::path::Path;
use tracing::info;

/// Builder for [`SaveFileManager`]
///
/// # Examples
///
/// ```rust,no_run
/// use vmu_saves::{MemoryBus, SaveManagerBuilder};
///
/// # fn main() -> vmu_saves::Result<()> {
/// let saves = SaveManagerBuilder::new()
///     .config_file("saves.toml")?
///     .device_bus(MemoryBus::new())
///     .save_path("/home/player/.saves")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SaveManagerBuilder<B: DeviceBus, G: SaveBackend = DirectoryBackend> {
    config: SaveConfig,
    save_path: Option<String>,
    bus: Option<B>,
    generic: G,
}

impl<B: DeviceBus> SaveManagerBuilder<B> {
    /// Create a builder with the default configuration and a directory backend
    pub fn new() -> Self {
        SaveManagerBuilder {
            config: SaveConfig::default(),
            save_path: None,
            bus: None,
            generic: DirectoryBackend::new(),
        }
    }
}

impl<B: DeviceBus> Default for SaveManagerBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: DeviceBus, G: SaveBackend> SaveManagerBuilder<B, G> {
    /// Replace the whole configuration
    pub fn config(mut self, config: SaveConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a TOML file
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.config = SaveConfig::from_file(path)?;
        Ok(self)
    }

    /// Initial save path (defaults to the first port of the device root)
    pub fn save_path<S: Into<String>>(mut self, save_path: S) -> Self {
        self.save_path = Some(save_path.into());
        self
    }

    /// Bus that resolves memory card addresses
    pub fn device_bus(mut self, bus: B) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Backend for save paths outside the device root
    pub fn generic_backend<G2: SaveBackend>(self, generic: G2) -> SaveManagerBuilder<B, G2> {
        SaveManagerBuilder {
            config: self.config,
            save_path: self.save_path,
            bus: self.bus,
            generic,
        }
    }

    /// Make short name generation reproducible
    pub fn name_seed(mut self, seed: u64) -> Self {
        self.config.name_seed = Some(seed);
        self
    }

    pub fn retain_packages(mut self, retain: bool) -> Self {
        self.config.retain_packages = retain;
        self
    }

    /// Default compression for [`SaveFileManager::open_for_write`]
    pub fn compress(mut self, compress: bool) -> Self {
        self.config.compress = compress;
        self
    }

    /// Build the manager
    pub fn build(self) -> Result<SaveFileManager<B, G>> {
        let bus = self
            .bus
            .ok_or_else(|| SaveError::Config("device bus must be set".to_string()))?;
        let save_path = self
            .save_path
            .unwrap_or_else(|| format!("{}/a1", self.config.device_root));

        info!(
            save_path = %save_path,
            prefix = %self.config.short_name_prefix,
            "building save manager"
        );

        SaveFileManager::new(self.config, &save_path, bus, self.generic)
    }
}
