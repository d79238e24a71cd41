//! Save file manager facade
//!
//! Routes every call by the current save path: memory card paths go to the
//! [`DeviceBackend`], everything else to the generic backend.

use crate::core::backend::{DeviceBackend, DirectoryBackend, SaveBackend, SaveReader, SaveWriter};
use crate::core::compression::{self, CompressedWriter};
use crate::core::config::SaveConfig;
use crate::core::device::DeviceBus;
use crate::core::error::{Result, SaveError};
use std::io::{Read, Write};
use tracing::debug;

pub struct SaveFileManager<B: DeviceBus, G: SaveBackend = DirectoryBackend> {
    save_path: String,
    device: DeviceBackend<B>,
    generic: G,
}

impl<B: DeviceBus, G: SaveBackend> SaveFileManager<B, G> {
    pub fn new(config: SaveConfig, save_path: &str, bus: B, generic: G) -> Result<Self> {
        Ok(SaveFileManager {
            save_path: save_path.to_string(),
            device: DeviceBackend::new(config, bus)?,
            generic,
        })
    }

    pub fn config(&self) -> &SaveConfig {
        self.device.config()
    }

    pub fn save_path(&self) -> &str {
        &self.save_path
    }

    pub fn set_save_path(&mut self, save_path: &str) {
        debug!(save_path, "save path changed");
        self.save_path = save_path.to_string();
    }

    /// Whether the current save path addresses a memory card
    pub fn is_device_path(&self) -> bool {
        self.device.config().device_path(&self.save_path).is_some()
    }

    pub fn device_backend(&self) -> &DeviceBackend<B> {
        &self.device
    }

    pub fn device_backend_mut(&mut self) -> &mut DeviceBackend<B> {
        &mut self.device
    }

    pub fn generic_backend(&self) -> &G {
        &self.generic
    }

    pub fn bus(&self) -> &B {
        self.device.bus()
    }

    pub fn bus_mut(&mut self) -> &mut B {
        self.device.bus_mut()
    }

    fn route(&mut self) -> (&mut dyn SaveBackend, &str) {
        let backend: &mut dyn SaveBackend = if self.is_device_path() {
            &mut self.device
        } else {
            &mut self.generic
        };
        (backend, &self.save_path)
    }

    /// Save names matching `pattern`
    pub fn list(&mut self, pattern: &str) -> Result<Vec<String>> {
        let (backend, path) = self.route();
        backend.list(path, pattern)
    }

    /// Open a save exactly as stored, without decompression
    pub fn open_raw(&mut self, name: &str) -> Result<SaveReader> {
        let (backend, path) = self.route();
        backend.open_for_read(path, name)
    }

    /// Open a save, decompressing it if it was written compressed
    pub fn open_for_read(&mut self, name: &str) -> Result<Box<dyn Read + Send>> {
        compression::decompressing(self.open_raw(name)?)
    }

    /// Open a save for writing, compressing according to the configuration
    pub fn open_for_write(&mut self, name: &str) -> Result<Box<dyn SaveWriter + '_>> {
        let compress = self.config().compress;
        self.open_for_write_with(name, compress)
    }

    pub fn open_for_write_with(
        &mut self,
        name: &str,
        compress: bool,
    ) -> Result<Box<dyn SaveWriter + '_>> {
        let (backend, path) = self.route();
        let writer = backend.open_for_write(path, name)?;
        if compress {
            Ok(Box::new(CompressedWriter::new(writer)))
        } else {
            Ok(writer)
        }
    }

    /// Remove a save; `Ok(false)` means the storage refused the delete
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let (backend, path) = self.route();
        backend.remove(path, name)
    }

    /// Write a whole save in one call
    pub fn save(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let mut writer = self.open_for_write(name)?;
        if let Err(e) = writer.write_all(data) {
            writer.abort();
            return Err(SaveError::from_io(e));
        }
        writer.commit()
    }

    /// Read a whole save, decompressed
    pub fn load(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut reader = self.open_for_read(name)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(SaveError::from_io)?;
        Ok(data)
    }
}
