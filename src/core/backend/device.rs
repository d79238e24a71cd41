//! Memory card backend
//!
//! Serves save paths of the form `<device_root>/<port><unit>`. Every entry
//! point reconciles the cache with the addressed card before touching it, so
//! a card swapped behind our back is rescanned exactly once.

use super::{SaveBackend, SaveReader, SaveWriter};
use crate::core::cache::{SaveCache, SaveRecord};
use crate::core::config::SaveConfig;
use crate::core::device::{DeviceAddress, DeviceBus, SaveDevice};
use crate::core::error::{Result, SaveError};
use crate::core::fingerprint;
use crate::core::frame;
use crate::core::naming::ShortNameGenerator;
use crate::core::package::{self, PackageTemplate};
use crate::core::stream::{SaveBytes, StagedTarget, StagedWriteStream};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DeviceBackend<B: DeviceBus> {
    config: SaveConfig,
    bus: B,
    cache: SaveCache,
    names: ShortNameGenerator,
    template: PackageTemplate,
}

/// Resolve `addr` on the bus and bring the cache up to date with it
fn attach<'b, B: DeviceBus>(
    bus: &'b mut B,
    cache: &mut SaveCache,
    addr: DeviceAddress,
) -> Result<&'b mut dyn SaveDevice> {
    let device = bus
        .device(addr)
        .ok_or_else(|| SaveError::DeviceUnavailable(format!("no memory card at {}", addr)))?;
    cache.reconcile(&*device)?;
    Ok(device)
}

impl<B: DeviceBus> DeviceBackend<B> {
    pub fn new(config: SaveConfig, bus: B) -> Result<Self> {
        config.validate()?;
        let names = ShortNameGenerator::new(
            &config.short_name_prefix,
            config.name_seed,
            config.max_name_attempts,
        )?;
        let cache = SaveCache::new(&config.short_name_prefix, config.retain_packages);
        let template = PackageTemplate::from_config(&config);

        Ok(DeviceBackend {
            config,
            bus,
            cache,
            names,
            template,
        })
    }

    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Direct access to the bus, for swapping or ejecting cards
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn cache(&self) -> &SaveCache {
        &self.cache
    }

    pub fn template(&self) -> &PackageTemplate {
        &self.template
    }

    /// Replace the header fields and media stamped on new packages
    pub fn set_template(&mut self, template: PackageTemplate) {
        self.template = template;
    }

    fn address(&self, save_path: &str) -> Result<DeviceAddress> {
        let rest = self.config.device_path(save_path).ok_or_else(|| {
            SaveError::DeviceUnavailable(format!("{} is not a memory card path", save_path))
        })?;
        DeviceAddress::parse(rest)
    }

    /// Write a package under a plain device name, outside the save namespace
    ///
    /// Used for shared configuration entries that other tools read by name.
    pub fn write_raw_entry(&mut self, save_path: &str, entry: &str) -> Result<StagedWriteStream<'_>> {
        if entry.starts_with(self.cache.prefix()) {
            return Err(SaveError::InvalidName(format!(
                "{} is inside the private save namespace",
                entry
            )));
        }
        let addr = self.address(save_path)?;
        let device = attach(&mut self.bus, &mut self.cache, addr)?;

        let replaced = device.stat_entry(entry)?.map_or(0, |existing| existing.size);

        StagedWriteStream::new(
            device,
            &mut self.cache,
            &self.template,
            entry.to_string(),
            StagedTarget::Raw,
            replaced,
        )
    }

    /// Payload of a package stored under a plain device name
    pub fn read_raw_entry(&mut self, save_path: &str, entry: &str) -> Result<Vec<u8>> {
        let addr = self.address(save_path)?;
        let device = attach(&mut self.bus, &mut self.cache, addr)?;
        let bytes = device.read_entry(entry)?;
        let parsed = package::parse(&bytes)?;
        Ok(parsed.payload.to_vec())
    }

    /// Staged stream for `name` on the card at `save_path`
    pub fn open_staged(&mut self, save_path: &str, name: &str) -> Result<StagedWriteStream<'_>> {
        frame::validate_long_name(name)?;
        let addr = self.address(save_path)?;
        let device = attach(&mut self.bus, &mut self.cache, addr)?;

        let (short_name, replaced) = match self.cache.lookup(name) {
            Some(record) => (record.short_name().to_string(), record.package_size()),
            None => {
                let cache = &self.cache;
                let short = self.names.generate(|candidate| cache.is_short_name_taken(candidate))?;
                (short, 0)
            }
        };
        debug!(long_name = name, entry = %short_name, replaced, "opening save for write");

        StagedWriteStream::new(
            device,
            &mut self.cache,
            &self.template,
            short_name,
            StagedTarget::Save {
                long_name: name.to_string(),
            },
            replaced,
        )
    }
}

/// Re-read a record whose package the cache did not keep
fn reload(device: &dyn SaveDevice, record: &SaveRecord) -> Result<SaveBytes> {
    let bytes = device.read_entry(record.short_name())?;
    let fresh = SaveRecord::from_package(record.short_name(), bytes, record.package_size(), true)?;
    if !fresh.long_name().eq_ignore_ascii_case(record.long_name()) {
        return Err(SaveError::Decode(format!(
            "{} no longer holds {}",
            record.short_name(),
            record.long_name()
        )));
    }
    let package = fresh
        .package()
        .cloned()
        .ok_or_else(|| SaveError::Decode("package was not retained".to_string()))?;
    SaveBytes::for_record(&fresh, package)
}

impl<B: DeviceBus> SaveBackend for DeviceBackend<B> {
    fn list(&mut self, save_path: &str, pattern: &str) -> Result<Vec<String>> {
        let addr = self.address(save_path)?;
        attach(&mut self.bus, &mut self.cache, addr)?;
        Ok(self.cache.list(pattern))
    }

    fn open_for_read(&mut self, save_path: &str, name: &str) -> Result<SaveReader> {
        let addr = self.address(save_path)?;
        let device = attach(&mut self.bus, &mut self.cache, addr)?;

        let record = self
            .cache
            .lookup(name)
            .ok_or_else(|| SaveError::NotFound(name.to_string()))?;

        let view = match record.package() {
            Some(package) => SaveBytes::for_record(record, Arc::clone(package))?,
            None => reload(&*device, record)?,
        };
        Ok(Box::new(Cursor::new(view)))
    }

    fn open_for_write<'a>(
        &'a mut self,
        save_path: &str,
        name: &str,
    ) -> Result<Box<dyn SaveWriter + 'a>> {
        let stream = self.open_staged(save_path, name)?;
        Ok(Box::new(stream))
    }

    fn remove(&mut self, save_path: &str, name: &str) -> Result<bool> {
        let addr = self.address(save_path)?;
        let device = attach(&mut self.bus, &mut self.cache, addr)?;

        let short_names = self
            .cache
            .remove(name)
            .ok_or_else(|| SaveError::NotFound(name.to_string()))?;

        let mut deleted = false;
        for (i, short_name) in short_names.iter().enumerate() {
            let existed = match device.delete_entry(short_name) {
                Ok(existed) => existed,
                Err(e) => {
                    self.cache.invalidate();
                    return Err(e);
                }
            };
            if i == 0 {
                deleted = existed;
            } else {
                debug!(long_name = name, entry = %short_name, "removed duplicate entry");
            }
            if !existed {
                warn!(long_name = name, entry = %short_name, "device entry vanished before delete");
            }
        }

        match fingerprint::compute(&*device) {
            Ok(current) => self.cache.mark_synced(current),
            Err(_) => self.cache.invalidate(),
        }
        Ok(deleted)
    }
}
