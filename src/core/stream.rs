//! Staged save streams
//!
//! Writes to a memory card are all-or-nothing: [`StagedWriteStream`] collects
//! the save in memory, bounded by what the card can hold, and only on commit
//! frames it, wraps it in a package and hands it to the device. Reads go
//! through [`SaveBytes`], a shared view into a package buffer.

use crate::core::backend::SaveWriter;
use crate::core::cache::{SaveCache, SaveRecord};
use crate::core::device::{blocks_for, SaveDevice};
use crate::core::error::{Result, SaveError};
use crate::core::fingerprint;
use crate::core::frame;
use crate::core::package::PackageTemplate;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The save bytes inside a shared package buffer
#[derive(Debug, Clone)]
pub struct SaveBytes {
    package: Arc<[u8]>,
    start: usize,
    end: usize,
}

impl SaveBytes {
    pub fn new(package: Arc<[u8]>, start: usize, len: usize) -> Result<Self> {
        let end = start
            .checked_add(len)
            .filter(|&end| end <= package.len())
            .ok_or_else(|| {
                SaveError::Decode(format!(
                    "save range {}+{} outside a {}-byte package",
                    start,
                    len,
                    package.len()
                ))
            })?;
        Ok(SaveBytes {
            package,
            start,
            end,
        })
    }

    /// View the save described by `record` inside `package`
    pub fn for_record(record: &SaveRecord, package: Arc<[u8]>) -> Result<Self> {
        Self::new(package, record.save_offset(), record.save_len())
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl AsRef<[u8]> for SaveBytes {
    fn as_ref(&self) -> &[u8] {
        &self.package[self.start..self.end]
    }
}

/// What a staged stream produces on commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedTarget {
    /// A framed save known to the cache under its long name
    Save { long_name: String },
    /// A package written under its device name as-is, outside the cache
    Raw,
}

/// Outcome of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub short_name: String,
    /// Encoded package length before block padding
    pub package_len: usize,
}

/// Write stream bounded by the free space of one device
pub struct StagedWriteStream<'a> {
    device: &'a mut dyn SaveDevice,
    cache: &'a mut SaveCache,
    template: &'a PackageTemplate,
    short_name: String,
    target: StagedTarget,
    buffer: Vec<u8>,
    pos: usize,
    capacity: usize,
    overhead: usize,
    available: usize,
    failed: Option<String>,
    finished: bool,
}

impl<'a> StagedWriteStream<'a> {
    /// Open a stream for `short_name`
    ///
    /// `replaced_size` is the space held by the entry being overwritten, if
    /// any; it is reclaimed when the new package lands.
    pub fn new(
        device: &'a mut dyn SaveDevice,
        cache: &'a mut SaveCache,
        template: &'a PackageTemplate,
        short_name: String,
        target: StagedTarget,
        replaced_size: usize,
    ) -> Result<Self> {
        let free = device.free_space_bytes()?;
        let available = (free + replaced_size).min(device.max_entry_bytes());

        let framing = match &target {
            StagedTarget::Save { long_name } => frame::frame_overhead(long_name),
            StagedTarget::Raw => 0,
        };
        let overhead = template.overhead() + framing;

        if available <= overhead {
            return Err(SaveError::CapacityExceeded {
                needed: overhead + 1,
                available,
            });
        }
        let capacity = available - overhead;

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|e| SaveError::Allocation(format!("{} byte save buffer: {}", capacity, e)))?;

        debug!(entry = %short_name, capacity, "staged write opened");

        Ok(StagedWriteStream {
            device,
            cache,
            template,
            short_name,
            target,
            buffer,
            pos: 0,
            capacity,
            overhead,
            available,
            failed: None,
            finished: false,
        })
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Largest save this stream can accept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes staged so far (the highest offset ever written)
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn has_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Package, store and index the staged bytes
    pub fn finish(mut self) -> Result<Committed> {
        self.finished = true;

        if let Some(reason) = self.failed.take() {
            debug!(entry = %self.short_name, "staged write discarded after an earlier failure");
            return Err(SaveError::WriteAborted(reason));
        }

        let staged = std::mem::take(&mut self.buffer);
        let (payload, label) = match &self.target {
            StagedTarget::Save { long_name } => {
                (frame::write_frame(long_name, &staged)?.0, long_name.as_str())
            }
            StagedTarget::Raw => (staged, self.short_name.as_str()),
        };

        let package = self
            .template
            .build(label, &payload, self.device.max_entry_bytes())?;
        let stored = blocks_for(package.len(), self.device.block_size()) * self.device.block_size();
        if stored > self.available {
            return Err(SaveError::CapacityExceeded {
                needed: stored,
                available: self.available,
            });
        }

        self.device.write_entry(&self.short_name, &package, true)?;
        let package_len = package.len();
        info!(entry = %self.short_name, bytes = package_len, "save package written");

        match &self.target {
            StagedTarget::Save { .. } => {
                let record = SaveRecord::from_package(
                    &self.short_name,
                    package,
                    stored,
                    self.cache.retains_packages(),
                )?;
                match fingerprint::compute(&*self.device) {
                    Ok(current) => self.cache.insert_or_replace(record, current),
                    Err(e) => {
                        warn!(entry = %self.short_name, error = %e, "fingerprint refresh failed, dropping cache");
                        self.cache.invalidate();
                        return Err(e);
                    }
                }
            }
            StagedTarget::Raw => {
                // Raw entries sit outside the private namespace, so only the
                // fingerprint moves
                if self.cache.fingerprint().is_some() {
                    match fingerprint::compute(&*self.device) {
                        Ok(current) => self.cache.mark_synced(current),
                        Err(_) => self.cache.invalidate(),
                    }
                }
            }
        }

        Ok(Committed {
            short_name: std::mem::take(&mut self.short_name),
            package_len,
        })
    }

    /// Drop the staged bytes without touching the device
    pub fn discard(mut self) {
        self.finished = true;
        debug!(entry = %self.short_name, bytes = self.buffer.len(), "staged write discarded");
    }

    fn fail(&mut self, err: SaveError) -> io::Error {
        self.failed = Some(err.to_string());
        err.into_io()
    }
}

impl Write for StagedWriteStream<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Some(reason) = &self.failed {
            return Err(SaveError::WriteAborted(reason.clone()).into_io());
        }

        let end = self.pos + data.len();
        if end > self.capacity {
            let err = SaveError::CapacityExceeded {
                needed: end + self.overhead,
                available: self.available,
            };
            return Err(self.fail(err));
        }

        if self.pos > self.buffer.len() {
            self.buffer.resize(self.pos, 0);
        }
        let overlap = (self.buffer.len() - self.pos).min(data.len());
        self.buffer[self.pos..self.pos + overlap].copy_from_slice(&data[..overlap]);
        self.buffer.extend_from_slice(&data[overlap..]);
        self.pos = end;

        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for StagedWriteStream<'_> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let base = match target {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => (self.pos as u64).checked_add_signed(delta),
            SeekFrom::End(delta) => (self.buffer.len() as u64).checked_add_signed(delta),
        };

        match base {
            Some(pos) if pos <= self.capacity as u64 => {
                self.pos = pos as usize;
                Ok(pos)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek outside the {}-byte save buffer", self.capacity),
            )),
        }
    }
}

impl SaveWriter for StagedWriteStream<'_> {
    fn commit(self: Box<Self>) -> Result<()> {
        (*self).finish().map(|_| ())
    }

    fn abort(self: Box<Self>) {
        (*self).discard();
    }
}

impl Drop for StagedWriteStream<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(entry = %self.short_name, "staged write dropped without commit");
        }
    }
}
