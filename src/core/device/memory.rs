//! In-memory memory card
//!
//! Simulates the card filesystem closely enough to exercise the cache: a
//! root block, a single-block allocation table of 16-bit chain entries, a
//! fixed-size directory, and 512-byte data blocks allocated from the top of
//! the user area down. Every primitive bumps a counter so tests can check
//! exactly which device reads an operation performed.
//!
//! ```text
//! block 255      root block
//! block 254      allocation table (256 x u16)
//! blocks 241-253 directory
//! blocks 0..N    user data (N = 200 on a stock card)
//! ```

use super::{blocks_for, DeviceAddress, DeviceBus, DirEntry, SaveDevice, BLOCK_SIZE};
use crate::core::error::{Result, SaveError};
use crate::core::naming::MAX_DEVICE_NAME;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

pub const TOTAL_BLOCKS: usize = 256;
pub const ROOT_BLOCK: u16 = 255;
pub const FAT_BLOCK: u16 = 254;
pub const DIR_BLOCK: u16 = 253;
pub const DIR_BLOCKS: u16 = 13;
pub const DEFAULT_USER_BLOCKS: usize = 200;

/// Allocation table marker for a free block
pub const FAT_FREE: u16 = 0xFFFC;
/// Allocation table marker for the last block of a chain
pub const FAT_END: u16 = 0xFFFA;

const ENTRIES_PER_DIR_BLOCK: usize = 16;
const FORMAT_MARKER: u8 = 0x55;

/// Snapshot of the per-primitive I/O counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub enumerations: u64,
    pub lookups: u64,
    pub entry_reads: u64,
    pub writes: u64,
    pub deletes: u64,
    pub root_reads: u64,
    pub fat_reads: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enumerations: AtomicU64,
    lookups: AtomicU64,
    entry_reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    root_reads: AtomicU64,
    fat_reads: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DeviceStats {
        DeviceStats {
            enumerations: self.enumerations.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            entry_reads: self.entry_reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            root_reads: self.root_reads.load(Ordering::Relaxed),
            fat_reads: self.fat_reads.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
struct DirSlot {
    first_block: u16,
    block_count: usize,
}

/// A simulated memory card held entirely in RAM
#[derive(Debug)]
pub struct MemoryDevice {
    serial: u64,
    user_blocks: usize,
    fat: Vec<u16>,
    blocks: Vec<[u8; BLOCK_SIZE]>,
    directory: BTreeMap<String, DirSlot>,
    present: bool,
    counters: Counters,
}

impl MemoryDevice {
    /// A freshly formatted card with the stock user area
    pub fn new(serial: u64) -> Self {
        Self::with_user_blocks(serial, DEFAULT_USER_BLOCKS)
    }

    /// A freshly formatted card with `user_blocks` data blocks
    pub fn with_user_blocks(serial: u64, user_blocks: usize) -> Self {
        let dir_first = (DIR_BLOCK + 1 - DIR_BLOCKS) as usize;
        let user_blocks = user_blocks.clamp(1, dir_first);

        let mut fat = vec![FAT_FREE; TOTAL_BLOCKS];
        fat[ROOT_BLOCK as usize] = FAT_END;
        fat[FAT_BLOCK as usize] = FAT_END;
        for block in (dir_first + 1..=DIR_BLOCK as usize).rev() {
            fat[block] = (block - 1) as u16;
        }
        fat[dir_first] = FAT_END;

        MemoryDevice {
            serial,
            user_blocks,
            fat,
            blocks: vec![[0u8; BLOCK_SIZE]; user_blocks],
            directory: BTreeMap::new(),
            present: true,
            counters: Counters::default(),
        }
    }

    /// Simulate pulling the card out of its slot
    pub fn unplug(&mut self) {
        self.present = false;
    }

    pub fn plug(&mut self) {
        self.present = true;
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn stats(&self) -> DeviceStats {
        self.counters.snapshot()
    }

    pub fn reset_stats(&mut self) {
        self.counters = Counters::default();
    }

    /// Names of all entries, regardless of prefix
    pub fn entry_names(&self) -> Vec<String> {
        self.directory.keys().cloned().collect()
    }

    pub fn free_blocks(&self) -> usize {
        self.fat[..self.user_blocks]
            .iter()
            .filter(|&&entry| entry == FAT_FREE)
            .count()
    }

    fn ensure_present(&self) -> Result<()> {
        if self.present {
            Ok(())
        } else {
            Err(SaveError::DeviceUnavailable(format!(
                "memory card {:016x} is not inserted",
                self.serial
            )))
        }
    }

    fn chain(&self, slot: &DirSlot) -> Vec<u16> {
        let mut chain = Vec::with_capacity(slot.block_count);
        let mut block = slot.first_block;
        while chain.len() < slot.block_count && (block as usize) < self.user_blocks {
            chain.push(block);
            block = self.fat[block as usize];
        }
        chain
    }

    fn release(&mut self, slot: &DirSlot) {
        for block in self.chain(slot) {
            self.fat[block as usize] = FAT_FREE;
        }
    }

    fn root_block(&self) -> [u8; BLOCK_SIZE] {
        let mut root = [0u8; BLOCK_SIZE];
        root[..0x10].fill(FORMAT_MARKER);
        root[0x10..0x18].copy_from_slice(&self.serial.to_le_bytes());
        root[0x46..0x48].copy_from_slice(&FAT_BLOCK.to_le_bytes());
        root[0x48..0x4A].copy_from_slice(&1u16.to_le_bytes());
        root[0x4A..0x4C].copy_from_slice(&DIR_BLOCK.to_le_bytes());
        root[0x4C..0x4E].copy_from_slice(&DIR_BLOCKS.to_le_bytes());
        root[0x50..0x52].copy_from_slice(&(self.user_blocks as u16).to_le_bytes());
        root
    }
}

impl SaveDevice for MemoryDevice {
    fn max_entry_bytes(&self) -> usize {
        self.user_blocks * BLOCK_SIZE
    }

    fn enumerate_entries(&self, prefix: &str) -> Result<Vec<DirEntry>> {
        self.ensure_present()?;
        Counters::bump(&self.counters.enumerations);

        Ok(self
            .directory
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, slot)| DirEntry {
                name: name.clone(),
                size: slot.block_count * BLOCK_SIZE,
            })
            .collect())
    }

    fn stat_entry(&self, name: &str) -> Result<Option<DirEntry>> {
        self.ensure_present()?;
        Counters::bump(&self.counters.lookups);

        Ok(self.directory.get(name).map(|slot| DirEntry {
            name: name.to_string(),
            size: slot.block_count * BLOCK_SIZE,
        }))
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        self.ensure_present()?;
        Counters::bump(&self.counters.entry_reads);

        let slot = self
            .directory
            .get(name)
            .ok_or_else(|| SaveError::NotFound(name.to_string()))?;

        let mut bytes = Vec::with_capacity(slot.block_count * BLOCK_SIZE);
        for block in self.chain(slot) {
            bytes.extend_from_slice(&self.blocks[block as usize]);
        }
        Ok(bytes)
    }

    fn write_entry(&mut self, name: &str, bytes: &[u8], overwrite: bool) -> Result<()> {
        self.ensure_present()?;
        Counters::bump(&self.counters.writes);

        if name.is_empty() || name.len() > MAX_DEVICE_NAME || !name.is_ascii() {
            return Err(SaveError::InvalidName(format!(
                "device names must be 1..={} ASCII characters, got {:?}",
                MAX_DEVICE_NAME, name
            )));
        }

        let existing = self.directory.get(name).cloned();
        if existing.is_some() && !overwrite {
            return Err(SaveError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", name),
            )));
        }
        let dir_capacity = DIR_BLOCKS as usize * ENTRIES_PER_DIR_BLOCK;
        if existing.is_none() && self.directory.len() >= dir_capacity {
            return Err(SaveError::CapacityExceeded {
                needed: 1,
                available: 0,
            });
        }

        let needed = blocks_for(bytes.len(), BLOCK_SIZE);
        let reclaimable = existing.as_ref().map_or(0, |slot| slot.block_count);
        let available = self.free_blocks() + reclaimable;
        if needed > available {
            return Err(SaveError::CapacityExceeded {
                needed: needed * BLOCK_SIZE,
                available: available * BLOCK_SIZE,
            });
        }

        if let Some(slot) = existing {
            self.release(&slot);
        }

        // Highest free blocks first
        let chain: Vec<u16> = (0..self.user_blocks)
            .rev()
            .filter(|&block| self.fat[block] == FAT_FREE)
            .take(needed)
            .map(|block| block as u16)
            .collect();

        for (i, &block) in chain.iter().enumerate() {
            self.fat[block as usize] = chain.get(i + 1).copied().unwrap_or(FAT_END);

            let start = i * BLOCK_SIZE;
            let end = (start + BLOCK_SIZE).min(bytes.len());
            let data = &mut self.blocks[block as usize];
            data.fill(0);
            if start < end {
                data[..end - start].copy_from_slice(&bytes[start..end]);
            }
        }

        self.directory.insert(
            name.to_string(),
            DirSlot {
                first_block: chain[0],
                block_count: needed,
            },
        );
        Ok(())
    }

    fn delete_entry(&mut self, name: &str) -> Result<bool> {
        self.ensure_present()?;
        Counters::bump(&self.counters.deletes);

        match self.directory.remove(name) {
            Some(slot) => {
                self.release(&slot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn free_space_bytes(&self) -> Result<usize> {
        self.ensure_present()?;
        Ok(self.free_blocks() * BLOCK_SIZE)
    }

    fn read_root_descriptor(&self) -> Result<Vec<u8>> {
        self.ensure_present()?;
        Counters::bump(&self.counters.root_reads);
        Ok(self.root_block().to_vec())
    }

    fn read_allocation_table(&self, descriptor: &[u8]) -> Result<Vec<u8>> {
        self.ensure_present()?;
        Counters::bump(&self.counters.fat_reads);

        if descriptor.len() < 0x52 || descriptor[..0x10].iter().any(|&b| b != FORMAT_MARKER) {
            return Err(SaveError::DeviceUnavailable(
                "memory card is not formatted".to_string(),
            ));
        }
        let location = u16::from_le_bytes([descriptor[0x46], descriptor[0x47]]);
        let size = u16::from_le_bytes([descriptor[0x48], descriptor[0x49]]);
        if location != FAT_BLOCK || size != 1 {
            return Err(SaveError::Decode(format!(
                "unsupported allocation table: block {} x {}",
                location, size
            )));
        }

        let mut table = Vec::with_capacity(TOTAL_BLOCKS * 2);
        for entry in &self.fat {
            table.extend_from_slice(&entry.to_le_bytes());
        }
        Ok(table)
    }
}

/// A bus of simulated memory cards that can be swapped at will
#[derive(Debug, Default)]
pub struct MemoryBus {
    devices: HashMap<DeviceAddress, MemoryDevice>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, addr: DeviceAddress, device: MemoryDevice) -> Self {
        self.devices.insert(addr, device);
        self
    }

    /// Insert a card, returning whatever was in the slot before
    pub fn insert(&mut self, addr: DeviceAddress, device: MemoryDevice) -> Option<MemoryDevice> {
        self.devices.insert(addr, device)
    }

    pub fn eject(&mut self, addr: DeviceAddress) -> Option<MemoryDevice> {
        self.devices.remove(&addr)
    }

    pub fn get(&self, addr: DeviceAddress) -> Option<&MemoryDevice> {
        self.devices.get(&addr)
    }

    pub fn get_mut(&mut self, addr: DeviceAddress) -> Option<&mut MemoryDevice> {
        self.devices.get_mut(&addr)
    }
}

impl DeviceBus for MemoryBus {
    fn device(&mut self, addr: DeviceAddress) -> Option<&mut dyn SaveDevice> {
        self.devices
            .get_mut(&addr)
            .map(|device| device as &mut dyn SaveDevice)
    }
}
