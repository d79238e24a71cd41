//! Long-name index over the save packages on one device
//!
//! The cache maps caller-visible long names to the short device entries that
//! hold them. Its contents always belong to exactly one device fingerprint:
//! [`SaveCache::reconcile`] compares the live fingerprint with the cached one
//! and rescans only when they differ.

use crate::core::device::SaveDevice;
use crate::core::error::{Result, SaveError};
use crate::core::fingerprint::{self, Fingerprint};
use crate::core::frame;
use crate::core::package;
use crate::core::pattern::PatternMatcher;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a save lives on the device and, optionally, its package bytes
#[derive(Debug, Clone)]
pub struct SaveRecord {
    long_name: String,
    short_name: String,
    /// Offset of the save bytes from the start of the package
    save_offset: usize,
    save_len: usize,
    /// Space the package occupies on the device, in whole blocks
    package_size: usize,
    package: Option<Arc<[u8]>>,
}

impl SaveRecord {
    /// Decode a framed save package read from (or written to) `short_name`
    pub fn from_package(
        short_name: &str,
        bytes: Vec<u8>,
        package_size: usize,
        retain: bool,
    ) -> Result<Self> {
        let parsed = package::parse(&bytes)?;
        let framed = frame::read_frame(parsed.payload)?;

        let record = SaveRecord {
            long_name: framed.long_name,
            short_name: short_name.to_string(),
            save_offset: parsed.payload_offset() + framed.save_offset,
            save_len: framed.save.len(),
            package_size,
            package: None,
        };

        Ok(if retain {
            SaveRecord {
                package: Some(Arc::from(bytes)),
                ..record
            }
        } else {
            record
        })
    }

    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn save_offset(&self) -> usize {
        self.save_offset
    }

    pub fn save_len(&self) -> usize {
        self.save_len
    }

    pub fn package_size(&self) -> usize {
        self.package_size
    }

    /// Retained package bytes, if the cache keeps them
    pub fn package(&self) -> Option<&Arc<[u8]>> {
        self.package.as_ref()
    }

    /// The save bytes inside the retained package
    pub fn save_bytes(&self) -> Option<&[u8]> {
        self.package
            .as_deref()
            .map(|bytes| &bytes[self.save_offset..self.save_offset + self.save_len])
    }
}

/// Result of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Fingerprint matched; nothing was read beyond the metadata blocks
    Unchanged,
    /// The directory was rescanned
    Rescanned { records: usize, skipped: usize },
}

/// Case-insensitive long name → [`SaveRecord`] map tied to a fingerprint
#[derive(Debug)]
pub struct SaveCache {
    records: HashMap<String, SaveRecord>,
    /// Every private short name seen on the device, decodable or not
    occupied: HashSet<String>,
    /// Older entries holding the same long name as a live record
    shadowed: HashMap<String, Vec<String>>,
    fingerprint: Option<Fingerprint>,
    prefix: String,
    retain_packages: bool,
}

fn cache_key(long_name: &str) -> String {
    long_name.to_ascii_lowercase()
}

impl SaveCache {
    pub fn new(prefix: &str, retain_packages: bool) -> Self {
        SaveCache {
            records: HashMap::new(),
            occupied: HashSet::new(),
            shadowed: HashMap::new(),
            fingerprint: None,
            prefix: prefix.to_string(),
            retain_packages,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn retains_packages(&self) -> bool {
        self.retain_packages
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &SaveRecord> {
        self.records.values()
    }

    /// Bring the cache in line with `device`
    ///
    /// On failure the previous contents and fingerprint are kept.
    pub fn reconcile(&mut self, device: &dyn SaveDevice) -> Result<Reconciled> {
        let current = fingerprint::compute(device)?;
        if self.fingerprint == Some(current) {
            return Ok(Reconciled::Unchanged);
        }

        info!(fingerprint = %current, "device changed, rescanning saves");

        let entries = device.enumerate_entries(&self.prefix).map_err(|e| match e {
            SaveError::DeviceUnavailable(_) => e,
            other => SaveError::DeviceUnavailable(format!("could not list device: {}", other)),
        })?;

        let mut records = HashMap::with_capacity(entries.len());
        let mut occupied = HashSet::with_capacity(entries.len());
        let mut shadowed: HashMap<String, Vec<String>> = HashMap::new();
        let mut skipped = 0;

        for entry in entries {
            if !entry.name.starts_with(&self.prefix) {
                continue;
            }
            occupied.insert(entry.name.clone());

            let loaded = device.read_entry(&entry.name).and_then(|bytes| {
                SaveRecord::from_package(&entry.name, bytes, entry.size, self.retain_packages)
            });

            match loaded {
                Ok(record) => {
                    let key = cache_key(record.long_name());
                    if let Some(previous) = records.insert(key.clone(), record) {
                        warn!(
                            long_name = previous.long_name(),
                            entry = previous.short_name(),
                            "duplicate long name on device, keeping the later entry"
                        );
                        shadowed.entry(key).or_default().push(previous.short_name);
                    }
                }
                Err(SaveError::DeviceUnavailable(reason)) => {
                    return Err(SaveError::DeviceUnavailable(reason));
                }
                Err(e) => {
                    warn!(entry = %entry.name, error = %e, "skipping unreadable save entry");
                    skipped += 1;
                }
            }
        }

        let count = records.len();
        self.records = records;
        self.occupied = occupied;
        self.shadowed = shadowed;
        self.fingerprint = Some(current);

        debug!(records = count, skipped, "save cache rebuilt");
        Ok(Reconciled::Rescanned {
            records: count,
            skipped,
        })
    }

    pub fn lookup(&self, long_name: &str) -> Option<&SaveRecord> {
        self.records.get(&cache_key(long_name))
    }

    /// Record a freshly written save along with the post-write fingerprint
    pub fn insert_or_replace(&mut self, record: SaveRecord, fingerprint: Fingerprint) {
        self.occupied.insert(record.short_name.clone());
        self.records.insert(cache_key(record.long_name()), record);
        self.fingerprint = Some(fingerprint);
    }

    /// Forget a save, returning every short name that holds it
    ///
    /// The live entry comes first, followed by any older duplicates found in
    /// the last scan. The caller deletes all of them and then either calls
    /// [`SaveCache::mark_synced`] with the new fingerprint or
    /// [`SaveCache::invalidate`].
    pub fn remove(&mut self, long_name: &str) -> Option<Vec<String>> {
        let key = cache_key(long_name);
        let record = self.records.remove(&key)?;

        let mut short_names = vec![record.short_name];
        short_names.extend(self.shadowed.remove(&key).unwrap_or_default());
        for short_name in &short_names {
            self.occupied.remove(short_name);
        }
        Some(short_names)
    }

    /// Adopt `fingerprint` after a mutation whose effect on the map is already applied
    pub fn mark_synced(&mut self, fingerprint: Fingerprint) {
        self.fingerprint = Some(fingerprint);
    }

    /// Force the next reconcile to rescan
    pub fn invalidate(&mut self) {
        self.fingerprint = None;
    }

    /// Long names matching `pattern`, sorted case-insensitively
    pub fn list(&self, pattern: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .values()
            .filter(|record| PatternMatcher::matches(pattern, record.long_name()))
            .map(|record| record.long_name().to_string())
            .collect();
        names.sort_by_key(|name| name.to_ascii_lowercase());
        names
    }

    /// Whether a short name is already used by any private entry on the device
    pub fn is_short_name_taken(&self, short_name: &str) -> bool {
        self.occupied.contains(short_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::memory::MemoryDevice;
    use crate::core::device::BLOCK_SIZE;
    use crate::core::package::PackageTemplate;

    const PREFIX: &str = "VMUSAVE_";

    fn put_save(card: &mut MemoryDevice, short: &str, long: &str, save: &[u8]) {
        let template = PackageTemplate::new("Saved Game", "test");
        let (framed, _) = frame::write_frame(long, save).unwrap();
        let bytes = template.build(long, &framed, card.max_entry_bytes()).unwrap();
        card.write_entry(short, &bytes, true).unwrap();
    }

    #[test]
    fn test_first_reconcile_scans() {
        let mut card = MemoryDevice::new(1);
        put_save(&mut card, "VMUSAVE_0001", "Monkey Island", b"guybrush");
        put_save(&mut card, "VMUSAVE_0002", "Loom", b"bobbin");

        let mut cache = SaveCache::new(PREFIX, true);
        let outcome = cache.reconcile(&card).unwrap();
        assert_eq!(
            outcome,
            Reconciled::Rescanned {
                records: 2,
                skipped: 0
            }
        );

        let record = cache.lookup("monkey island").unwrap();
        assert_eq!(record.short_name(), "VMUSAVE_0001");
        assert_eq!(record.save_bytes(), Some(&b"guybrush"[..]));
        assert_eq!(record.package_size(), 2 * BLOCK_SIZE);
        assert!(cache.is_short_name_taken("VMUSAVE_0002"));
    }

    #[test]
    fn test_unchanged_fingerprint_skips_scan() {
        let mut card = MemoryDevice::new(1);
        put_save(&mut card, "VMUSAVE_0001", "Save", b"data");

        let mut cache = SaveCache::new(PREFIX, true);
        cache.reconcile(&card).unwrap();
        card.reset_stats();

        assert_eq!(cache.reconcile(&card).unwrap(), Reconciled::Unchanged);
        let stats = card.stats();
        assert_eq!(stats.enumerations, 0);
        assert_eq!(stats.entry_reads, 0);
        assert_eq!(stats.root_reads, 1);
        assert_eq!(stats.fat_reads, 1);
    }

    #[test]
    fn test_external_change_triggers_rescan() {
        let mut card = MemoryDevice::new(1);
        let mut cache = SaveCache::new(PREFIX, true);
        cache.reconcile(&card).unwrap();
        assert!(cache.is_empty());

        put_save(&mut card, "VMUSAVE_ABCD", "Added Elsewhere", b"x");
        assert!(matches!(
            cache.reconcile(&card).unwrap(),
            Reconciled::Rescanned { records: 1, .. }
        ));
        assert!(cache.lookup("ADDED ELSEWHERE").is_some());
    }

    #[test]
    fn test_skips_foreign_and_corrupt_entries() {
        let mut card = MemoryDevice::new(1);
        put_save(&mut card, "VMUSAVE_0001", "Good", b"ok");
        card.write_entry("VMUSAVE_0002", b"not a package", true).unwrap();
        put_save(&mut card, "OTHERGAME", "Foreign", b"ignored");

        let mut cache = SaveCache::new(PREFIX, true);
        let outcome = cache.reconcile(&card).unwrap();
        assert_eq!(
            outcome,
            Reconciled::Rescanned {
                records: 1,
                skipped: 1
            }
        );
        assert_eq!(cache.list("*"), vec!["Good".to_string()]);
        // The undecodable entry still blocks its short name
        assert!(cache.is_short_name_taken("VMUSAVE_0002"));
        assert!(!cache.is_short_name_taken("OTHERGAME"));
    }

    #[test]
    fn test_failed_reconcile_keeps_state() {
        let mut card = MemoryDevice::new(1);
        put_save(&mut card, "VMUSAVE_0001", "Keep Me", b"data");

        let mut cache = SaveCache::new(PREFIX, true);
        cache.reconcile(&card).unwrap();
        let before = cache.fingerprint();

        card.unplug();
        assert!(matches!(
            cache.reconcile(&card),
            Err(SaveError::DeviceUnavailable(_))
        ));
        assert_eq!(cache.fingerprint(), before);
        assert!(cache.lookup("keep me").is_some());
    }

    #[test]
    fn test_remove_and_list() {
        let mut card = MemoryDevice::new(1);
        put_save(&mut card, "VMUSAVE_0001", "game.s01", b"1");
        put_save(&mut card, "VMUSAVE_0002", "game.s02", b"2");
        put_save(&mut card, "VMUSAVE_0003", "other.s01", b"3");

        let mut cache = SaveCache::new(PREFIX, false);
        cache.reconcile(&card).unwrap();
        assert_eq!(cache.list("GAME.S##"), vec!["game.s01", "game.s02"]);

        assert_eq!(cache.remove("GAME.S01"), Some(vec!["VMUSAVE_0001".to_string()]));
        assert_eq!(cache.remove("game.s01"), None);
        assert!(!cache.is_short_name_taken("VMUSAVE_0001"));
        assert_eq!(cache.list("*.s01"), vec!["other.s01"]);
    }

    #[test]
    fn test_without_retained_packages() {
        let mut card = MemoryDevice::new(1);
        put_save(&mut card, "VMUSAVE_0001", "Lean", b"payload");

        let mut cache = SaveCache::new(PREFIX, false);
        cache.reconcile(&card).unwrap();
        let record = cache.lookup("lean").unwrap();
        assert!(record.package().is_none());
        assert!(record.save_bytes().is_none());
        assert_eq!(record.save_len(), 7);
    }

    #[test]
    fn test_invalidate_forces_rescan() {
        let card = MemoryDevice::new(1);
        let mut cache = SaveCache::new(PREFIX, true);
        cache.reconcile(&card).unwrap();
        cache.invalidate();
        assert!(matches!(
            cache.reconcile(&card).unwrap(),
            Reconciled::Rescanned { .. }
        ));
    }

    #[test]
    fn test_duplicate_long_names_keep_later_entry() {
        let mut card = MemoryDevice::new(1);
        put_save(&mut card, "VMUSAVE_0001", "slot", b"old");
        put_save(&mut card, "VMUSAVE_0002", "SLOT", b"new");

        let mut cache = SaveCache::new(PREFIX, true);
        cache.reconcile(&card).unwrap();
        assert_eq!(cache.len(), 1);
        let record = cache.lookup("slot").unwrap();
        assert_eq!(record.short_name(), "VMUSAVE_0002");
        assert_eq!(record.save_bytes(), Some(&b"new"[..]));

        assert_eq!(
            cache.remove("slot"),
            Some(vec!["VMUSAVE_0002".to_string(), "VMUSAVE_0001".to_string()])
        );
        assert!(!cache.is_short_name_taken("VMUSAVE_0001"));
        assert!(!cache.is_short_name_taken("VMUSAVE_0002"));
    }
}
