//! Storage backends behind the save manager
//!
//! A [`SaveBackend`] lists, opens and removes saves below a save path. The
//! device backend serves memory card paths through the cache; anything else
//! goes to a generic backend, by default a host directory.

pub mod device;
pub mod directory;

use crate::core::error::Result;
use std::io::{Read, Seek, Write};

pub use device::DeviceBackend;
pub use directory::DirectoryBackend;

/// Anything that can be read and repositioned
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Read stream over one save
pub type SaveReader = Box<dyn ReadSeek + Send>;

/// Write stream whose bytes only reach storage on [`SaveWriter::commit`]
///
/// Dropping a writer without committing discards everything written to it.
pub trait SaveWriter: Write + Seek {
    /// Persist the written bytes
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the written bytes
    fn abort(self: Box<Self>);
}

pub trait SaveBackend {
    /// Names below `save_path` matching `pattern`
    fn list(&mut self, save_path: &str, pattern: &str) -> Result<Vec<String>>;

    fn open_for_read(&mut self, save_path: &str, name: &str) -> Result<SaveReader>;

    fn open_for_write<'a>(
        &'a mut self,
        save_path: &str,
        name: &str,
    ) -> Result<Box<dyn SaveWriter + 'a>>;

    /// Remove a save, failing with `NotFound` when it does not exist
    ///
    /// `Ok(false)` means the storage refused the delete.
    fn remove(&mut self, save_path: &str, name: &str) -> Result<bool>;
}
