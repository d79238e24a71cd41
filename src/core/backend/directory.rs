//! Host directory backend
//!
//! Each save is a plain file inside the save path. Writes go to a temporary
//! file in the same directory and are renamed over the target on commit, so
//! a crash leaves either the old save or the new one.

use super::{SaveBackend, SaveReader, SaveWriter};
use crate::core::error::{Result, SaveError};
use crate::core::pattern::PatternMatcher;
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryBackend;

impl DirectoryBackend {
    pub fn new() -> Self {
        DirectoryBackend
    }

    fn save_file(save_path: &str, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
        {
            return Err(SaveError::InvalidName(format!(
                "{:?} is not a valid save file name",
                name
            )));
        }
        Ok(Path::new(save_path).join(name))
    }
}

fn not_found(err: io::Error, name: &str) -> SaveError {
    if err.kind() == io::ErrorKind::NotFound {
        SaveError::NotFound(name.to_string())
    } else {
        SaveError::Io(err)
    }
}

/// Temporary file renamed over its target on commit
pub struct DirectoryWriter {
    temp: NamedTempFile,
    target: PathBuf,
}

impl Write for DirectoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.as_file_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.as_file_mut().flush()
    }
}

impl Seek for DirectoryWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.temp.as_file_mut().seek(pos)
    }
}

impl SaveWriter for DirectoryWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        let DirectoryWriter { temp, target } = *self;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| SaveError::Io(e.error))?;
        debug!(path = %target.display(), "save file replaced");
        Ok(())
    }

    fn abort(self: Box<Self>) {
        debug!(path = %self.target.display(), "save file write abandoned");
    }
}

impl SaveBackend for DirectoryBackend {
    fn list(&mut self, save_path: &str, pattern: &str) -> Result<Vec<String>> {
        let entries = match fs::read_dir(save_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SaveError::Io(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if PatternMatcher::matches(pattern, name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_by_key(|name| name.to_ascii_lowercase());
        Ok(names)
    }

    fn open_for_read(&mut self, save_path: &str, name: &str) -> Result<SaveReader> {
        let path = Self::save_file(save_path, name)?;
        let file = File::open(&path).map_err(|e| not_found(e, name))?;
        Ok(Box::new(file))
    }

    fn open_for_write<'a>(
        &'a mut self,
        save_path: &str,
        name: &str,
    ) -> Result<Box<dyn SaveWriter + 'a>> {
        let target = Self::save_file(save_path, name)?;
        fs::create_dir_all(save_path)?;
        let temp = NamedTempFile::new_in(save_path)?;
        Ok(Box::new(DirectoryWriter { temp, target }))
    }

    fn remove(&mut self, save_path: &str, name: &str) -> Result<bool> {
        let path = Self::save_file(save_path, name)?;
        fs::remove_file(&path).map_err(|e| not_found(e, name))?;
        Ok(true)
    }
}
