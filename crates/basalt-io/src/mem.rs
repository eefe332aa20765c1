use std::path::{Path, PathBuf};

use crate::{BackingError, BackingFile, Result};

/// An in-memory backing store, used by the header codec and volume tests so
/// they don't have to touch the filesystem to exercise sector I/O paths.
pub struct MemBacking {
    path: PathBuf,
    data: Vec<u8>,
}

impl MemBacking {
    pub fn new(size: u64) -> Self {
        Self { path: PathBuf::from("<memory>"), data: vec![0u8; size as usize] }
    }

    /// Wraps an existing byte buffer, used to run the header codec over a
    /// backup file's 512-byte halves without touching the filesystem.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { path: PathBuf::from("<memory>"), data }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl BackingFile for MemBacking {
    fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn sector_size(&self) -> u32 {
        512
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let offset = offset as usize;
        let end = offset + buf.len();
        if end > self.data.len() {
            return Err(BackingError::ShortTransfer {
                path: self.path.clone(),
                offset: offset as u64,
                expected: buf.len(),
                actual: self.data.len().saturating_sub(offset),
            });
        }
        buf.copy_from_slice(&self.data[offset..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let offset = offset as usize;
        let end = offset + buf.len();
        if end > self.data.len() {
            return Err(BackingError::ShortTransfer {
                path: self.path.clone(),
                offset: offset as u64,
                expected: buf.len(),
                actual: self.data.len().saturating_sub(offset),
            });
        }
        self.data[offset..end].copy_from_slice(buf);
        Ok(())
    }

    fn set_len(&mut self, new_len: u64) -> Result<()> {
        self.data.resize(new_len as usize, 0);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
