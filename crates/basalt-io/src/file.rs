use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{BackingError, BackingFile, Result};

/// A backing handle over a regular file or a raw block device, opened by
/// path. Access is always serialized by the owning `Volume`'s mutex, so a
/// plain seek-then-transfer pair is sufficient — there is no concurrent
/// access to race against.
pub struct FileBacking {
    path: PathBuf,
    file: File,
    is_device: bool,
    sector_size: u32,
}

impl FileBacking {
    /// Opens an existing backing file or device for read/write sector I/O.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)
            .map_err(|source| BackingError::Io { path: path.clone(), source })?;
        let is_device = is_block_device(&path);
        Ok(Self { path, file, is_device, sector_size: 512 })
    }

    /// Creates a brand-new backing file for the volume creator. Fails if the
    /// path already exists, since the creator's caller is responsible for
    /// confirming an overwrite upstream.
    pub fn create_new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| BackingError::Io { path: path.clone(), source })?;
        Ok(Self { path, file, is_device: false, sector_size: 512 })
    }

    fn io_err(&self, source: std::io::Error) -> BackingError {
        BackingError::Io { path: self.path.clone(), source }
    }
}

impl BackingFile for FileBacking {
    fn len(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|source| BackingError::Io { path: self.path.clone(), source })
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset)).map_err(|e| self.io_err(e))?;
        self.file.read_exact(buf).map_err(|e| self.io_err(e))
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset)).map_err(|e| self.io_err(e))?;
        self.file.write_all(buf).map_err(|e| self.io_err(e))
    }

    fn set_len(&mut self, new_len: u64) -> Result<()> {
        if self.is_device {
            return Err(BackingError::Io {
                path: self.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Unsupported, "cannot resize a block device"),
            });
        }
        self.file.set_len(new_len).map_err(|e| self.io_err(e))
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_all().map_err(|e| self.io_err(e))
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn is_device(&self) -> bool {
        self.is_device
    }
}

#[cfg(unix)]
fn is_block_device(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path)
        .map(|m| m.file_type().is_block_device())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_block_device(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trips_bytes() {
        let tmp = NamedTempFile::new().unwrap();
        let mut backing = FileBacking::open(tmp.path(), false).unwrap();
        backing.set_len(4096).unwrap();
        backing.write_at(512, b"hello").unwrap();
        let mut buf = [0u8; 5];
        backing.read_at(512, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }
}
