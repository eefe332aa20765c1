//! `BackingFile` is the abstraction over "file on the host filesystem" and
//! "raw block device" that the volume object reads and writes sectors
//! through. Nothing above this layer cares which one it got.

use std::io;
use std::path::{Path, PathBuf};

mod file;
mod mem;

pub use file::FileBacking;
pub use mem::MemBacking;

/// Where to position a backing-file-relative seek, mirroring the header
/// codec's need to address both header-group offsets (from the start) and
/// backup-header offsets (from the end of the volume).
#[derive(Debug, Clone, Copy)]
pub enum Anchor {
    Start(u64),
    End(i64),
}

/// Errors surfaced by a backing handle. These are deliberately thin: the
/// volume object wraps them in `SystemException` with the offending path,
/// so no extra context needs to live here.
#[derive(Debug, thiserror::Error)]
pub enum BackingError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, #[source] source: io::Error },
    #[error("short read/write at offset {offset} on {path}: expected {expected} bytes, got {actual}")]
    ShortTransfer { path: PathBuf, offset: u64, expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, BackingError>;

/// An open file or block device that sector I/O is performed against.
///
/// Every method here is in terms of bytes, not sectors — the sector-size
/// contract is enforced by the volume object, one layer up, since the
/// backing handle itself doesn't know about cipher-mode alignment.
pub trait BackingFile: Send {
    /// Total addressable size in bytes.
    fn len(&self) -> Result<u64>;

    /// The device's native sector size, or 512 for a regular file.
    fn sector_size(&self) -> u32;

    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes exactly `buf` at `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Resolves an [`Anchor`] to an absolute byte offset, using the current
    /// length for `Anchor::End`. Used to locate end-anchored backup headers.
    fn resolve(&self, anchor: Anchor) -> Result<u64> {
        match anchor {
            Anchor::Start(off) => Ok(off),
            Anchor::End(rel) => {
                let len = self.len()? as i64;
                Ok((len + rel).max(0) as u64)
            }
        }
    }

    /// Grows a regular file to `new_len`; an error on a device backing
    /// (devices have a fixed size).
    fn set_len(&mut self, new_len: u64) -> Result<()>;

    /// Flushes any buffered writes to the underlying medium.
    fn flush(&mut self) -> Result<()>;

    /// The path this handle was opened from, for diagnostics.
    fn path(&self) -> &Path;

    /// True if the backing object is a raw block device rather than a
    /// regular file. The creator refuses to grow a device and instead
    /// verifies its existing size matches the requested volume size.
    fn is_device(&self) -> bool {
        false
    }
}
