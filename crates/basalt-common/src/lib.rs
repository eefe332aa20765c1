//! Small, dependency-light types shared by every Basalt crate.

/// CRC-32 helpers.
pub mod crc32;
/// Sector-size and byte-range arithmetic shared by the header codec and the volume object.
pub mod geometry;
/// Timestamp helpers for header fields.
pub mod time;

pub use crc32::crc32;
pub use geometry::{sector_count, SECTOR_SIZE};
pub use time::now_unix;
