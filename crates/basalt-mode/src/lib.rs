//! The per-sector tweak engine: turns a keyed [`basalt_primitives::Cascade`]
//! into a mode that can encrypt or decrypt whole sectors, not just 16-byte
//! blocks.
//!
//! Every mode here is pure — no I/O, no shared mutable state beyond the
//! subkeys derived at construction time — so a single `Mode` can be handed
//! to many worker threads and driven over disjoint sub-buffers concurrently.

mod cbc;
mod gf128;
mod lrw;
pub mod selftest;
mod xts;

pub use cbc::CbcMode;
pub use lrw::LrwMode;
pub use xts::XtsMode;

use basalt_primitives::cipher::BLOCK_SIZE;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModeError {
    #[error("buffer length {0} is not a multiple of the sector size {1}")]
    Misaligned(usize, u32),
    #[error("mode key for {mode} must be {expected} bytes, got {actual}")]
    BadKeyLength { mode: &'static str, expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, ModeError>;

/// A keyed, stateless sector cipher. Implementations derive whatever tweak
/// or IV schedule their mode needs from the sector index alone, so the same
/// `Mode` instance can service sectors out of order and from multiple
/// threads at once.
pub trait Mode: Send + Sync {
    /// Human-readable mode name, used in volume headers and diagnostics.
    fn name(&self) -> &'static str;

    fn encrypt_sector(&self, sector: &mut [u8], sector_index: u64);
    fn decrypt_sector(&self, sector: &mut [u8], sector_index: u64);

    /// Encrypts every sector in `buf` in place. `base_sector_index` is the
    /// index of `buf`'s first sector; later sectors are numbered
    /// consecutively from there.
    fn encrypt_sectors(&self, buf: &mut [u8], base_sector_index: u64, sector_size: u32) -> Result<()> {
        for_each_sector(buf, sector_size, |sector, index| {
            self.encrypt_sector(sector, base_sector_index + index)
        })
    }

    fn decrypt_sectors(&self, buf: &mut [u8], base_sector_index: u64, sector_size: u32) -> Result<()> {
        for_each_sector(buf, sector_size, |sector, index| {
            self.decrypt_sector(sector, base_sector_index + index)
        })
    }
}

fn for_each_sector(buf: &mut [u8], sector_size: u32, mut f: impl FnMut(&mut [u8], u64)) -> Result<()> {
    let sector_size = sector_size as usize;
    if sector_size == 0 || buf.len() % sector_size != 0 {
        return Err(ModeError::Misaligned(buf.len(), sector_size as u32));
    }
    for (i, chunk) in buf.chunks_mut(sector_size).enumerate() {
        f(chunk, i as u64);
    }
    Ok(())
}

/// Encrypts or decrypts a single 16-byte block in place using `cascade`,
/// xor-ing `tweak` in before and after. Shared by XTS and LRW, whose only
/// difference is how the tweak is derived.
fn apply_tweaked_block(cascade: &basalt_primitives::Cascade, block: &mut [u8], tweak: &[u8; BLOCK_SIZE], encrypt: bool) {
    let mut work = [0u8; BLOCK_SIZE];
    work.copy_from_slice(block);
    for (b, t) in work.iter_mut().zip(tweak.iter()) {
        *b ^= *t;
    }
    if encrypt {
        cascade.encrypt_block(&mut work);
    } else {
        cascade.decrypt_block(&mut work);
    }
    for (b, t) in work.iter_mut().zip(tweak.iter()) {
        *b ^= *t;
    }
    block.copy_from_slice(&work);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Xts,
    Lrw,
    Cbc,
}

impl ModeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModeKind::Xts => "XTS",
            ModeKind::Lrw => "LRW",
            ModeKind::Cbc => "CBC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_primitives::CascadeKind;

    #[test]
    fn misaligned_buffer_is_rejected() {
        let key = vec![0u8; XtsMode::key_len(CascadeKind::Aes)];
        let mode = XtsMode::new(CascadeKind::Aes, &key).unwrap();
        let mut buf = vec![0u8; 511];
        assert!(mode.encrypt_sectors(&mut buf, 0, 512).is_err());
    }
}
