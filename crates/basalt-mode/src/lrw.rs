//! LRW, kept for reading and re-encrypting volumes created before Basalt
//! standardized on XTS. The tweak for block `i` (a running count of 16-byte
//! blocks since the start of the volume, not the sector) is `key_h * i` in
//! GF(2^128); `key_h` is a dedicated tweak key, independent of the cascade
//! key.

use basalt_primitives::cipher::BLOCK_SIZE;
use basalt_primitives::{Cascade, CascadeKind};

use crate::{apply_tweaked_block, gf128, Mode, ModeError, Result};

pub struct LrwMode {
    cascade: Cascade,
    tweak_key: u128,
    sector_size: u32,
}

impl LrwMode {
    /// LRW keys the cascade normally and additionally needs a 16-byte
    /// GF(2^128) tweak key appended after it.
    pub fn key_len(kind: CascadeKind) -> usize {
        kind.key_len() + BLOCK_SIZE
    }

    /// `sector_size` is needed up front because the LRW block index counts
    /// blocks from the start of the volume, not from the start of the
    /// sector — the mode must know how many blocks precede each sector.
    pub fn new(kind: CascadeKind, key: &[u8], sector_size: u32) -> Result<LrwMode> {
        let expected = Self::key_len(kind);
        if key.len() != expected {
            return Err(ModeError::BadKeyLength { mode: "LRW", expected, actual: key.len() });
        }
        let mut tweak_key_bytes = [0u8; BLOCK_SIZE];
        tweak_key_bytes.copy_from_slice(&key[kind.key_len()..]);
        Ok(LrwMode {
            cascade: Cascade::new(kind, &key[..kind.key_len()]),
            tweak_key: u128::from_le_bytes(tweak_key_bytes),
            sector_size,
        })
    }

    fn block_tweak(&self, block_index: u128) -> [u8; BLOCK_SIZE] {
        gf128::mul(self.tweak_key, block_index).to_le_bytes()
    }

    fn run(&self, sector: &mut [u8], sector_index: u64, encrypt: bool) {
        let blocks_per_sector = (self.sector_size as u64) / (BLOCK_SIZE as u64);
        let mut block_index = sector_index as u128 * blocks_per_sector as u128;
        for block in sector.chunks_mut(BLOCK_SIZE) {
            let tweak = self.block_tweak(block_index);
            apply_tweaked_block(&self.cascade, block, &tweak, encrypt);
            block_index += 1;
        }
    }
}

impl Mode for LrwMode {
    fn name(&self) -> &'static str {
        "LRW"
    }

    fn encrypt_sector(&self, sector: &mut [u8], sector_index: u64) {
        self.run(sector, sector_index, true)
    }

    fn decrypt_sector(&self, sector: &mut [u8], sector_index: u64) {
        self.run(sector, sector_index, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: CascadeKind) -> Vec<u8> {
        (0..LrwMode::key_len(kind)).map(|i| (i as u8).wrapping_mul(61).wrapping_add(5)).collect()
    }

    #[test]
    fn round_trips_a_sector() {
        for kind in CascadeKind::all() {
            let mode = LrwMode::new(*kind, &key(*kind), 512).unwrap();
            let mut sector = vec![0x7eu8; 512];
            let original = sector.clone();
            mode.encrypt_sector(&mut sector, 3);
            assert_ne!(sector, original);
            mode.decrypt_sector(&mut sector, 3);
            assert_eq!(sector, original);
        }
    }

    #[test]
    fn different_sectors_give_different_ciphertext() {
        let kind = CascadeKind::Twofish;
        let mode = LrwMode::new(kind, &key(kind), 512).unwrap();
        let mut a = vec![0x33u8; 512];
        let mut b = a.clone();
        mode.encrypt_sector(&mut a, 0);
        mode.encrypt_sector(&mut b, 5);
        assert_ne!(a, b);
    }
}
