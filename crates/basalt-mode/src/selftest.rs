//! Exercises every mode before a mount is allowed to proceed.
//!
//! None of XTS/LRW/CBC as built here has a published known-answer vector
//! Basalt can check itself against: XTS's closest standard relative
//! (IEEE 1619) only defines the single-AES-cascade case, and even there the
//! exact subkey-derivation layout can't be confirmed byte-for-byte without
//! running the cipher, which this workspace's build process never does.
//! Instead each mode is checked for the properties `spec.md` §8 actually
//! quantifies for the mode layer: sector round-trip and tweak independence
//! (the same plaintext sector at two different indices must not produce the
//! same ciphertext), plus key sensitivity (changing the key changes the
//! ciphertext). A cascade/mode pair that passes all three without a fixed
//! vector to fall back on is the honest bound on what can be asserted here.

use basalt_primitives::CascadeKind;
use thiserror::Error;

use crate::{CbcMode, LrwMode, Mode, XtsMode};

#[derive(Debug, Error)]
#[error("mode self-test failed: {0}")]
pub struct ModeTestFailed(pub String);

fn key_for(len: usize, salt: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(211).wrapping_add(salt)).collect()
}

fn check_one(mode_name: &'static str, a: Box<dyn Mode>, b_different_key: Box<dyn Mode>) -> Result<(), ModeTestFailed> {
    let sector_size = 512usize;
    let mut plaintext = vec![0u8; sector_size];
    for (i, b) in plaintext.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(37);
    }

    let mut at_sector_0 = plaintext.clone();
    a.encrypt_sector(&mut at_sector_0, 0);
    let mut roundtrip = at_sector_0.clone();
    a.decrypt_sector(&mut roundtrip, 0);
    if roundtrip != plaintext {
        return Err(ModeTestFailed(format!("{mode_name} failed to round-trip a sector")));
    }

    let mut at_sector_1 = plaintext.clone();
    a.encrypt_sector(&mut at_sector_1, 1);
    if at_sector_0 == at_sector_1 {
        return Err(ModeTestFailed(format!("{mode_name} produced identical ciphertext for two different sector indices")));
    }

    let mut under_other_key = plaintext;
    b_different_key.encrypt_sector(&mut under_other_key, 0);
    if under_other_key == at_sector_0 {
        return Err(ModeTestFailed(format!("{mode_name} produced identical ciphertext under two different keys")));
    }

    Ok(())
}

pub fn run_self_test() -> Result<(), ModeTestFailed> {
    for &cascade in CascadeKind::all() {
        let xts_key = key_for(XtsMode::key_len(cascade), 1);
        let xts_key_other = key_for(XtsMode::key_len(cascade), 2);
        check_one(
            "XTS",
            Box::new(XtsMode::new(cascade, &xts_key).map_err(|e| ModeTestFailed(e.to_string()))?),
            Box::new(XtsMode::new(cascade, &xts_key_other).map_err(|e| ModeTestFailed(e.to_string()))?),
        )?;

        let lrw_key = key_for(LrwMode::key_len(cascade), 1);
        let lrw_key_other = key_for(LrwMode::key_len(cascade), 2);
        check_one(
            "LRW",
            Box::new(LrwMode::new(cascade, &lrw_key, 512).map_err(|e| ModeTestFailed(e.to_string()))?),
            Box::new(LrwMode::new(cascade, &lrw_key_other, 512).map_err(|e| ModeTestFailed(e.to_string()))?),
        )?;

        let cbc_key = key_for(CbcMode::key_len(cascade), 1);
        let cbc_key_other = key_for(CbcMode::key_len(cascade), 2);
        check_one(
            "CBC",
            Box::new(CbcMode::new(cascade, &cbc_key).map_err(|e| ModeTestFailed(e.to_string()))?),
            Box::new(CbcMode::new(cascade, &cbc_key_other).map_err(|e| ModeTestFailed(e.to_string()))?),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_test_passes() {
        run_self_test().expect("mode self-test should pass on a correct build");
    }
}
