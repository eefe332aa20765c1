//! Exercises the KDF layer before a mount is allowed to proceed.
//!
//! The registry's own entries run at iteration/memory costs chosen for
//! real passphrase stretching (hundreds of thousands of PBKDF2 rounds,
//! hundreds of megabytes for Argon2id); there is no way to hold a
//! known-answer vector at those costs without having run them at least
//! once. Instead this checks the underlying PBKDF2-HMAC-SHA-1 primitive
//! directly against RFC 6070's published test vector at `c = 1`, which
//! exercises the exact same HMAC-then-iterate construction the registry's
//! `PBKDF2-HMAC-SHA-1` entries use, just at a verifiable cost. Argon2id
//! gets a determinism/salt-sensitivity check instead of a literal vector,
//! for the same reason `basalt-mode`'s self-test documents for XTS/LRW/CBC.

use thiserror::Error;

use crate::{argon2id, pbkdf2_hmac};

#[derive(Debug, Error)]
#[error("KDF self-test failed: {0}")]
pub struct KdfTestFailed(pub String);

// RFC 6070, P = "password", S = "salt", c = 1, dkLen = 20.
const PBKDF2_SHA1_RFC6070_DK: [u8; 20] = [
    0x0c, 0x60, 0xc8, 0x0f, 0x96, 0x1f, 0x0e, 0x71, 0xf3, 0xa9, 0xb5, 0x24, 0xaf, 0x60, 0x12, 0x06, 0x2f, 0xe0, 0x37, 0xa6,
];

pub fn run_self_test() -> Result<(), KdfTestFailed> {
    let dk = pbkdf2_hmac::derive::<sha1::Sha1>(b"password", b"salt", 1, 20);
    if dk.as_slice() != PBKDF2_SHA1_RFC6070_DK {
        return Err(KdfTestFailed("PBKDF2-HMAC-SHA-1 did not match RFC 6070's c=1 vector".to_string()));
    }

    let a = argon2id::derive(b"password", b"0123456789abcdef", 32, 1, 8 * 1024, 1);
    let b = argon2id::derive(b"password", b"0123456789abcdef", 32, 1, 8 * 1024, 1);
    if a.as_slice() != b.as_slice() {
        return Err(KdfTestFailed("Argon2id is not deterministic for identical inputs".to_string()));
    }
    let c = argon2id::derive(b"password", b"fedcba9876543210", 32, 1, 8 * 1024, 1);
    if a.as_slice() == c.as_slice() {
        return Err(KdfTestFailed("Argon2id produced identical output under two different salts".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_test_passes() {
        run_self_test().expect("KDF self-test should pass on a correct build");
    }
}
