//! Credential material: the password the user types, keyfiles that
//! supplement or replace it, and the 64-byte buffer the KDF registry
//! actually consumes.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

pub const CREDENTIAL_BUFFER_LEN: usize = 64;
const MAX_PASSWORD_LEN: usize = 64;
const MAX_KEYFILE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password is {0} bytes, longer than the {1}-byte limit")]
    PasswordTooLong(usize, usize),
    #[error("failed to read keyfile {0}: {1}")]
    KeyfileIo(PathBuf, std::io::Error),
}

/// A bounded password buffer. Zeroized on drop; never mutated after
/// construction. An empty password is a legal sentinel meaning
/// "keyfiles only".
pub struct VolumePassword {
    bytes: Zeroizing<Vec<u8>>,
}

impl VolumePassword {
    pub fn new(password: &str) -> Result<VolumePassword, CredentialError> {
        let bytes = password.as_bytes();
        if bytes.len() > MAX_PASSWORD_LEN {
            return Err(CredentialError::PasswordTooLong(bytes.len(), MAX_PASSWORD_LEN));
        }
        Ok(VolumePassword { bytes: Zeroizing::new(bytes.to_vec()) })
    }

    pub fn empty() -> VolumePassword {
        VolumePassword { bytes: Zeroizing::new(Vec::new()) }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Zero-padded to the 64-byte credential buffer length.
    fn padded(&self) -> [u8; CREDENTIAL_BUFFER_LEN] {
        let mut buf = [0u8; CREDENTIAL_BUFFER_LEN];
        buf[..self.bytes.len()].copy_from_slice(&self.bytes);
        buf
    }
}

/// A reference to a file used as additional keying input. Reading is
/// deferred until [`mix`] is called.
pub struct Keyfile {
    path: PathBuf,
}

impl Keyfile {
    pub fn new(path: impl Into<PathBuf>) -> Keyfile {
        Keyfile { path: path.into() }
    }

    fn read_capped(&self) -> Result<Vec<u8>, CredentialError> {
        let mut file = File::open(&self.path).map_err(|e| CredentialError::KeyfileIo(self.path.clone(), e))?;
        let mut buf = vec![0u8; MAX_KEYFILE_BYTES];
        let mut total = 0;
        loop {
            let n = file.read(&mut buf[total..]).map_err(|e| CredentialError::KeyfileIo(self.path.clone(), e))?;
            if n == 0 {
                break;
            }
            total += n;
            if total == buf.len() {
                break;
            }
        }
        buf.truncate(total);
        Ok(buf)
    }
}

/// Folds a keyfile's bytes into a 64-byte pool using a running CRC32: each
/// input byte advances the checksum, and the checksum's four bytes are
/// added (mod 256) into four consecutive pool slots, wrapping every 64
/// bytes. Processing keyfiles in list order with the pool carried across
/// them is what makes the fold associative across the list: each keyfile
/// only ever perturbs the pool state left by the one before it.
fn mix_keyfile_into_pool(data: &[u8], pool: &mut [u8; CREDENTIAL_BUFFER_LEN], pool_pos: &mut usize) {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc = running_crc32_update(crc, byte);
        let crc_bytes = crc.to_be_bytes();
        for b in crc_bytes {
            pool[*pool_pos] = pool[*pool_pos].wrapping_add(b);
            *pool_pos = (*pool_pos + 1) % CREDENTIAL_BUFFER_LEN;
        }
    }
}

/// Folds `password` and `keyfiles` (in list order) into the 64-byte buffer
/// the KDF registry derives from. If `keyfiles` is empty the password
/// alone (zero-padded) is returned unchanged; otherwise the keyfile pool
/// entirely replaces the password as KDF input, with the password itself
/// XORed in as one more mixing input.
pub fn mix_credentials(password: &VolumePassword, keyfiles: &[Keyfile]) -> Result<Zeroizing<[u8; CREDENTIAL_BUFFER_LEN]>, CredentialError> {
    if keyfiles.is_empty() {
        return Ok(Zeroizing::new(password.padded()));
    }

    let mut pool = [0u8; CREDENTIAL_BUFFER_LEN];
    let mut pool_pos = 0usize;
    for keyfile in keyfiles {
        let mut data = keyfile.read_capped()?;
        mix_keyfile_into_pool(&data, &mut pool, &mut pool_pos);
        data.zeroize();
    }

    let padded_password = password.padded();
    for (p, pw) in pool.iter_mut().zip(padded_password.iter()) {
        *p ^= *pw;
    }
    Ok(Zeroizing::new(pool))
}

pub fn keyfile_path(keyfile: &Keyfile) -> &Path {
    &keyfile.path
}

/// One step of the reflected CRC-32 (polynomial 0xEDB88320) used only to
/// drive the keyfile pool's mixing schedule. Deliberately separate from
/// `basalt-common`'s header checksum: this is a diffusion step, not an
/// integrity check, and the two must not be confused.
fn running_crc32_update(crc: u32, byte: u8) -> u32 {
    let mut crc = crc ^ byte as u32;
    for _ in 0..8 {
        let mask = (crc & 1).wrapping_neg();
        crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn password_over_limit_is_rejected() {
        let long = "x".repeat(MAX_PASSWORD_LEN + 1);
        assert!(VolumePassword::new(&long).is_err());
    }

    #[test]
    fn empty_password_with_no_keyfiles_is_just_padding() {
        let password = VolumePassword::empty();
        let mixed = mix_credentials(&password, &[]).unwrap();
        assert_eq!(&mixed[..], &[0u8; CREDENTIAL_BUFFER_LEN][..]);
    }

    #[test]
    fn keyfiles_change_the_derived_buffer() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"some keying material").unwrap();
        f.flush().unwrap();

        let password = VolumePassword::new("hunter2").unwrap();
        let without = mix_credentials(&password, &[]).unwrap();
        let with = mix_credentials(&password, &[Keyfile::new(f.path())]).unwrap();
        assert_ne!(&without[..], &with[..]);
    }

    #[test]
    fn keyfile_order_matters() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b"AAAA").unwrap();
        a.flush().unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        b.write_all(b"BBBB").unwrap();
        b.flush().unwrap();

        let password = VolumePassword::empty();
        let forward = mix_credentials(&password, &[Keyfile::new(a.path()), Keyfile::new(b.path())]).unwrap();
        let backward = mix_credentials(&password, &[Keyfile::new(b.path()), Keyfile::new(a.path())]).unwrap();
        assert_ne!(&forward[..], &backward[..]);
    }
}
