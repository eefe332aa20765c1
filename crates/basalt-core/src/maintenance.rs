//! The header-maintenance operations from spec.md's public operations
//! surface that act on a volume's headers directly and need neither the
//! mounted-volume table nor the worker pool: `change_password`,
//! `backup_headers`, and the two `restore_headers_from_*` variants.
//!
//! Grounded on `Core/VolumeOperations.cpp`'s own split between "mount this
//! volume" and "rewrite its headers" — the latter never goes through the
//! mounted-volume table, since a password change or header restore is
//! explicitly allowed (and expected) to run against an unmounted volume.

use std::path::Path;

use basalt_header::{decrypt_header, encrypt_header, HeaderCodecError, VolumeLayout, HEADER_SIZE};
use basalt_io::{BackingFile, MemBacking};
use basalt_kdf::KdfKind;
use basalt_rng::Pool as RngPool;

use crate::error::{CoreError, Result};

fn map_codec_err(path: &Path, e: HeaderCodecError) -> CoreError {
    match e {
        HeaderCodecError::Io(io) => io.into(),
        HeaderCodecError::BadModeKey(mode) => CoreError::Mode(mode),
        HeaderCodecError::Undecipherable => CoreError::PasswordIncorrect { path: path.to_path_buf() },
    }
}

/// Finds the first layout (current format before legacy, in
/// `VolumeLayout::all()`'s order) whose header at `offset_of(layout)`
/// decrypts under `credential`.
fn trial_decrypt(
    path: &Path,
    backing: &mut dyn BackingFile,
    credential: &[u8],
    offset_of: impl Fn(VolumeLayout) -> Option<basalt_io::Anchor>,
) -> Result<(VolumeLayout, basalt_header::DecodedHeader)> {
    for &layout in VolumeLayout::all() {
        let Some(anchor) = offset_of(layout) else { continue };
        let Ok(offset) = backing.resolve(anchor) else { continue };
        if let Ok(decoded) = decrypt_header(backing, offset, layout, credential) {
            return Ok((layout, decoded));
        }
    }
    Err(CoreError::PasswordIncorrect { path: path.to_path_buf() })
}

/// Re-encrypts a volume's header (and, for V2, its backup header) under
/// `new_credential`, drawing a fresh salt for each write. The master key,
/// cascade, and mode are all preserved exactly — only the credential, and
/// optionally the KDF, change. Passing the same password as both old and
/// new with a different `new_kdf` performs an iteration-count upgrade
/// without a real password change.
pub fn change_password(
    path: &Path,
    backing: &mut dyn BackingFile,
    rng: &RngPool,
    old_credential: &[u8],
    new_credential: &[u8],
    new_kdf: Option<KdfKind>,
) -> Result<()> {
    let (layout, decoded) = trial_decrypt(path, backing, old_credential, |l| Some(l.header_offset()))?;

    let kdf = match new_kdf {
        Some(k) => k,
        None => basalt_kdf::by_name(decoded.kdf_name).expect("a decoded header's KDF name is always a registry entry"),
    };
    let cascade = decoded.master_key.cascade();
    let mode = decoded.master_key.mode();

    let mut fields = decoded.fields.clone();
    fields.modification_time = basalt_common::now_unix();

    let primary_offset = backing.resolve(layout.header_offset())?;
    encrypt_header(backing, primary_offset, rng, kdf, cascade, mode, new_credential, fields.clone()).map_err(|e| map_codec_err(path, e))?;

    if let Some(anchor) = layout.backup_header_offset() {
        let backup_offset = backing.resolve(anchor)?;
        encrypt_header(backing, backup_offset, rng, kdf, cascade, mode, new_credential, fields).map_err(|e| map_codec_err(path, e))?;
    }

    Ok(())
}

/// Builds the exactly-1024-byte external backup file described in §6:
/// first half a freshly-salted re-encryption of the outer volume's primary
/// header under `outer_credential`; second half a freshly-salted
/// re-encryption of the hidden volume's header under `hidden_credential`
/// if one is supplied and unlocks an embedded hidden volume, else a random
/// block shaped like a header so the absence of a hidden volume can't be
/// distinguished from its presence by looking at the backup file alone.
///
/// No framing envelope is written — the returned buffer *is* the file
/// contents, matching the reference format's own lack of an in-band
/// marker (§9 Open Question).
pub fn backup_headers(
    path: &Path,
    backing: &mut dyn BackingFile,
    rng: &RngPool,
    outer_credential: &[u8],
    hidden_credential: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let (outer_layout, outer_decoded) = trial_decrypt(path, backing, outer_credential, |l| if l.is_hidden() { None } else { Some(l.header_offset()) })?;

    let outer_kdf = basalt_kdf::by_name(outer_decoded.kdf_name).expect("a decoded header's KDF name is always a registry entry");
    let mut outer_fields = outer_decoded.fields.clone();
    outer_fields.modification_time = basalt_common::now_unix();

    let mut buffer = vec![0u8; 2 * HEADER_SIZE];
    let mut primary_half = MemBacking::from_bytes(vec![0u8; HEADER_SIZE]);
    encrypt_header(
        &mut primary_half,
        0,
        rng,
        outer_kdf,
        outer_decoded.master_key.cascade(),
        outer_decoded.master_key.mode(),
        outer_credential,
        outer_fields,
    )
    .map_err(|e| map_codec_err(path, e))?;
    buffer[..HEADER_SIZE].copy_from_slice(primary_half.as_slice());
    let _ = outer_layout;

    let hidden_half = hidden_credential.and_then(|hidden_credential| {
        let hidden_layout = match outer_layout {
            VolumeLayout::NormalV2 => VolumeLayout::HiddenV2,
            VolumeLayout::NormalV1 => VolumeLayout::HiddenV1,
            VolumeLayout::HiddenV1 | VolumeLayout::HiddenV2 => return None,
        };
        let offset = backing.resolve(hidden_layout.header_offset()).ok()?;
        let decoded = decrypt_header(backing, offset, hidden_layout, hidden_credential).ok()?;
        let kdf = basalt_kdf::by_name(decoded.kdf_name)?;
        let mut fields = decoded.fields.clone();
        fields.modification_time = basalt_common::now_unix();

        let mut half = MemBacking::from_bytes(vec![0u8; HEADER_SIZE]);
        encrypt_header(&mut half, 0, rng, kdf, decoded.master_key.cascade(), decoded.master_key.mode(), hidden_credential, fields).ok()?;
        Some(half.into_inner())
    });

    match hidden_half {
        Some(half) => buffer[HEADER_SIZE..].copy_from_slice(&half),
        None => buffer[HEADER_SIZE..].copy_from_slice(&basalt_header::random_header_shaped_block(rng)),
    }

    Ok(buffer)
}

/// V2-only: decrypts the volume's own internal backup header to confirm
/// `credential` unlocks it, then copies its raw (still-encrypted) bytes
/// over the primary header slot. No re-encryption happens here — the
/// backup header is already a valid, independently-salted ciphertext, so
/// relocating it verbatim is sufficient and avoids re-deriving a key.
pub fn restore_from_internal_backup(path: &Path, backing: &mut dyn BackingFile, credential: &[u8]) -> Result<()> {
    for &layout in &[VolumeLayout::NormalV2, VolumeLayout::HiddenV2] {
        let Some(anchor) = layout.backup_header_offset() else { continue };
        let Ok(backup_offset) = backing.resolve(anchor) else { continue };
        if decrypt_header(backing, backup_offset, layout, credential).is_ok() {
            let mut raw = [0u8; HEADER_SIZE];
            backing.read_at(backup_offset, &mut raw)?;
            let primary_offset = backing.resolve(layout.header_offset())?;
            backing.write_at(primary_offset, &raw)?;
            return Ok(());
        }
    }
    Err(CoreError::PasswordIncorrect { path: path.to_path_buf() })
}

/// Restores header(s) from an external backup file's raw bytes (exactly
/// `2 * HEADER_SIZE`, per §6/§9 — no framing envelope). Tries decrypting
/// each half under `credential`; a half that decrypts is written to the
/// matching slot on the volume (primary for the first half, the embedded
/// hidden header's slot for the second), and the primary half is also
/// mirrored onto the volume's own backup slot when its layout carries one.
pub fn restore_from_file_bytes(path: &Path, backing: &mut dyn BackingFile, file_bytes: &[u8], credential: &[u8]) -> Result<()> {
    if file_bytes.len() != 2 * HEADER_SIZE {
        return Err(CoreError::ParameterIncorrect(format!("backup file must be exactly {} bytes, got {}", 2 * HEADER_SIZE, file_bytes.len())));
    }
    let first = &file_bytes[..HEADER_SIZE];
    let second = &file_bytes[HEADER_SIZE..];

    let mut restored_any = false;

    if let Some(layout) = decodable_layout(first, credential, false) {
        let primary_offset = backing.resolve(layout.header_offset())?;
        backing.write_at(primary_offset, first)?;
        if let Some(anchor) = layout.backup_header_offset() {
            let backup_offset = backing.resolve(anchor)?;
            backing.write_at(backup_offset, first)?;
        }
        restored_any = true;
    }

    if let Some(layout) = decodable_layout(second, credential, true) {
        let offset = backing.resolve(layout.header_offset())?;
        backing.write_at(offset, second)?;
        restored_any = true;
    }

    if restored_any {
        Ok(())
    } else {
        Err(CoreError::PasswordIncorrect { path: path.to_path_buf() })
    }
}

fn decodable_layout(half: &[u8], credential: &[u8], hidden: bool) -> Option<VolumeLayout> {
    let candidates: &[VolumeLayout] = if hidden { &[VolumeLayout::HiddenV2, VolumeLayout::HiddenV1] } else { &[VolumeLayout::NormalV2, VolumeLayout::NormalV1] };
    for &layout in candidates {
        let mut mem = MemBacking::from_bytes(half.to_vec());
        if decrypt_header(&mut mem, 0, layout, credential).is_ok() {
            return Some(layout);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_header::{mix_credentials, VolumePassword};
    use basalt_io::FileBacking;
    use basalt_kdf::by_name;
    use basalt_primitives::CascadeKind;
    use tempfile::NamedTempFile;

    fn rng() -> RngPool {
        let pool = RngPool::new();
        pool.start().unwrap();
        pool
    }

    fn create(path: &Path, size: u64, password: &str) -> Vec<u8> {
        let credential = mix_credentials(&VolumePassword::new(password).unwrap(), &[]).unwrap().to_vec();
        let rng = rng();
        let options = crate::creator::CreationOptions {
            target_path: path.to_path_buf(),
            requested_size: size,
            cascade: CascadeKind::Aes,
            kdf: by_name("Argon2id").unwrap(),
            quick: true,
            credential_material: credential.clone(),
            hidden: None,
        };
        crate::creator::VolumeCreator::start(options, std::sync::Arc::new(rng)).join().unwrap();
        credential
    }

    #[test]
    fn change_password_preserves_master_key() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        let old_credential = create(&path, 2 * 1024 * 1024, "old password");

        let rng = rng();
        let mut backing = FileBacking::open(&path, false).unwrap();

        let new_credential = mix_credentials(&VolumePassword::new("new password").unwrap(), &[]).unwrap().to_vec();
        change_password(&path, &mut backing, &rng, &old_credential, &new_credential, None).unwrap();

        let mut reopened = FileBacking::open(&path, true).unwrap();
        let decoded_old = decrypt_header(&mut reopened, 0, VolumeLayout::NormalV2, &old_credential);
        assert!(decoded_old.is_err());

        let decoded_new = decrypt_header(&mut reopened, 0, VolumeLayout::NormalV2, &new_credential).unwrap();
        assert_eq!(decoded_new.fields.volume_size, 2 * 1024 * 1024);
    }

    #[test]
    fn change_password_can_upgrade_kdf_with_same_password() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        let credential = create(&path, 2 * 1024 * 1024, "same password");

        let rng = rng();
        let mut backing = FileBacking::open(&path, false).unwrap();
        change_password(&path, &mut backing, &rng, &credential, &credential, Some(by_name("PBKDF2-HMAC-SHA-512").unwrap())).unwrap();

        let mut reopened = FileBacking::open(&path, true).unwrap();
        let decoded = decrypt_header(&mut reopened, 0, VolumeLayout::NormalV2, &credential).unwrap();
        assert_eq!(decoded.kdf_name, "PBKDF2-HMAC-SHA-512");
    }

    #[test]
    fn backup_then_restore_recovers_a_zeroed_header() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        let credential = create(&path, 2 * 1024 * 1024, "backup me");

        let rng = rng();
        let mut backing = FileBacking::open(&path, false).unwrap();
        let backup_bytes = backup_headers(&path, &mut backing, &rng, &credential, None).unwrap();
        assert_eq!(backup_bytes.len(), 2 * HEADER_SIZE);

        // Destroy the primary header.
        backing.write_at(0, &[0u8; HEADER_SIZE]).unwrap();
        assert!(decrypt_header(&mut backing, 0, VolumeLayout::NormalV2, &credential).is_err());

        restore_from_file_bytes(&path, &mut backing, &backup_bytes, &credential).unwrap();
        let decoded = decrypt_header(&mut backing, 0, VolumeLayout::NormalV2, &credential).unwrap();
        assert_eq!(decoded.fields.volume_size, 2 * 1024 * 1024);
    }

    #[test]
    fn internal_backup_restores_a_zeroed_primary_header() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        let credential = create(&path, 2 * 1024 * 1024, "internal backup");

        let mut backing = FileBacking::open(&path, false).unwrap();
        backing.write_at(0, &[0u8; HEADER_SIZE]).unwrap();
        assert!(decrypt_header(&mut backing, 0, VolumeLayout::NormalV2, &credential).is_err());

        restore_from_internal_backup(&path, &mut backing, &credential).unwrap();
        let decoded = decrypt_header(&mut backing, 0, VolumeLayout::NormalV2, &credential).unwrap();
        assert_eq!(decoded.fields.volume_size, 2 * 1024 * 1024);
    }
}
