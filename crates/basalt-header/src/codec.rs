//! The decrypt/encrypt protocol: trial-decryption across the KDF registry
//! and every cascade/mode a layout allows, and writeback of a freshly
//! salted, freshly timestamped header.

use thiserror::Error;

use basalt_io::BackingFile;
use basalt_kdf::{mount_order, KdfKind};
use basalt_mode::{CbcMode, LrwMode, Mode, ModeKind, XtsMode};
use basalt_primitives::CascadeKind;
use basalt_rng::Pool as RngPool;

use crate::fields::{HeaderFields, HeaderFlags, CIPHERTEXT_LEN, CURRENT_VERSION, MASTER_KEY_AREA_LEN, MINIMUM_COMPATIBLE_VERSION};
use crate::layout::{VolumeLayout, HEADER_SIZE};
use crate::master_key::MasterKey;

pub const SALT_LEN: usize = 64;

/// The fixed sector index the header area itself is encrypted under. Not a
/// real volume sector — headers have no neighboring sectors to stay
/// consistent with — but mode engines need some index, so this is a fixed
/// convention rather than a magic zero scattered through the code.
const HEADER_SECTOR_INDEX: u64 = 0;

#[derive(Debug, Error)]
pub enum HeaderCodecError {
    #[error("backing I/O error: {0}")]
    Io(#[from] basalt_io::BackingError),
    #[error("no credential, cascade, and mode combination unlocked this header")]
    Undecipherable,
    #[error("mode engine rejected its derived key: {0}")]
    BadModeKey(#[from] basalt_mode::ModeError),
}

pub struct DecodedHeader {
    pub fields: HeaderFields,
    pub master_key: MasterKey,
    pub kdf_name: &'static str,
}

pub fn key_len_for(mode: ModeKind, cascade: CascadeKind) -> usize {
    match mode {
        ModeKind::Xts => XtsMode::key_len(cascade),
        ModeKind::Lrw => LrwMode::key_len(cascade),
        ModeKind::Cbc => CbcMode::key_len(cascade),
    }
}

/// Builds the keyed mode engine for `mode`/`cascade`/`key`. `sector_size`
/// only matters to LRW, which needs to know how many 16-byte blocks
/// precede each sector; callers decrypting the header itself pass
/// `HEADER_SIZE`, callers building a volume's data-sector engine pass the
/// volume's real sector size.
pub fn build_mode(mode: ModeKind, cascade: CascadeKind, key: &[u8], sector_size: u32) -> Result<Box<dyn Mode>, basalt_mode::ModeError> {
    Ok(match mode {
        ModeKind::Xts => Box::new(XtsMode::new(cascade, key)?),
        ModeKind::Lrw => Box::new(LrwMode::new(cascade, key, sector_size)?),
        ModeKind::Cbc => Box::new(CbcMode::new(cascade, key)?),
    })
}

/// Tries every (KDF, cascade, mode) combination the layout allows, in the
/// registry's legacy-first order, against the 512 bytes read from
/// `offset`. The first combination whose derived key makes both CRC32s in
/// the decrypted area check out wins.
pub fn decrypt_header(
    backing: &mut dyn BackingFile,
    offset: u64,
    layout: VolumeLayout,
    credential_material: &[u8],
) -> Result<DecodedHeader, HeaderCodecError> {
    let mut raw = [0u8; HEADER_SIZE];
    backing.read_at(offset, &mut raw)?;
    let salt = &raw[..SALT_LEN];
    let ciphertext: [u8; CIPHERTEXT_LEN] = raw[SALT_LEN..].try_into().expect("448-byte split of a 512-byte header");

    for kdf in mount_order() {
        for &cascade in layout.supported_cascades() {
            for &mode in layout.supported_modes() {
                let key_len = key_len_for(mode, cascade);
                let dk = kdf.derive(credential_material, salt, key_len);

                let mode_engine = match build_mode(mode, cascade, &dk, HEADER_SIZE as u32) {
                    Ok(m) => m,
                    Err(_) => continue,
                };

                let mut candidate = ciphertext;
                mode_engine.decrypt_sector(&mut candidate, HEADER_SECTOR_INDEX);

                if let Ok(fields) = HeaderFields::decode(CURRENT_VERSION, &candidate) {
                    let key_bytes = fields.master_key_area[..key_len].to_vec();
                    return Ok(DecodedHeader {
                        fields,
                        master_key: MasterKey::new(key_bytes, cascade, mode),
                        kdf_name: kdf.name,
                    });
                }
            }
        }
    }

    Err(HeaderCodecError::Undecipherable)
}

/// Writes a fresh header: draws a new 64-byte salt from the RNG pool
/// (never reusing the old one, even on an unchanged password), stamps the
/// modification time, and re-encrypts under the given cascade/mode/KDF.
#[allow(clippy::too_many_arguments)]
pub fn encrypt_header(
    backing: &mut dyn BackingFile,
    offset: u64,
    rng: &RngPool,
    kdf: KdfKind,
    cascade: CascadeKind,
    mode: ModeKind,
    credential_material: &[u8],
    mut fields: HeaderFields,
) -> Result<(), HeaderCodecError> {
    let mut salt = [0u8; SALT_LEN];
    rng.get_data(&mut salt).expect("RNG pool must be running before any header is written");

    fields.version = CURRENT_VERSION;
    fields.min_version = fields.min_version.max(MINIMUM_COMPATIBLE_VERSION);

    let key_len = key_len_for(mode, cascade);
    let dk = kdf.derive(credential_material, &salt, key_len);
    let mode_engine = build_mode(mode, cascade, &dk, HEADER_SIZE as u32)?;

    let mut plaintext = fields.encode();
    mode_engine.encrypt_sector(&mut plaintext, HEADER_SECTOR_INDEX);

    let mut raw = [0u8; HEADER_SIZE];
    raw[..SALT_LEN].copy_from_slice(&salt);
    raw[SALT_LEN..].copy_from_slice(&plaintext);
    backing.write_at(offset, &raw)?;
    Ok(())
}

/// Builds a fresh, random 512-byte block that is encrypted under a
/// throwaway cascade/key and is therefore indistinguishable from a real
/// header slot that simply hasn't been unlocked — used to fill the hidden
/// half of a backup file when no hidden volume exists.
pub fn random_header_shaped_block(rng: &RngPool) -> [u8; HEADER_SIZE] {
    let mut block = [0u8; HEADER_SIZE];
    rng.get_data(&mut block).expect("RNG pool must be running to fabricate a decoy block");
    block
}

pub const MASTER_KEY_AREA_CAPACITY: usize = MASTER_KEY_AREA_LEN;
pub const DEFAULT_FLAGS: HeaderFlags = HeaderFlags::empty();

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_io::MemBacking;
    use basalt_rng::Pool;

    fn fresh_fields(master_key_area: [u8; MASTER_KEY_AREA_LEN]) -> HeaderFields {
        HeaderFields {
            version: CURRENT_VERSION,
            min_version: MINIMUM_COMPATIBLE_VERSION,
            creation_time: 1_700_000_000,
            modification_time: 1_700_000_000,
            hidden_volume_size: 0,
            volume_size: 10 * 1024 * 1024,
            master_key_offset: crate::layout::HEADER_GROUP_SIZE,
            encrypted_area_size: 10 * 1024 * 1024 - 2 * crate::layout::HEADER_GROUP_SIZE,
            flags: DEFAULT_FLAGS,
            sector_size: 512,
            master_key_area,
        }
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let rng = Pool::new();
        rng.start().unwrap();
        let mut backing = MemBacking::new(HEADER_SIZE);
        let kdf = basalt_kdf::by_name("PBKDF2-HMAC-SHA-512").unwrap();
        let cascade = CascadeKind::Aes;
        let mode = ModeKind::Xts;
        let credential = [0x11u8; 64];

        let key_len = key_len_for(mode, cascade);
        let mut master_key_area = [0u8; MASTER_KEY_AREA_LEN];
        for (i, b) in master_key_area.iter_mut().enumerate().take(key_len) {
            *b = i as u8;
        }

        encrypt_header(&mut backing, 0, &rng, kdf, cascade, mode, &credential, fresh_fields(master_key_area)).unwrap();

        let decoded = decrypt_header(&mut backing, 0, VolumeLayout::NormalV2, &credential).unwrap();
        assert_eq!(decoded.master_key.as_bytes(), &master_key_area[..key_len]);
        assert_eq!(decoded.kdf_name, "PBKDF2-HMAC-SHA-512");
    }

    #[test]
    fn wrong_credential_never_unlocks() {
        let rng = Pool::new();
        rng.start().unwrap();
        let mut backing = MemBacking::new(HEADER_SIZE);
        let kdf = basalt_kdf::by_name("PBKDF2-HMAC-SHA-512").unwrap();
        encrypt_header(
            &mut backing,
            0,
            &rng,
            kdf,
            CascadeKind::Aes,
            ModeKind::Xts,
            &[0x22u8; 64],
            fresh_fields([0u8; MASTER_KEY_AREA_LEN]),
        )
        .unwrap();

        let result = decrypt_header(&mut backing, 0, VolumeLayout::NormalV2, &[0x99u8; 64]);
        assert!(matches!(result, Err(HeaderCodecError::Undecipherable)));
    }

    #[test]
    fn fresh_salt_differs_across_writes() {
        let rng = Pool::new();
        rng.start().unwrap();
        let mut a = MemBacking::new(HEADER_SIZE);
        let mut b = MemBacking::new(HEADER_SIZE);
        let kdf = basalt_kdf::by_name("PBKDF2-HMAC-SHA-512").unwrap();
        let credential = [0x33u8; 64];

        encrypt_header(&mut a, 0, &rng, kdf, CascadeKind::Aes, ModeKind::Xts, &credential, fresh_fields([0u8; MASTER_KEY_AREA_LEN])).unwrap();
        encrypt_header(&mut b, 0, &rng, kdf, CascadeKind::Aes, ModeKind::Xts, &credential, fresh_fields([0u8; MASTER_KEY_AREA_LEN])).unwrap();

        assert_ne!(a.as_slice(), b.as_slice());
    }
}
