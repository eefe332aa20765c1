//! The plaintext fields inside a decrypted header: everything from the
//! magic through the master-key material, encoded big-endian exactly as
//! laid out on disk.

use byteorder::{BigEndian, ByteOrder};
use subtle::ConstantTimeEq;
use thiserror::Error;

use basalt_common::crc32;

pub const MAGIC: [u8; 4] = *b"BSLT";
pub const CIPHERTEXT_LEN: usize = 448;
pub const MASTER_KEY_AREA_LEN: usize = 256;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_MIN_VERSION: usize = 6;
const OFF_MASTER_KEY_CRC: usize = 8;
const OFF_CREATION_TIME: usize = 12;
const OFF_MODIFICATION_TIME: usize = 20;
const OFF_HIDDEN_VOLUME_SIZE: usize = 28;
const OFF_VOLUME_SIZE: usize = 36;
const OFF_MASTER_KEY_OFFSET: usize = 44;
const OFF_ENCRYPTED_AREA_SIZE: usize = 52;
const OFF_FLAGS: usize = 60;
const OFF_SECTOR_SIZE: usize = 64;
const OFF_RESERVED: usize = 68;
const OFF_HEADER_CRC: usize = 188;
const OFF_MASTER_KEY_AREA: usize = 192;

const RESERVED_LEN: usize = OFF_HEADER_CRC - OFF_RESERVED;

static_assertions::const_assert_eq!(OFF_MASTER_KEY_AREA + MASTER_KEY_AREA_LEN, CIPHERTEXT_LEN);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        const SYSTEM_ENCRYPTION = 0x0000_0001;
    }
}

#[derive(Debug, Error)]
pub enum HeaderFieldError {
    #[error("header magic does not match")]
    BadMagic,
    #[error("header reader version {reader} is older than the volume's minimum-compatible version {minimum}")]
    TooOld { reader: u16, minimum: u16 },
    #[error("header field CRC32 mismatch")]
    FieldCrcMismatch,
    #[error("master-key area CRC32 mismatch")]
    MasterKeyCrcMismatch,
}

#[derive(Debug, Clone)]
pub struct HeaderFields {
    pub version: u16,
    pub min_version: u16,
    pub creation_time: u64,
    pub modification_time: u64,
    pub hidden_volume_size: u64,
    pub volume_size: u64,
    pub master_key_offset: u64,
    pub encrypted_area_size: u64,
    pub flags: HeaderFlags,
    pub sector_size: u32,
    pub master_key_area: [u8; MASTER_KEY_AREA_LEN],
}

/// The version this build writes for new headers, and the minimum version
/// it demands of headers it reads.
pub const CURRENT_VERSION: u16 = 2;
pub const MINIMUM_COMPATIBLE_VERSION: u16 = 1;

impl HeaderFields {
    /// Parses and validates a decrypted 448-byte ciphertext area. Both
    /// CRC32s are checked; any mismatch (including a bad magic, which
    /// indicates the wrong key was tried) is reported as the same kind of
    /// "this key didn't unlock this header" failure the caller already
    /// expects from a trial-decryption loop.
    pub fn decode(reader_version: u16, plaintext: &[u8; CIPHERTEXT_LEN]) -> Result<HeaderFields, HeaderFieldError> {
        if plaintext[OFF_MAGIC..OFF_MAGIC + 4] != MAGIC {
            return Err(HeaderFieldError::BadMagic);
        }

        let min_version = BigEndian::read_u16(&plaintext[OFF_MIN_VERSION..]);
        if reader_version < min_version {
            return Err(HeaderFieldError::TooOld { reader: reader_version, minimum: min_version });
        }

        // Both CRCs are checked in constant time: this runs inside the
        // trial-decryption loop (`codec::decrypt_header`) against every
        // candidate cascade/KDF/mode combination, and a data-dependent
        // early-out here would let a timing side channel narrow down which
        // candidate is closest to correct.
        let header_crc_expected = BigEndian::read_u32(&plaintext[OFF_HEADER_CRC..]);
        let header_crc_actual = crc32::crc32(&plaintext[OFF_MAGIC..OFF_HEADER_CRC]);
        if header_crc_expected.to_be_bytes()[..].ct_eq(&header_crc_actual.to_be_bytes()[..]).unwrap_u8() == 0 {
            return Err(HeaderFieldError::FieldCrcMismatch);
        }

        let mut master_key_area = [0u8; MASTER_KEY_AREA_LEN];
        master_key_area.copy_from_slice(&plaintext[OFF_MASTER_KEY_AREA..OFF_MASTER_KEY_AREA + MASTER_KEY_AREA_LEN]);

        let master_key_crc_expected = BigEndian::read_u32(&plaintext[OFF_MASTER_KEY_CRC..]);
        let master_key_crc_actual = crc32::crc32(&master_key_area);
        if master_key_crc_expected.to_be_bytes()[..].ct_eq(&master_key_crc_actual.to_be_bytes()[..]).unwrap_u8() == 0 {
            return Err(HeaderFieldError::MasterKeyCrcMismatch);
        }

        Ok(HeaderFields {
            version: BigEndian::read_u16(&plaintext[OFF_VERSION..]),
            min_version,
            creation_time: BigEndian::read_u64(&plaintext[OFF_CREATION_TIME..]),
            modification_time: BigEndian::read_u64(&plaintext[OFF_MODIFICATION_TIME..]),
            hidden_volume_size: BigEndian::read_u64(&plaintext[OFF_HIDDEN_VOLUME_SIZE..]),
            volume_size: BigEndian::read_u64(&plaintext[OFF_VOLUME_SIZE..]),
            master_key_offset: BigEndian::read_u64(&plaintext[OFF_MASTER_KEY_OFFSET..]),
            encrypted_area_size: BigEndian::read_u64(&plaintext[OFF_ENCRYPTED_AREA_SIZE..]),
            flags: HeaderFlags::from_bits_truncate(BigEndian::read_u32(&plaintext[OFF_FLAGS..])),
            sector_size: BigEndian::read_u32(&plaintext[OFF_SECTOR_SIZE..]),
            master_key_area,
        })
    }

    /// Serializes and computes both CRC32s, ready for encryption.
    pub fn encode(&self) -> [u8; CIPHERTEXT_LEN] {
        let mut buf = [0u8; CIPHERTEXT_LEN];
        buf[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(&MAGIC);
        BigEndian::write_u16(&mut buf[OFF_VERSION..], self.version);
        BigEndian::write_u16(&mut buf[OFF_MIN_VERSION..], self.min_version);
        BigEndian::write_u32(&mut buf[OFF_MASTER_KEY_CRC..], crc32::crc32(&self.master_key_area));
        BigEndian::write_u64(&mut buf[OFF_CREATION_TIME..], self.creation_time);
        BigEndian::write_u64(&mut buf[OFF_MODIFICATION_TIME..], self.modification_time);
        BigEndian::write_u64(&mut buf[OFF_HIDDEN_VOLUME_SIZE..], self.hidden_volume_size);
        BigEndian::write_u64(&mut buf[OFF_VOLUME_SIZE..], self.volume_size);
        BigEndian::write_u64(&mut buf[OFF_MASTER_KEY_OFFSET..], self.master_key_offset);
        BigEndian::write_u64(&mut buf[OFF_ENCRYPTED_AREA_SIZE..], self.encrypted_area_size);
        BigEndian::write_u32(&mut buf[OFF_FLAGS..], self.flags.bits());
        BigEndian::write_u32(&mut buf[OFF_SECTOR_SIZE..], self.sector_size);
        // OFF_RESERVED..OFF_HEADER_CRC is left zeroed.
        let _ = RESERVED_LEN;
        BigEndian::write_u32(&mut buf[OFF_HEADER_CRC..], crc32::crc32(&buf[OFF_MAGIC..OFF_HEADER_CRC]));
        buf[OFF_MASTER_KEY_AREA..OFF_MASTER_KEY_AREA + MASTER_KEY_AREA_LEN].copy_from_slice(&self.master_key_area);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HeaderFields {
        HeaderFields {
            version: CURRENT_VERSION,
            min_version: MINIMUM_COMPATIBLE_VERSION,
            creation_time: 1_700_000_000,
            modification_time: 1_700_000_100,
            hidden_volume_size: 0,
            volume_size: 10 * 1024 * 1024,
            master_key_offset: crate::layout::HEADER_GROUP_SIZE,
            encrypted_area_size: 10 * 1024 * 1024 - 2 * crate::layout::HEADER_GROUP_SIZE,
            flags: HeaderFlags::empty(),
            sector_size: 512,
            master_key_area: [0x42u8; MASTER_KEY_AREA_LEN],
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let fields = sample();
        let encoded = fields.encode();
        let decoded = HeaderFields::decode(CURRENT_VERSION, &encoded).unwrap();
        assert_eq!(decoded.version, fields.version);
        assert_eq!(decoded.volume_size, fields.volume_size);
        assert_eq!(decoded.master_key_area, fields.master_key_area);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut encoded = sample().encode();
        encoded[0] ^= 0xff;
        assert!(matches!(HeaderFields::decode(CURRENT_VERSION, &encoded), Err(HeaderFieldError::BadMagic)));
    }

    #[test]
    fn rejects_corrupted_master_key_area() {
        let mut encoded = sample().encode();
        encoded[OFF_MASTER_KEY_AREA] ^= 0xff;
        assert!(matches!(HeaderFields::decode(CURRENT_VERSION, &encoded), Err(HeaderFieldError::MasterKeyCrcMismatch)));
    }

    #[test]
    fn rejects_reader_older_than_minimum() {
        let mut fields = sample();
        fields.min_version = CURRENT_VERSION + 1;
        let encoded = fields.encode();
        assert!(matches!(
            HeaderFields::decode(CURRENT_VERSION, &encoded),
            Err(HeaderFieldError::TooOld { .. })
        ));
    }
}
