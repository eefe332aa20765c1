//! The `Volume` runtime object: an open, mounted volume's backing handle,
//! keyed mode engine, and protection state. Sector I/O always goes through
//! the worker pool; nothing here touches the backing handle directly
//! except `Volume` itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use basalt_header::{build_mode, decrypt_header, HeaderFields, MasterKey, VolumeLayout};
use basalt_io::BackingFile;
use basalt_mode::Mode;
use basalt_pool::WorkerPool;

use crate::error::{CoreError, Result};

/// The inner volume's byte range, tracked only when hidden-volume
/// protection is active for this mount.
struct Protection {
    inner_start: u64,
    inner_end: u64,
    triggered: bool,
}

pub struct Volume {
    path: PathBuf,
    backing: Box<dyn BackingFile>,
    fields: HeaderFields,
    master_key: MasterKey,
    mode_engine: Box<dyn Mode>,
    pool: Arc<WorkerPool>,
    read_only: bool,
    kdf_name: &'static str,
    protection: Option<Protection>,
    bytes_read: u64,
    bytes_written: u64,
}

/// Everything `Volume::open` needs besides the backing handle and pool:
/// the credential material for the outer volume, and optionally a second
/// set for a hidden volume the caller wants write-protected.
pub struct OpenCredentials<'a> {
    pub outer: &'a [u8],
    pub hidden_protection: Option<&'a [u8]>,
}

impl Volume {
    /// Tries every layout in turn (current format before legacy, normal
    /// before hidden) and binds to the first whose header decrypts. If
    /// `hidden_protection` credentials are supplied and the outer volume
    /// unlocked, a second trial against the embedded hidden header marks
    /// the inner range as write-protected.
    pub fn open(
        path: impl Into<PathBuf>,
        mut backing: Box<dyn BackingFile>,
        credentials: OpenCredentials<'_>,
        read_only: bool,
        pool: Arc<WorkerPool>,
    ) -> Result<Volume> {
        let path = path.into();

        let mut opened = None;
        for &layout in VolumeLayout::all() {
            let offset = match backing.resolve(layout.header_offset()) {
                Ok(o) => o,
                Err(_) => continue,
            };
            match decrypt_header(backing.as_mut(), offset, layout, credentials.outer) {
                Ok(decoded) => {
                    opened = Some((layout, decoded));
                    break;
                }
                Err(_) => continue,
            }
        }

        let (layout, decoded) = opened.ok_or_else(|| {
            warn!(path = %path.display(), "no layout/KDF/cascade combination unlocked this header");
            CoreError::PasswordIncorrect { path: path.clone() }
        })?;

        let mode_engine = build_mode(decoded.master_key.mode(), decoded.master_key.cascade(), decoded.master_key.as_bytes(), decoded.fields.sector_size)?;

        let protection = if let Some(inner_creds) = credentials.hidden_protection {
            Self::try_hidden_protection(backing.as_mut(), layout, inner_creds)
        } else {
            None
        };

        info!(path = %path.display(), layout = ?layout, kdf = decoded.kdf_name, "volume opened");

        Ok(Volume {
            path,
            backing,
            fields: decoded.fields,
            master_key: decoded.master_key,
            mode_engine,
            pool,
            read_only,
            kdf_name: decoded.kdf_name,
            protection,
            bytes_read: 0,
            bytes_written: 0,
        })
    }

    fn try_hidden_protection(backing: &mut dyn BackingFile, outer_layout: VolumeLayout, inner_creds: &[u8]) -> Option<Protection> {
        let hidden_layout = match outer_layout {
            VolumeLayout::NormalV2 => VolumeLayout::HiddenV2,
            VolumeLayout::NormalV1 => VolumeLayout::HiddenV1,
            // A hidden volume cannot itself carry a nested hidden-protection
            // credential; nothing to try.
            VolumeLayout::HiddenV1 | VolumeLayout::HiddenV2 => return None,
        };
        let offset = backing.resolve(hidden_layout.header_offset()).ok()?;
        let decoded = decrypt_header(backing, offset, hidden_layout, inner_creds).ok()?;
        Some(Protection {
            inner_start: decoded.fields.master_key_offset,
            inner_end: decoded.fields.master_key_offset + decoded.fields.encrypted_area_size,
            triggered: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.fields.volume_size
    }

    pub fn sector_size(&self) -> u32 {
        self.fields.sector_size
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn cascade_name(&self) -> &'static str {
        self.master_key.cascade().name()
    }

    pub fn mode_name(&self) -> &'static str {
        self.master_key.mode().name()
    }

    pub fn kdf_name(&self) -> &'static str {
        self.kdf_name
    }

    pub fn hidden_protection_enabled(&self) -> bool {
        self.protection.is_some()
    }

    pub fn hidden_protection_triggered(&self) -> bool {
        self.protection.as_ref().is_some_and(|p| p.triggered)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn check_alignment(&self, offset: u64, len: usize) -> Result<()> {
        let sector_size = self.fields.sector_size as u64;
        if offset % sector_size != 0 || (len as u64) % sector_size != 0 {
            return Err(CoreError::ParameterIncorrect(format!("offset {offset} / length {len} not a multiple of the sector size {sector_size}")));
        }
        if offset + len as u64 > self.fields.encrypted_area_size {
            return Err(CoreError::ParameterIncorrect(format!(
                "range [{offset}, {}) exceeds the volume's encrypted area of {} bytes",
                offset + len as u64,
                self.fields.encrypted_area_size
            )));
        }
        Ok(())
    }

    /// Reads `buf.len()` bytes starting at the volume-relative
    /// `byte_offset`, decrypting in place via the worker pool.
    pub fn read(&mut self, byte_offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_alignment(byte_offset, buf.len())?;
        let backing_offset = self.fields.master_key_offset + byte_offset;
        self.backing.read_at(backing_offset, buf)?;
        let base_sector = byte_offset / self.fields.sector_size as u64;
        self.pool.run(self.mode_engine.as_ref(), buf, base_sector, self.fields.sector_size, false)?;
        self.bytes_read += buf.len() as u64;
        Ok(())
    }

    /// Writes `plaintext` at the volume-relative `byte_offset`, refusing
    /// before any backing-file mutation if the range overlaps a
    /// protected hidden-volume range.
    pub fn write(&mut self, byte_offset: u64, plaintext: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(CoreError::VolumeReadOnly { path: self.path.clone() });
        }
        self.check_alignment(byte_offset, plaintext.len())?;

        if let Some(protection) = &mut self.protection {
            let backing_start = self.fields.master_key_offset + byte_offset;
            let backing_end = backing_start + plaintext.len() as u64;
            if backing_start < protection.inner_end && backing_end > protection.inner_start {
                protection.triggered = true;
                warn!(path = %self.path.display(), "write refused: overlaps the protected hidden volume");
                return Err(CoreError::VolumeProtected);
            }
        }

        let mut ciphertext = plaintext.to_vec();
        let base_sector = byte_offset / self.fields.sector_size as u64;
        self.pool.run(self.mode_engine.as_ref(), &mut ciphertext, base_sector, self.fields.sector_size, true)?;

        let backing_offset = self.fields.master_key_offset + byte_offset;
        self.backing.write_at(backing_offset, &ciphertext)?;
        self.bytes_written += plaintext.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.backing.flush()?;
        Ok(())
    }
}

#[cfg(test)]
impl Volume {
    /// Builds a `Volume` around an already-decided header, bypassing
    /// trial-decryption entirely. Used only by the mounted-volume table's
    /// own tests, which exercise slot bookkeeping and never touch I/O.
    pub(crate) fn for_testing(path: impl Into<PathBuf>, backing: Box<dyn BackingFile>, pool: Arc<WorkerPool>) -> Volume {
        use basalt_primitives::CascadeKind;
        use basalt_mode::ModeKind;

        let cascade = CascadeKind::Aes;
        let mode = ModeKind::Xts;
        let key = vec![0u8; build_mode_key_len_for_tests(mode, cascade)];
        let mode_engine = build_mode(mode, cascade, &key, 512).expect("fixed test parameters always build");

        Volume {
            path: path.into(),
            backing,
            fields: HeaderFields {
                version: 2,
                min_version: 1,
                creation_time: 0,
                modification_time: 0,
                hidden_volume_size: 0,
                volume_size: 1024 * 1024,
                master_key_offset: 65536,
                encrypted_area_size: 1024 * 1024 - 2 * 65536,
                flags: basalt_header::HeaderFlags::empty(),
                sector_size: 512,
                master_key_area: [0u8; 256],
            },
            master_key: MasterKey::new(key, cascade, mode),
            mode_engine,
            pool,
            read_only: false,
            kdf_name: "test",
            protection: None,
            bytes_read: 0,
            bytes_written: 0,
        }
    }
}

#[cfg(test)]
fn build_mode_key_len_for_tests(mode: basalt_mode::ModeKind, cascade: basalt_primitives::CascadeKind) -> usize {
    match mode {
        basalt_mode::ModeKind::Xts => basalt_mode::XtsMode::key_len(cascade),
        basalt_mode::ModeKind::Lrw => basalt_mode::LrwMode::key_len(cascade),
        basalt_mode::ModeKind::Cbc => basalt_mode::CbcMode::key_len(cascade),
    }
}
