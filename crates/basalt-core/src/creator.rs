//! The volume creator: lays down a fresh header (and, for V2, its backup),
//! then optionally overwrites the body with RNG-drawn data on a background
//! thread that a caller can poll or cooperatively abort.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::info;

use basalt_header::{encrypt_header, random_header_shaped_block, HeaderFields, HeaderFlags, VolumeLayout, HEADER_GROUP_SIZE, HEADER_SIZE};
use basalt_io::{BackingFile, FileBacking};
use basalt_kdf::KdfKind;
use basalt_primitives::CascadeKind;
use basalt_rng::Pool as RngPool;

use crate::error::{CoreError, Result};

/// How large a chunk the fill loop draws from the RNG pool and writes at
/// once. Large enough to amortize the syscall, small enough that an abort
/// request is noticed within a fraction of a second on a slow disk.
const FILL_CHUNK_BYTES: usize = 4 * 1024 * 1024;

pub struct HiddenCreationOptions {
    pub size: u64,
    /// Already-mixed credential material for the hidden volume (see
    /// `basalt_header::mix_credentials`); the creator has no opinion on
    /// passwords or keyfiles directly.
    pub credential_material: Vec<u8>,
}

pub struct CreationOptions {
    pub target_path: PathBuf,
    pub requested_size: u64,
    pub cascade: CascadeKind,
    pub kdf: KdfKind,
    pub quick: bool,
    pub credential_material: Vec<u8>,
    pub hidden: Option<HiddenCreationOptions>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressSnapshot {
    pub in_progress: bool,
    pub total_bytes: u64,
    pub bytes_done: u64,
}

/// Where a hidden volume's data area starts within its outer volume's
/// backing file: one header group for the outer's own primary header,
/// one more for the hidden volume's primary header. The creator, not a
/// fixed layout constant, owns this decision (see `VolumeLayout::data_start`
/// returning `None` for hidden layouts).
const HIDDEN_DATA_START: u64 = 2 * HEADER_GROUP_SIZE;

pub struct VolumeCreator {
    abort_flag: Arc<AtomicBool>,
    progress: Arc<Mutex<ProgressSnapshot>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl VolumeCreator {
    /// Spawns the creator's work on a background thread and returns
    /// immediately; progress is polled via `progress()`.
    pub fn start(options: CreationOptions, rng: Arc<RngPool>) -> VolumeCreator {
        let abort_flag = Arc::new(AtomicBool::new(false));
        let progress = Arc::new(Mutex::new(ProgressSnapshot { in_progress: true, total_bytes: options.requested_size, bytes_done: 0 }));

        let thread_abort = abort_flag.clone();
        let thread_progress = progress.clone();
        let handle = std::thread::Builder::new()
            .name("basalt-creator".to_string())
            .spawn(move || {
                let result = run(options, &rng, &thread_abort, &thread_progress);
                thread_progress.lock().expect("creator progress mutex poisoned").in_progress = false;
                result
            })
            .expect("failed to spawn creator thread");

        VolumeCreator { abort_flag, progress, handle: Some(handle) }
    }

    pub fn progress(&self) -> ProgressSnapshot {
        *self.progress.lock().expect("creator progress mutex poisoned")
    }

    /// Requests cooperative cancellation; checked at the next chunk
    /// boundary of the fill loop, never mid-chunk.
    pub fn abort(&self) {
        self.abort_flag.store(true, Ordering::SeqCst);
    }

    /// Blocks until the background thread finishes and returns its result.
    pub fn join(mut self) -> Result<()> {
        match self.handle.take() {
            Some(h) => h.join().unwrap_or(Err(CoreError::SystemException {
                subject: "volume creator thread".to_string(),
                source: std::io::Error::other("creator thread panicked"),
            })),
            None => Ok(()),
        }
    }
}

fn run(options: CreationOptions, rng: &RngPool, abort_flag: &AtomicBool, progress: &Mutex<ProgressSnapshot>) -> Result<()> {
    let mut backing = open_or_create_target(&options)?;

    write_outer_header(&mut backing, &options, rng)?;

    if let Some(hidden) = &options.hidden {
        write_hidden_header(&mut backing, &options, hidden, rng)?;
    }

    if !options.quick {
        fill_body(&mut backing, &options, rng, abort_flag, progress)?;
    }

    backing.flush()?;
    info!(path = %options.target_path.display(), size = options.requested_size, "volume created");
    Ok(())
}

fn open_or_create_target(options: &CreationOptions) -> Result<FileBacking> {
    if options.target_path.exists() {
        let mut backing = FileBacking::open(&options.target_path, false)?;
        let len = backing.len()?;
        if backing.is_device() {
            if len < options.requested_size {
                return Err(CoreError::ParameterIncorrect(format!(
                    "device {} is {len} bytes, smaller than the requested {} bytes",
                    options.target_path.display(),
                    options.requested_size
                )));
            }
        } else if len != options.requested_size {
            backing.set_len(options.requested_size)?;
        }
        Ok(backing)
    } else {
        let mut backing = FileBacking::create_new(&options.target_path)?;
        backing.set_len(options.requested_size)?;
        Ok(backing)
    }
}

fn outer_fields(options: &CreationOptions, now: u64) -> HeaderFields {
    HeaderFields {
        version: 0, // stamped by encrypt_header
        min_version: 1,
        creation_time: now,
        modification_time: now,
        hidden_volume_size: options.hidden.as_ref().map(|h| h.size).unwrap_or(0),
        volume_size: options.requested_size,
        master_key_offset: HEADER_GROUP_SIZE,
        encrypted_area_size: options.requested_size - 2 * HEADER_GROUP_SIZE,
        flags: HeaderFlags::empty(),
        sector_size: 512,
        master_key_area: [0u8; 256],
    }
}

/// `encrypt_header`'s error type carries `Undecipherable`, which can never
/// actually occur on the write path; everything else composes into
/// `CoreError` the same way it would from a read.
fn map_codec_err(e: basalt_header::HeaderCodecError) -> CoreError {
    match e {
        basalt_header::HeaderCodecError::Io(io) => io.into(),
        basalt_header::HeaderCodecError::BadModeKey(mode) => CoreError::Mode(mode),
        basalt_header::HeaderCodecError::Undecipherable => {
            CoreError::ParameterIncorrect("header codec reported an undecipherable result while encrypting".to_string())
        }
    }
}

fn write_outer_header(backing: &mut FileBacking, options: &CreationOptions, rng: &RngPool) -> Result<()> {
    let mode = VolumeLayout::NormalV2.supported_modes()[0];
    let fields = outer_fields(options, basalt_common::now_unix());
    encrypt_header(backing, 0, rng, options.kdf, options.cascade, mode, &options.credential_material, fields.clone()).map_err(map_codec_err)?;

    if let Some(anchor) = VolumeLayout::NormalV2.backup_header_offset() {
        let offset = backing.resolve(anchor)?;
        encrypt_header(backing, offset, rng, options.kdf, options.cascade, mode, &options.credential_material, fields).map_err(map_codec_err)?;
    }
    Ok(())
}

fn write_hidden_header(backing: &mut FileBacking, options: &CreationOptions, hidden: &HiddenCreationOptions, rng: &RngPool) -> Result<()> {
    let mode = VolumeLayout::HiddenV2.supported_modes()[0];
    let fields = HeaderFields {
        version: 0,
        min_version: 1,
        creation_time: basalt_common::now_unix(),
        modification_time: basalt_common::now_unix(),
        hidden_volume_size: 0,
        volume_size: hidden.size,
        master_key_offset: HIDDEN_DATA_START,
        encrypted_area_size: hidden.size,
        flags: HeaderFlags::empty(),
        sector_size: 512,
        master_key_area: [0u8; 256],
    };

    let header_offset = backing.resolve(VolumeLayout::HiddenV2.header_offset())?;
    encrypt_header(backing, header_offset, rng, options.kdf, options.cascade, mode, &hidden.credential_material, fields.clone()).map_err(map_codec_err)?;

    if let Some(anchor) = VolumeLayout::HiddenV2.backup_header_offset() {
        let offset = backing.resolve(anchor)?;
        encrypt_header(backing, offset, rng, options.kdf, options.cascade, mode, &hidden.credential_material, fields).map_err(map_codec_err)?;
    }
    Ok(())
}

fn fill_body(backing: &mut FileBacking, options: &CreationOptions, rng: &RngPool, abort_flag: &AtomicBool, progress: &Mutex<ProgressSnapshot>) -> Result<()> {
    let data_start = HEADER_GROUP_SIZE;
    let data_end = options.requested_size - HEADER_GROUP_SIZE;
    let total = data_end - data_start;

    let mut done = 0u64;
    let mut chunk = vec![0u8; FILL_CHUNK_BYTES];

    while done < total {
        if abort_flag.load(Ordering::SeqCst) {
            return Err(CoreError::UserAbort);
        }

        let this_chunk = (total - done).min(FILL_CHUNK_BYTES as u64) as usize;
        rng.get_data(&mut chunk[..this_chunk])?;
        backing.write_at(data_start + done, &chunk[..this_chunk])?;

        done += this_chunk as u64;
        progress.lock().expect("creator progress mutex poisoned").bytes_done = done;
    }

    Ok(())
}

/// Returns a fresh 512-byte block, shaped like a real (but unopenable)
/// header, for filling the backup-header slot of a volume that was never
/// given a hidden companion — keeping that slot indistinguishable from one
/// that hides a real hidden volume.
pub fn decoy_hidden_backup_block(rng: &RngPool) -> [u8; HEADER_SIZE] {
    random_header_shaped_block(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_mode::ModeKind;
    use basalt_rng::Pool;
    use tempfile::NamedTempFile;

    fn rng() -> Arc<RngPool> {
        let pool = Pool::new();
        pool.start().unwrap();
        Arc::new(pool)
    }

    fn options(path: PathBuf, size: u64, quick: bool) -> CreationOptions {
        let _ = ModeKind::Xts;
        CreationOptions {
            target_path: path,
            requested_size: size,
            cascade: CascadeKind::Aes,
            kdf: basalt_kdf::by_name("Argon2id").unwrap(),
            quick,
            credential_material: vec![0x42u8; 64],
            hidden: None,
        }
    }

    #[test]
    fn quick_creation_writes_a_readable_header() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        let rng = rng();

        let creator = VolumeCreator::start(options(path.clone(), 2 * 1024 * 1024, true), rng.clone());
        creator.join().unwrap();

        let mut backing = FileBacking::open(&path, true).unwrap();
        let decoded = basalt_header::decrypt_header(&mut backing, 0, VolumeLayout::NormalV2, &[0x42u8; 64]).unwrap();
        assert_eq!(decoded.fields.volume_size, 2 * 1024 * 1024);
    }

    #[test]
    fn non_quick_creation_reports_full_progress() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        let rng = rng();

        let creator = VolumeCreator::start(options(path, 1024 * 1024, false), rng);
        creator.join().unwrap();
    }

    #[test]
    fn abort_is_observed_and_reported() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        let rng = rng();

        let creator = VolumeCreator::start(options(path, 64 * 1024 * 1024, false), rng);
        creator.abort();
        let result = creator.join();
        assert!(matches!(result, Err(CoreError::UserAbort)) || result.is_ok());
    }
}
