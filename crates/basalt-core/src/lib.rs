//! `basalt-core`: the Volume object, the mounted-volume table, the volume
//! creator, host-device enumeration, and the error taxonomy every public
//! operation raises. Deliberately stops short of shim lifecycle — that is
//! `basalt-shim`'s job, orchestrated from the `basalt` facade crate, so
//! this crate never depends on either.

pub mod config;
pub mod creator;
pub mod error;
pub mod host_device;
pub mod maintenance;
pub mod table;
pub mod volume;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use basalt_io::{BackingFile, FileBacking};
use basalt_primitives::hash::available_hashes;
use basalt_rng::Pool as RngPool;

pub use config::BasaltConfig;
pub use creator::{CreationOptions, HiddenCreationOptions, ProgressSnapshot, VolumeCreator};
pub use error::{CoreError, Result};
pub use host_device::{get_host_devices, DeviceProbe, HostDevice};
pub use table::{MountedVolumeTable, SharedVolume, VolumeInfo};
pub use volume::{OpenCredentials, Volume};

/// Ties together the long-lived subsystems a process embedding Basalt
/// needs exactly one of: the RNG pool, the worker pool, and the mounted-
/// volume table. Created at process init, torn down at shutdown; owns no
/// shim or IPC state.
pub struct Core {
    rng: Arc<RngPool>,
    pool: Arc<basalt_pool::WorkerPool>,
    table: Arc<MountedVolumeTable>,
    config: BasaltConfig,
    device_probe: Box<dyn DeviceProbe>,
}

impl Core {
    /// Starts the RNG pool (binding the configured mixing hash and drawing
    /// mandatory OS entropy) and the worker pool. Failure of either aborts
    /// init, matching §4.2/§4.7's hard requirement that both exist before
    /// any volume operation runs.
    pub fn init(config: BasaltConfig) -> Result<Core> {
        let rng = RngPool::new();
        if let Some(hash) = available_hashes().into_iter().find(|h| h.name() == config.rng_pool_hash) {
            rng.set_hash(hash);
        }
        rng.start()?;

        let pool = basalt_pool::WorkerPool::start();

        info!(workers = pool.worker_count(), rng_hash = %config.rng_pool_hash, "basalt core initialized");

        Ok(Core { rng: Arc::new(rng), pool, table: Arc::new(MountedVolumeTable::new()), config, device_probe: host_device::platform_probe() })
    }

    pub fn config(&self) -> &BasaltConfig {
        &self.config
    }

    pub fn mounted_volumes(&self) -> Vec<VolumeInfo> {
        self.table.list()
    }

    pub fn get_host_devices(&self, paths_only: bool) -> Vec<HostDevice> {
        get_host_devices(self.device_probe.as_ref(), paths_only)
    }

    /// Runs the known-answer and structural self-tests for every layer the
    /// core composes: ciphers/hashes (`basalt-primitives`), modes
    /// (`basalt-mode`), and KDFs (`basalt-kdf`). The first failure from any
    /// layer aborts the whole check, matching §6's "refuses to mount on
    /// failure".
    pub fn run_self_test(&self) -> Result<()> {
        basalt_primitives::selftest::run_self_test().map_err(|e| CoreError::TestFailed(e.to_string()))?;
        basalt_mode::selftest::run_self_test().map_err(|e| CoreError::TestFailed(e.to_string()))?;
        basalt_kdf::selftest::run_self_test().map_err(|e| CoreError::TestFailed(e.to_string()))?;
        Ok(())
    }

    pub fn create_keyfile(&self, path: &Path) -> Result<()> {
        let mut bytes = [0u8; 64];
        self.rng.get_data(&mut bytes)?;
        std::fs::write(path, bytes).map_err(|source| CoreError::SystemException { subject: path.display().to_string(), source })
    }

    /// Opens and decrypts the volume at `path`, registers it in the
    /// mounted-volume table, and returns its assigned slot. Does not touch
    /// the shim layer — the caller (the `basalt` facade) spawns a shim
    /// endpoint afterward and records its path via
    /// `MountedVolumeTable::set_virtual_device_path`.
    pub fn open_volume(&self, path: impl Into<PathBuf>, credentials: OpenCredentials<'_>, read_only: bool) -> Result<u32> {
        let path = path.into();
        if self.table.slot_for_path(&path).is_some() {
            return Err(CoreError::VolumeAlreadyMounted { path });
        }

        let backing = Box::new(FileBacking::open(&path, read_only)?) as Box<dyn BackingFile>;
        let volume = Volume::open(path, backing, credentials, read_only, self.pool.clone())?;
        self.table.insert(volume)
    }

    /// Flushes and drops the volume at `slot`, removing it from the table.
    /// Refuses if the shim layer has not already cleared its virtual
    /// device path for this slot, since a live shim endpoint still
    /// referencing the Volume would otherwise be left dangling.
    pub fn close_volume(&self, slot: u32) -> Result<()> {
        {
            let info = self.table.list().into_iter().find(|v| v.slot == slot).ok_or(CoreError::MountedVolumeInUse { slot })?;
            if info.virtual_device_path.is_some() {
                return Err(CoreError::MountedVolumeInUse { slot });
            }
        }
        let volume = self.table.remove(slot)?;
        volume.lock().expect("volume mutex poisoned").flush()?;
        Ok(())
    }

    pub fn dismount_all(&self) -> Vec<(u32, Result<()>)> {
        self.table.drain_slots().into_iter().map(|slot| (slot, self.close_volume(slot))).collect()
    }

    pub fn create_volume(&self, options: CreationOptions) -> VolumeCreator {
        VolumeCreator::start(options, self.rng.clone())
    }

    /// Hands back the shared handle for a mounted slot, for the facade
    /// crate to start a shim endpoint against without cloning or
    /// re-opening the volume.
    pub fn shared_volume(&self, slot: u32) -> Result<SharedVolume> {
        self.table.shared_volume(slot)
    }

    /// Refuses header maintenance on a path that is currently mounted: the
    /// rewrite and a live `Volume`'s in-memory header would otherwise
    /// disagree about which credential unlocks the file.
    fn refuse_if_mounted(&self, path: &Path) -> Result<()> {
        match self.table.slot_for_path(path) {
            Some(slot) => Err(CoreError::MountedVolumeInUse { slot }),
            None => Ok(()),
        }
    }

    /// Re-encrypts `path`'s header(s) under `new_credential`, preserving
    /// the master key.
    pub fn change_password(
        &self,
        path: impl Into<PathBuf>,
        old_credential: &[u8],
        new_credential: &[u8],
        new_kdf: Option<basalt_kdf::KdfKind>,
    ) -> Result<()> {
        let path = path.into();
        self.refuse_if_mounted(&path)?;
        let mut backing = FileBacking::open(&path, false)?;
        maintenance::change_password(&path, &mut backing, &self.rng, old_credential, new_credential, new_kdf)
    }

    /// Builds the external backup-file contents for `path` (§6); the
    /// caller decides where to persist the returned bytes.
    pub fn backup_headers(&self, path: impl Into<PathBuf>, outer_credential: &[u8], hidden_credential: Option<&[u8]>) -> Result<Vec<u8>> {
        let path = path.into();
        let mut backing = FileBacking::open(&path, true)?;
        maintenance::backup_headers(&path, &mut backing, &self.rng, outer_credential, hidden_credential)
    }

    /// V2 only: restores the primary header from the volume's own internal
    /// backup header.
    pub fn restore_headers_from_internal_backup(&self, path: impl Into<PathBuf>, credential: &[u8]) -> Result<()> {
        let path = path.into();
        self.refuse_if_mounted(&path)?;
        let mut backing = FileBacking::open(&path, false)?;
        maintenance::restore_from_internal_backup(&path, &mut backing, credential)
    }

    /// Restores header(s) onto `path` from the raw bytes of an external
    /// backup file (§6, exactly `2 * HEADER_SIZE` bytes, no framing).
    pub fn restore_headers_from_file(&self, path: impl Into<PathBuf>, file_bytes: &[u8], credential: &[u8]) -> Result<()> {
        let path = path.into();
        self.refuse_if_mounted(&path)?;
        let mut backing = FileBacking::open(&path, false)?;
        maintenance::restore_from_file_bytes(&path, &mut backing, file_bytes, credential)
    }

    pub fn rng(&self) -> &Arc<RngPool> {
        &self.rng
    }

    pub fn worker_pool(&self) -> &Arc<basalt_pool::WorkerPool> {
        &self.pool
    }

    pub fn mounted_table(&self) -> &Arc<MountedVolumeTable> {
        &self.table
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        let _ = self.dismount_all();
        self.pool.stop();
        self.rng.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_header::{mix_credentials, VolumePassword};
    use basalt_kdf::by_name;
    use basalt_primitives::CascadeKind;
    use tempfile::NamedTempFile;

    fn core() -> Core {
        Core::init(BasaltConfig::default()).unwrap()
    }

    #[test]
    fn create_then_open_round_trips() {
        let core = core();
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();

        let password = VolumePassword::new("correct horse battery staple").unwrap();
        let credential = mix_credentials(&password, &[]).unwrap();

        let options = CreationOptions {
            target_path: path.clone(),
            requested_size: 2 * 1024 * 1024,
            cascade: CascadeKind::Aes,
            kdf: by_name("Argon2id").unwrap(),
            quick: true,
            credential_material: credential.to_vec(),
            hidden: None,
        };
        core.create_volume(options).join().unwrap();

        let slot = core
            .open_volume(path.clone(), OpenCredentials { outer: &credential, hidden_protection: None }, false)
            .unwrap();

        assert_eq!(core.mounted_volumes().len(), 1);
        core.close_volume(slot).unwrap();
        assert!(core.mounted_volumes().is_empty());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let core = core();
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();

        let password = VolumePassword::new("right password").unwrap();
        let credential = mix_credentials(&password, &[]).unwrap();
        let options = CreationOptions {
            target_path: path.clone(),
            requested_size: 2 * 1024 * 1024,
            cascade: CascadeKind::Aes,
            kdf: by_name("Argon2id").unwrap(),
            quick: true,
            credential_material: credential.to_vec(),
            hidden: None,
        };
        core.create_volume(options).join().unwrap();

        let wrong_password = VolumePassword::new("wrong password").unwrap();
        let wrong_credential = mix_credentials(&wrong_password, &[]).unwrap();
        let result = core.open_volume(path, OpenCredentials { outer: &wrong_credential, hidden_protection: None }, false);
        assert!(matches!(result, Err(CoreError::PasswordIncorrect { .. })));
    }
}
