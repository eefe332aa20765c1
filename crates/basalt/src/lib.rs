//! The public orchestration API (spec §6): the one surface a caller (a GUI,
//! a CLI wrapper, a management daemon) actually drives. `basalt-core` knows
//! how to open a `Volume` and bookkeep the mounted-volume table;
//! `basalt-shim` knows how to serve sector I/O over a loopback endpoint.
//! Neither depends on the other, so the sequencing between them — start a
//! shim only after a volume is open, record its address in the table,
//! tear both down in the opposite order on dismount — lives here.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::info;

use basalt_core::{
    BasaltConfig, Core, CoreError, CreationOptions, HostDevice, OpenCredentials, ProgressSnapshot, Result, VolumeCreator, VolumeInfo,
};
use basalt_shim::{ShimBackendKind, ShimEndpoint};

/// Credential material and mount-time flags for `Basalt::mount`. Passwords
/// and keyfiles are mixed into `outer_credential`/`hidden_credential`
/// before this point (see `basalt_header::mix_credentials`) — this crate
/// has no opinion on where a credential came from.
pub struct MountOptions {
    pub path: PathBuf,
    pub outer_credential: Vec<u8>,
    pub hidden_credential: Option<Vec<u8>>,
    pub read_only: bool,
}

/// Ties a `Core` to the shim endpoints it has started, so `mount`/`dismount`
/// can sequence both sides without either crate knowing about the other.
/// One process embeds exactly one of these.
pub struct Basalt {
    core: Core,
    shims: Mutex<HashMap<u32, ShimEndpoint>>,
    creation: Mutex<Option<VolumeCreator>>,
}

fn shim_err(e: basalt_shim::ShimError) -> CoreError {
    CoreError::SystemException { subject: "shim endpoint".to_string(), source: io::Error::other(e.to_string()) }
}

impl Basalt {
    /// Starts the RNG pool, the worker pool, and the mounted-volume table.
    /// Idempotent in the sense that a fresh `Core` is cheap to build and
    /// carries no on-disk state of its own; callers that want a literal
    /// singleton keep one `Basalt` for the process lifetime.
    pub fn core_init(config: BasaltConfig) -> Result<Basalt> {
        Ok(Basalt { core: Core::init(config)?, shims: Mutex::new(HashMap::new()), creation: Mutex::new(None) })
    }

    fn volume_info(&self, slot: u32) -> Result<VolumeInfo> {
        self.core.mounted_volumes().into_iter().find(|v| v.slot == slot).ok_or(CoreError::MountedVolumeInUse { slot })
    }

    /// Opens the volume, then starts a shim endpoint over it and records
    /// the endpoint's address as the slot's virtual device path. Rolls
    /// the volume open back if the shim fails to start, so a failed mount
    /// never leaves a slot with no endpoint behind it.
    pub fn mount(&self, options: MountOptions) -> Result<VolumeInfo> {
        let credentials = OpenCredentials { outer: &options.outer_credential, hidden_protection: options.hidden_credential.as_deref() };
        let slot = self.core.open_volume(options.path, credentials, options.read_only)?;

        if let Err(e) = self.start_shim(slot) {
            let _ = self.core.mounted_table().set_virtual_device_path(slot, None);
            let _ = self.core.close_volume(slot);
            return Err(e);
        }

        info!(slot, "volume mounted");
        self.volume_info(slot)
    }

    fn start_shim(&self, slot: u32) -> Result<()> {
        let shared = self.core.shared_volume(slot)?;
        let kind = ShimBackendKind::by_name(&self.core.config().shim_backend)
            .ok_or_else(|| CoreError::ParameterIncorrect(format!("unknown shim backend {:?}", self.core.config().shim_backend)))?;
        let endpoint = ShimEndpoint::start(kind, shared).map_err(shim_err)?;

        let addr = endpoint.local_addr();
        self.core.mounted_table().set_virtual_device_path(slot, Some(PathBuf::from(addr.to_string())))?;
        self.shims.lock().expect("shim table mutex poisoned").insert(slot, endpoint);
        Ok(())
    }

    /// Stops the slot's shim endpoint (draining any in-flight request),
    /// clears its virtual device path, then closes the volume. `force`
    /// has no separate code path: the shim engine serves one request at a
    /// time per connection, so there is never more than a single in-flight
    /// request for a forced disconnect to interrupt — the drain already
    /// completes as fast as a forced one would.
    pub fn dismount(&self, slot: u32, _force: bool) -> Result<VolumeInfo> {
        let info = self.volume_info(slot)?;

        if let Some(endpoint) = self.shims.lock().expect("shim table mutex poisoned").remove(&slot) {
            endpoint.stop();
        }
        self.core.mounted_table().set_virtual_device_path(slot, None)?;
        self.core.close_volume(slot)?;

        info!(slot, "volume dismounted");
        Ok(info)
    }

    pub fn dismount_all(&self, force: bool) -> Vec<(u32, Result<VolumeInfo>)> {
        let slots: Vec<u32> = self.core.mounted_volumes().into_iter().map(|v| v.slot).collect();
        slots.into_iter().map(|slot| (slot, self.dismount(slot, force))).collect()
    }

    pub fn get_mounted_volumes(&self) -> Vec<VolumeInfo> {
        self.core.mounted_volumes()
    }

    pub fn get_host_devices(&self, paths_only: bool) -> Vec<HostDevice> {
        self.core.get_host_devices(paths_only)
    }

    /// Starts a creator, replacing whatever the previous one left behind.
    /// Mirrors §6's single process-wide `get_creation_progress`/
    /// `abort_creation` pair, which have no id parameter to pick a
    /// specific creation — only one can be in flight at a time.
    pub fn create_volume(&self, options: CreationOptions) {
        let creator = self.core.create_volume(options);
        *self.creation.lock().expect("creation slot mutex poisoned") = Some(creator);
    }

    pub fn get_creation_progress(&self) -> ProgressSnapshot {
        self.creation.lock().expect("creation slot mutex poisoned").as_ref().map(|c| c.progress()).unwrap_or_default()
    }

    pub fn abort_creation(&self) {
        if let Some(creator) = self.creation.lock().expect("creation slot mutex poisoned").as_ref() {
            creator.abort();
        }
    }

    /// Once `get_creation_progress().in_progress` is `false`, collects the
    /// background thread's result. Returns `None` if no creation has ever
    /// been started, or if a previous call already collected this one.
    pub fn creation_result(&self) -> Option<Result<()>> {
        let mut slot = self.creation.lock().expect("creation slot mutex poisoned");
        if slot.as_ref()?.progress().in_progress {
            return None;
        }
        slot.take().map(|c| c.join())
    }

    pub fn change_password(&self, path: impl Into<PathBuf>, old_credential: &[u8], new_credential: &[u8], new_kdf: Option<basalt_kdf::KdfKind>) -> Result<()> {
        self.core.change_password(path, old_credential, new_credential, new_kdf)
    }

    pub fn backup_headers(&self, path: impl Into<PathBuf>, outer_credential: &[u8], hidden_credential: Option<&[u8]>) -> Result<Vec<u8>> {
        self.core.backup_headers(path, outer_credential, hidden_credential)
    }

    pub fn restore_headers_from_internal_backup(&self, path: impl Into<PathBuf>, credential: &[u8]) -> Result<()> {
        self.core.restore_headers_from_internal_backup(path, credential)
    }

    pub fn restore_headers_from_file(&self, path: impl Into<PathBuf>, file_bytes: &[u8], credential: &[u8]) -> Result<()> {
        self.core.restore_headers_from_file(path, file_bytes, credential)
    }

    pub fn create_keyfile(&self, path: &std::path::Path) -> Result<()> {
        self.core.create_keyfile(path)
    }

    pub fn run_self_test(&self) -> Result<()> {
        self.core.run_self_test()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    use basalt_header::{mix_credentials, VolumePassword};
    use basalt_primitives::CascadeKind;
    use tempfile::NamedTempFile;

    fn fixture_path() -> PathBuf {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        path
    }

    #[test]
    fn mount_starts_a_reachable_shim_and_dismount_tears_it_down() {
        let basalt = Basalt::core_init(BasaltConfig::default()).unwrap();
        let path = fixture_path();
        let password = VolumePassword::new("facade test password").unwrap();
        let credential = mix_credentials(&password, &[]).unwrap();

        let options = CreationOptions {
            target_path: path.clone(),
            requested_size: 2 * 1024 * 1024,
            cascade: CascadeKind::Aes,
            kdf: basalt_kdf::by_name("Argon2id").unwrap(),
            quick: true,
            credential_material: credential.to_vec(),
            hidden: None,
        };
        basalt.create_volume(options);
        while basalt.get_creation_progress().in_progress {
            std::thread::yield_now();
        }
        basalt.creation_result().unwrap().unwrap();

        let info = basalt
            .mount(MountOptions { path: path.clone(), outer_credential: credential.to_vec(), hidden_credential: None, read_only: false })
            .unwrap();
        let virtual_path = info.virtual_device_path.clone().expect("mount should record a virtual device path");
        assert!(TcpStream::connect(virtual_path.to_str().unwrap()).is_ok());

        assert_eq!(basalt.get_mounted_volumes().len(), 1);
        let dismounted = basalt.dismount(info.slot, false).unwrap();
        assert_eq!(dismounted.slot, info.slot);
        assert!(basalt.get_mounted_volumes().is_empty());
    }

    #[test]
    fn wrong_password_mount_leaves_no_slot_behind() {
        let basalt = Basalt::core_init(BasaltConfig::default()).unwrap();
        let path = fixture_path();
        let password = VolumePassword::new("right one").unwrap();
        let credential = mix_credentials(&password, &[]).unwrap();
        let options = CreationOptions {
            target_path: path.clone(),
            requested_size: 2 * 1024 * 1024,
            cascade: CascadeKind::Aes,
            kdf: basalt_kdf::by_name("Argon2id").unwrap(),
            quick: true,
            credential_material: credential.to_vec(),
            hidden: None,
        };
        basalt.create_volume(options);
        while basalt.get_creation_progress().in_progress {
            std::thread::yield_now();
        }
        basalt.creation_result().unwrap().unwrap();

        let wrong = mix_credentials(&VolumePassword::new("wrong one").unwrap(), &[]).unwrap();
        let result = basalt.mount(MountOptions { path, outer_credential: wrong.to_vec(), hidden_credential: None, read_only: false });
        assert!(matches!(result, Err(CoreError::PasswordIncorrect { .. })));
        assert!(basalt.get_mounted_volumes().is_empty());
    }

    #[test]
    fn run_self_test_passes() {
        let basalt = Basalt::core_init(BasaltConfig::default()).unwrap();
        basalt.run_self_test().unwrap();
    }
}
