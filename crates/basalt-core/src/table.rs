//! The mounted-volume table: the single authority on which slots are
//! occupied, keyed by a caller-visible slot number rather than by path, so
//! the same underlying file can never be double-mounted under two slots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{CoreError, Result};
use crate::volume::Volume;

/// A mounted volume shared between the table (which owns bookkeeping) and
/// a shim endpoint (which serves sector I/O against it) without either
/// side needing to clone or hand off the `Volume` itself.
pub type SharedVolume = Arc<Mutex<Volume>>;

/// Everything about a mounted volume that is safe to hand back across an
/// IPC boundary: no key material, no backing handle, just the facts a
/// caller's "list mounted volumes" view needs.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub slot: u32,
    pub path: PathBuf,
    pub size: u64,
    pub sector_size: u32,
    pub cascade_name: &'static str,
    pub mode_name: &'static str,
    pub kdf_name: &'static str,
    pub read_only: bool,
    pub hidden_protection_enabled: bool,
    pub hidden_protection_triggered: bool,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Filled in by the shim layer once a virtual device has been handed
    /// out for this slot; `None` for a volume that is decrypted but has no
    /// block-shim endpoint running yet.
    pub virtual_device_path: Option<PathBuf>,
}

struct Slot {
    volume: SharedVolume,
    virtual_device_path: Option<PathBuf>,
}

const MAX_SLOTS: u32 = 64;

pub struct MountedVolumeTable {
    slots: Mutex<BTreeMap<u32, Slot>>,
}

impl MountedVolumeTable {
    pub fn new() -> MountedVolumeTable {
        MountedVolumeTable { slots: Mutex::new(BTreeMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u32, Slot>> {
        self.slots.lock().expect("mounted-volume table mutex poisoned")
    }

    /// Rejects a path that is already open under a different slot, then
    /// assigns the smallest unused slot number below `MAX_SLOTS`.
    pub fn insert(&self, volume: Volume) -> Result<u32> {
        let mut slots = self.lock();

        if let Some(existing) = slots.values().find(|s| s.volume.lock().expect("volume mutex poisoned").path() == volume.path()) {
            let path = existing.volume.lock().expect("volume mutex poisoned").path().to_path_buf();
            return Err(CoreError::VolumeAlreadyMounted { path });
        }

        let slot_id = (0..MAX_SLOTS).find(|id| !slots.contains_key(id)).ok_or(CoreError::NoFreeSlot)?;
        slots.insert(slot_id, Slot { volume: Arc::new(Mutex::new(volume)), virtual_device_path: None });
        Ok(slot_id)
    }

    /// Removes the volume at `slot` and returns its shared handle, so the
    /// caller can run any shim teardown it needs before the last `Arc`
    /// reference drops and the backing handle actually closes.
    pub fn remove(&self, slot: u32) -> Result<SharedVolume> {
        let mut slots = self.lock();
        slots.remove(&slot).map(|s| s.volume).ok_or(CoreError::MountedVolumeInUse { slot })
    }

    pub fn set_virtual_device_path(&self, slot: u32, path: Option<PathBuf>) -> Result<()> {
        let mut slots = self.lock();
        let entry = slots.get_mut(&slot).ok_or(CoreError::MountedVolumeInUse { slot })?;
        entry.virtual_device_path = path;
        Ok(())
    }

    pub fn slot_for_path(&self, path: &Path) -> Option<u32> {
        self.lock().iter().find(|(_, s)| s.volume.lock().expect("volume mutex poisoned").path() == path).map(|(id, _)| *id)
    }

    pub fn with_volume<R>(&self, slot: u32, f: impl FnOnce(&mut Volume) -> Result<R>) -> Result<R> {
        let shared = {
            let slots = self.lock();
            let entry = slots.get(&slot).ok_or(CoreError::MountedVolumeInUse { slot })?;
            entry.volume.clone()
        };
        let mut volume = shared.lock().expect("volume mutex poisoned");
        f(&mut volume)
    }

    /// Hands back the shared handle for `slot`, for a caller (the facade
    /// crate) that needs to start a shim endpoint sharing the same
    /// `Volume` the table tracks, rather than a one-off closure.
    pub fn shared_volume(&self, slot: u32) -> Result<SharedVolume> {
        let slots = self.lock();
        slots.get(&slot).map(|s| s.volume.clone()).ok_or(CoreError::MountedVolumeInUse { slot })
    }

    pub fn list(&self) -> Vec<VolumeInfo> {
        self.lock()
            .iter()
            .map(|(slot, s)| {
                let volume = s.volume.lock().expect("volume mutex poisoned");
                VolumeInfo {
                    slot: *slot,
                    path: volume.path().to_path_buf(),
                    size: volume.size(),
                    sector_size: volume.sector_size(),
                    cascade_name: volume.cascade_name(),
                    mode_name: volume.mode_name(),
                    kdf_name: volume.kdf_name(),
                    read_only: volume.read_only(),
                    hidden_protection_enabled: volume.hidden_protection_enabled(),
                    hidden_protection_triggered: volume.hidden_protection_triggered(),
                    bytes_read: volume.bytes_read(),
                    bytes_written: volume.bytes_written(),
                    virtual_device_path: s.virtual_device_path.clone(),
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn drain_slots(&self) -> Vec<u32> {
        self.lock().keys().copied().collect()
    }
}

impl Default for MountedVolumeTable {
    fn default() -> MountedVolumeTable {
        MountedVolumeTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_io::MemBacking;
    use basalt_pool::WorkerPool;

    fn dummy_volume(path: &str) -> Volume {
        // Exercises only the table's bookkeeping, so a hand-built Volume
        // stands in; the table never looks inside a Volume beyond its
        // accessor methods.
        let pool = WorkerPool::start();
        let backing = Box::new(MemBacking::new(1024 * 1024));
        Volume::for_testing(path, backing, pool)
    }

    #[test]
    fn rejects_double_mount_of_the_same_path() {
        let table = MountedVolumeTable::new();
        let a = dummy_volume("/tmp/one.basalt");
        let b = dummy_volume("/tmp/one.basalt");
        table.insert(a).unwrap();
        assert!(matches!(table.insert(b), Err(CoreError::VolumeAlreadyMounted { .. })));
    }

    #[test]
    fn assigns_the_smallest_free_slot() {
        let table = MountedVolumeTable::new();
        let slot_a = table.insert(dummy_volume("/tmp/a.basalt")).unwrap();
        let slot_b = table.insert(dummy_volume("/tmp/b.basalt")).unwrap();
        assert_eq!(slot_a, 0);
        assert_eq!(slot_b, 1);

        table.remove(slot_a).unwrap();
        let slot_c = table.insert(dummy_volume("/tmp/c.basalt")).unwrap();
        assert_eq!(slot_c, 0);
    }
}
