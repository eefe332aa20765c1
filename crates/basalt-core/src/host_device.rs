//! Host block device enumeration for `get_host_devices`. No partition-table
//! parsing, no filesystem detection — just paths, sizes, and a best-effort
//! removable flag.

use std::path::{Path, PathBuf};

use basalt_io::{BackingFile, FileBacking};

#[derive(Debug, Clone)]
pub struct HostDevice {
    pub path: PathBuf,
    pub size: u64,
    pub removable: bool,
}

/// Platform seam for device enumeration, so a future non-Unix probe can
/// slot in without touching the caller-facing `get_host_devices` surface.
pub trait DeviceProbe: Send + Sync {
    /// Lists candidate device paths without opening or sizing them.
    fn list_paths(&self) -> Vec<PathBuf>;

    /// Best-effort "is this a hot-pluggable device" check; `false` if the
    /// platform can't tell.
    fn is_removable(&self, path: &Path) -> bool;
}

#[cfg(unix)]
pub struct UnixDeviceProbe;

#[cfg(unix)]
impl DeviceProbe for UnixDeviceProbe {
    fn list_paths(&self) -> Vec<PathBuf> {
        const PREFIXES: &[&str] = &["disk", "sd", "nvme", "vd"];
        let mut found = Vec::new();
        let Ok(entries) = std::fs::read_dir("/dev") else {
            return found;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
                found.push(entry.path());
            }
        }
        found.sort();
        found
    }

    fn is_removable(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            return false;
        };
        let sysfs_removable = PathBuf::from("/sys/block").join(&name).join("removable");
        std::fs::read_to_string(sysfs_removable).map(|s| s.trim() == "1").unwrap_or(false)
    }
}

#[cfg(not(unix))]
pub struct UnsupportedDeviceProbe;

#[cfg(not(unix))]
impl DeviceProbe for UnsupportedDeviceProbe {
    fn list_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn is_removable(&self, _path: &Path) -> bool {
        false
    }
}

#[cfg(unix)]
pub fn platform_probe() -> Box<dyn DeviceProbe> {
    Box::new(UnixDeviceProbe)
}

#[cfg(not(unix))]
pub fn platform_probe() -> Box<dyn DeviceProbe> {
    Box::new(UnsupportedDeviceProbe)
}

/// Enumerates host devices via `probe`. When `paths_only` is set, skips
/// opening each candidate to read its size — useful for a quick listing
/// where the caller only wants to populate a picker.
pub fn get_host_devices(probe: &dyn DeviceProbe, paths_only: bool) -> Vec<HostDevice> {
    probe
        .list_paths()
        .into_iter()
        .filter_map(|path| {
            if paths_only {
                return Some(HostDevice { path: path.clone(), size: 0, removable: false });
            }
            let size = FileBacking::open(&path, true).ok().and_then(|b| b.len().ok())?;
            let removable = probe.is_removable(&path);
            Some(HostDevice { path, size, removable })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProbe(Vec<PathBuf>);

    impl DeviceProbe for FakeProbe {
        fn list_paths(&self) -> Vec<PathBuf> {
            self.0.clone()
        }

        fn is_removable(&self, _path: &Path) -> bool {
            false
        }
    }

    #[test]
    fn paths_only_skips_opening_candidates() {
        let probe = FakeProbe(vec![PathBuf::from("/dev/does-not-exist-basalt-test")]);
        let devices = get_host_devices(&probe, true);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].size, 0);
    }

    #[test]
    fn nonexistent_device_is_skipped_when_sizing() {
        let probe = FakeProbe(vec![PathBuf::from("/dev/does-not-exist-basalt-test")]);
        let devices = get_host_devices(&probe, false);
        assert!(devices.is_empty());
    }
}
