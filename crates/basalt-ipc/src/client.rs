//! Runs in the unprivileged caller: the same handshake, then a thin proxy
//! that sends one `Request` per call and blocks for its `Response`. Method
//! shapes mirror `basalt_core::Core`'s device-level operations so callers
//! can swap an in-process `Core` for an `IpcClient` without restructuring.

use std::io::{self, Read, Write};

use basalt_core::{CoreError, HostDevice, Result, VolumeInfo};

use crate::protocol::{self, Request, Response};
use crate::wire::handshake;

pub struct IpcClient<S> {
    stream: S,
}

fn unexpected(tag: &'static str) -> CoreError {
    CoreError::SystemException { subject: "elevated-service protocol".to_string(), source: io::Error::new(io::ErrorKind::InvalidData, format!("unexpected response for {tag}")) }
}

fn io_err(subject: &str, e: io::Error) -> CoreError {
    CoreError::SystemException { subject: subject.to_string(), source: e }
}

impl<S: Read + Write> IpcClient<S> {
    /// Performs the protocol-version handshake over an already-connected
    /// stream (a loopback TCP connection or a Unix domain socket, depending
    /// on platform). Fails if the helper is running an incompatible build.
    pub fn connect(mut stream: S) -> Result<IpcClient<S>> {
        handshake(&mut stream).map_err(|e| io_err("elevated-service handshake", e))?;
        Ok(IpcClient { stream })
    }

    fn roundtrip(&mut self, request: Request) -> Result<Response> {
        protocol::write_request(&mut self.stream, &request).map_err(|e| io_err("elevated-service request", e))?;
        protocol::read_response(&mut self.stream).map_err(|e| io_err("elevated-service response", e))
    }

    pub fn get_host_devices(&mut self, paths_only: bool) -> Result<Vec<HostDevice>> {
        match self.roundtrip(Request::GetHostDevices { paths_only })? {
            Response::HostDevices(devices) => {
                Ok(devices.into_iter().map(|d| HostDevice { path: d.path.into(), size: d.size, removable: d.removable }).collect())
            }
            Response::Exception(e) => Err(e.into()),
            _ => Err(unexpected("get_host_devices")),
        }
    }

    pub fn open_volume(&mut self, path: &str, outer_credential: &[u8], hidden_credential: Option<&[u8]>, read_only: bool) -> Result<u32> {
        let request = Request::OpenVolume {
            path: path.to_string(),
            outer_credential: outer_credential.to_vec(),
            hidden_credential: hidden_credential.map(|c| c.to_vec()),
            read_only,
        };
        match self.roundtrip(request)? {
            Response::Slot(slot) => Ok(slot),
            Response::Exception(e) => Err(e.into()),
            _ => Err(unexpected("open_volume")),
        }
    }

    pub fn close_volume(&mut self, slot: u32) -> Result<()> {
        match self.roundtrip(Request::CloseVolume { slot })? {
            Response::Ack => Ok(()),
            Response::Exception(e) => Err(e.into()),
            _ => Err(unexpected("close_volume")),
        }
    }

    pub fn mounted_volumes(&mut self) -> Result<Vec<VolumeInfo>> {
        match self.roundtrip(Request::ListMountedVolumes)? {
            Response::MountedVolumes(infos) => Ok(infos
                .into_iter()
                .map(|i| VolumeInfo {
                    slot: i.slot,
                    path: i.path.into(),
                    size: i.size,
                    sector_size: i.sector_size,
                    cascade_name: leak_known_name(&i.cascade_name),
                    mode_name: leak_known_name(&i.mode_name),
                    kdf_name: leak_known_name(&i.kdf_name),
                    read_only: i.read_only,
                    hidden_protection_enabled: i.hidden_protection_enabled,
                    hidden_protection_triggered: i.hidden_protection_triggered,
                    bytes_read: i.bytes_read,
                    bytes_written: i.bytes_written,
                    virtual_device_path: i.virtual_device_path.map(Into::into),
                })
                .collect()),
            Response::Exception(e) => Err(e.into()),
            _ => Err(unexpected("mounted_volumes")),
        }
    }

    pub fn dismount_all(&mut self) -> Result<()> {
        match self.roundtrip(Request::DismountAll)? {
            Response::Ack => Ok(()),
            Response::Exception(e) => Err(e.into()),
            _ => Err(unexpected("dismount_all")),
        }
    }

    pub fn create_keyfile(&mut self, path: &str) -> Result<()> {
        match self.roundtrip(Request::CreateKeyfile { path: path.to_string() })? {
            Response::Ack => Ok(()),
            Response::Exception(e) => Err(e.into()),
            _ => Err(unexpected("create_keyfile")),
        }
    }
}

/// `VolumeInfo::cascade_name` et al. are `&'static str` naming a fixed,
/// known set of cascades/modes/KDFs; the wire form carries an owned
/// `String` copy of one of those names, so the client looks the static
/// string back up by value instead of leaking a fresh allocation per call.
fn leak_known_name(name: &str) -> &'static str {
    use basalt_mode::ModeKind;
    use basalt_primitives::CascadeKind;

    if let Some(kdf) = basalt_kdf::by_name(name) {
        return kdf.name;
    }
    for mode in [ModeKind::Xts, ModeKind::Lrw, ModeKind::Cbc] {
        if mode.name() == name {
            return mode.name();
        }
    }
    for cascade in CascadeKind::all() {
        if cascade.name() == name {
            return cascade.name();
        }
    }
    "unknown"
}
