//! Runs inside the elevated helper process: performs the handshake, then
//! services `Request`s against a `&Core` until the stream closes or a
//! framing error ends the connection.

use std::io::{self, Read, Write};

use tracing::{info, warn};

use basalt_core::{Core, CoreError, OpenCredentials};

use crate::exception::ExceptionWire;
use crate::protocol::{self, HostDeviceWire, Request, Response, VolumeInfoWire};
use crate::wire::handshake;

fn volume_info_to_wire(info: basalt_core::VolumeInfo) -> VolumeInfoWire {
    VolumeInfoWire {
        slot: info.slot,
        path: info.path.display().to_string(),
        size: info.size,
        sector_size: info.sector_size,
        cascade_name: info.cascade_name.to_string(),
        mode_name: info.mode_name.to_string(),
        kdf_name: info.kdf_name.to_string(),
        read_only: info.read_only,
        hidden_protection_enabled: info.hidden_protection_enabled,
        hidden_protection_triggered: info.hidden_protection_triggered,
        bytes_read: info.bytes_read,
        bytes_written: info.bytes_written,
        virtual_device_path: info.virtual_device_path.map(|p| p.display().to_string()),
    }
}

fn dispatch(core: &Core, request: Request) -> Result<Response, CoreError> {
    match request {
        Request::GetHostDevices { paths_only } => {
            let devices = core
                .get_host_devices(paths_only)
                .into_iter()
                .map(|d| HostDeviceWire { path: d.path.display().to_string(), size: d.size, removable: d.removable })
                .collect();
            Ok(Response::HostDevices(devices))
        }
        Request::OpenVolume { path, outer_credential, hidden_credential, read_only } => {
            let credentials = OpenCredentials { outer: &outer_credential, hidden_protection: hidden_credential.as_deref() };
            let slot = core.open_volume(path, credentials, read_only)?;
            Ok(Response::Slot(slot))
        }
        Request::CloseVolume { slot } => {
            core.close_volume(slot)?;
            Ok(Response::Ack)
        }
        Request::ListMountedVolumes => Ok(Response::MountedVolumes(core.mounted_volumes().into_iter().map(volume_info_to_wire).collect())),
        Request::DismountAll => {
            for (slot, result) in core.dismount_all() {
                if let Err(e) = result {
                    warn!(slot, error = %e, "dismount_all: slot failed to close cleanly");
                }
            }
            Ok(Response::Ack)
        }
        Request::CreateKeyfile { path } => {
            core.create_keyfile(std::path::Path::new(&path))?;
            Ok(Response::Ack)
        }
    }
}

/// Services one connection end to end: handshake, then requests until EOF.
/// A single malformed frame ends the connection rather than the process —
/// the helper keeps running for the next connection attempt.
pub fn serve_connection(core: &Core, stream: &mut (impl Read + Write)) -> io::Result<()> {
    handshake(stream)?;
    loop {
        let request = match protocol::read_request(stream) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        let response = match dispatch(core, request) {
            Ok(r) => r,
            Err(e) => {
                info!(error = %e, "elevated operation returned an exception");
                Response::Exception(ExceptionWire::from(&e))
            }
        };
        protocol::write_response(stream, &response)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct DuplexBuf {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for DuplexBuf {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for DuplexBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn serve_connection_handles_handshake_then_eof() {
        let core = Core::init(basalt_core::BasaltConfig::default()).unwrap();

        let mut client_out = Vec::new();
        let mut out = Vec::with_capacity(2);
        byteorder::WriteBytesExt::write_u16::<byteorder::BigEndian>(&mut out, crate::wire::PROTOCOL_VERSION).unwrap();
        crate::wire::write_frame(&mut client_out, 0, &out).unwrap();

        let mut duplex = DuplexBuf { input: Cursor::new(client_out), output: Vec::new() };
        serve_connection(&core, &mut duplex).unwrap();
        assert!(!duplex.output.is_empty(), "server should have written its own handshake frame");
    }
}
