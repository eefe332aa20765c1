//! The request/response shapes forwarded across the elevated-service
//! boundary: `{operation tag, arguments...}` in, `{result | exception}`
//! out, exactly as §4.10 describes. Only operations that need privileges
//! beyond the caller's are modeled here — sector I/O on an already-open
//! volume never crosses this boundary, since the privileged step is
//! opening the raw device or enumerating `/dev`, not reading bytes from an
//! already-open handle.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::exception::ExceptionWire;
use crate::wire::{read_bytes_field, read_frame, read_string, write_bytes_field, write_frame, write_string};

#[derive(Debug, Clone)]
pub enum Request {
    GetHostDevices { paths_only: bool },
    OpenVolume { path: String, outer_credential: Vec<u8>, hidden_credential: Option<Vec<u8>>, read_only: bool },
    CloseVolume { slot: u32 },
    ListMountedVolumes,
    DismountAll,
    CreateKeyfile { path: String },
}

#[derive(Debug, Clone)]
pub struct HostDeviceWire {
    pub path: String,
    pub size: u64,
    pub removable: bool,
}

#[derive(Debug, Clone)]
pub struct VolumeInfoWire {
    pub slot: u32,
    pub path: String,
    pub size: u64,
    pub sector_size: u32,
    pub cascade_name: String,
    pub mode_name: String,
    pub kdf_name: String,
    pub read_only: bool,
    pub hidden_protection_enabled: bool,
    pub hidden_protection_triggered: bool,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub virtual_device_path: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Response {
    HostDevices(Vec<HostDeviceWire>),
    Slot(u32),
    Ack,
    MountedVolumes(Vec<VolumeInfoWire>),
    Exception(ExceptionWire),
}

pub fn write_request(stream: &mut impl Write, request: &Request) -> io::Result<()> {
    match request {
        Request::GetHostDevices { paths_only } => write_frame(stream, 0, &[*paths_only as u8]),
        Request::OpenVolume { path, outer_credential, hidden_credential, read_only } => {
            let mut buf = Vec::new();
            write_string(&mut buf, path)?;
            write_bytes_field(&mut buf, outer_credential)?;
            buf.write_u8(hidden_credential.is_some() as u8)?;
            if let Some(hidden) = hidden_credential {
                write_bytes_field(&mut buf, hidden)?;
            }
            buf.write_u8(*read_only as u8)?;
            write_frame(stream, 1, &buf)
        }
        Request::CloseVolume { slot } => {
            let mut buf = Vec::with_capacity(4);
            buf.write_u32::<BigEndian>(*slot)?;
            write_frame(stream, 2, &buf)
        }
        Request::ListMountedVolumes => write_frame(stream, 3, &[]),
        Request::DismountAll => write_frame(stream, 4, &[]),
        Request::CreateKeyfile { path } => {
            let mut buf = Vec::new();
            write_string(&mut buf, path)?;
            write_frame(stream, 5, &buf)
        }
    }
}

pub fn read_request(stream: &mut impl Read) -> io::Result<Request> {
    let (tag, payload) = read_frame(stream)?;
    let mut cursor = &payload[..];
    Ok(match tag {
        0 => Request::GetHostDevices { paths_only: cursor.read_u8()? != 0 },
        1 => {
            let path = read_string(&mut cursor)?;
            let outer_credential = read_bytes_field(&mut cursor)?;
            let has_hidden = cursor.read_u8()? != 0;
            let hidden_credential = if has_hidden { Some(read_bytes_field(&mut cursor)?) } else { None };
            let read_only = cursor.read_u8()? != 0;
            Request::OpenVolume { path, outer_credential, hidden_credential, read_only }
        }
        2 => Request::CloseVolume { slot: cursor.read_u32::<BigEndian>()? },
        3 => Request::ListMountedVolumes,
        4 => Request::DismountAll,
        5 => Request::CreateKeyfile { path: read_string(&mut cursor)? },
        other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown request tag {other}"))),
    })
}

fn write_host_device(buf: &mut Vec<u8>, device: &HostDeviceWire) -> io::Result<()> {
    write_string(buf, &device.path)?;
    buf.write_u64::<BigEndian>(device.size)?;
    buf.write_u8(device.removable as u8)?;
    Ok(())
}

fn read_host_device(cursor: &mut &[u8]) -> io::Result<HostDeviceWire> {
    let path = read_string(cursor)?;
    let size = cursor.read_u64::<BigEndian>()?;
    let removable = cursor.read_u8()? != 0;
    Ok(HostDeviceWire { path, size, removable })
}

fn write_volume_info(buf: &mut Vec<u8>, info: &VolumeInfoWire) -> io::Result<()> {
    buf.write_u32::<BigEndian>(info.slot)?;
    write_string(buf, &info.path)?;
    buf.write_u64::<BigEndian>(info.size)?;
    buf.write_u32::<BigEndian>(info.sector_size)?;
    write_string(buf, &info.cascade_name)?;
    write_string(buf, &info.mode_name)?;
    write_string(buf, &info.kdf_name)?;
    buf.write_u8(info.read_only as u8)?;
    buf.write_u8(info.hidden_protection_enabled as u8)?;
    buf.write_u8(info.hidden_protection_triggered as u8)?;
    buf.write_u64::<BigEndian>(info.bytes_read)?;
    buf.write_u64::<BigEndian>(info.bytes_written)?;
    buf.write_u8(info.virtual_device_path.is_some() as u8)?;
    if let Some(path) = &info.virtual_device_path {
        write_string(buf, path)?;
    }
    Ok(())
}

fn read_volume_info(cursor: &mut &[u8]) -> io::Result<VolumeInfoWire> {
    let slot = cursor.read_u32::<BigEndian>()?;
    let path = read_string(cursor)?;
    let size = cursor.read_u64::<BigEndian>()?;
    let sector_size = cursor.read_u32::<BigEndian>()?;
    let cascade_name = read_string(cursor)?;
    let mode_name = read_string(cursor)?;
    let kdf_name = read_string(cursor)?;
    let read_only = cursor.read_u8()? != 0;
    let hidden_protection_enabled = cursor.read_u8()? != 0;
    let hidden_protection_triggered = cursor.read_u8()? != 0;
    let bytes_read = cursor.read_u64::<BigEndian>()?;
    let bytes_written = cursor.read_u64::<BigEndian>()?;
    let has_virtual_device = cursor.read_u8()? != 0;
    let virtual_device_path = if has_virtual_device { Some(read_string(cursor)?) } else { None };
    Ok(VolumeInfoWire {
        slot,
        path,
        size,
        sector_size,
        cascade_name,
        mode_name,
        kdf_name,
        read_only,
        hidden_protection_enabled,
        hidden_protection_triggered,
        bytes_read,
        bytes_written,
        virtual_device_path,
    })
}

fn write_exception(buf: &mut Vec<u8>, exception: &ExceptionWire) -> io::Result<()> {
    match exception {
        ExceptionWire::UserAbort => buf.write_u8(0),
        ExceptionWire::PasswordIncorrect { path } => {
            buf.write_u8(1)?;
            write_string(buf, path)
        }
        ExceptionWire::PasswordKeyfilesIncorrect { path } => {
            buf.write_u8(2)?;
            write_string(buf, path)
        }
        ExceptionWire::ProtectionPasswordIncorrect => buf.write_u8(3),
        ExceptionWire::VolumeAlreadyMounted { path } => {
            buf.write_u8(4)?;
            write_string(buf, path)
        }
        ExceptionWire::VolumeProtected => buf.write_u8(5),
        ExceptionWire::VolumeReadOnly { path } => {
            buf.write_u8(6)?;
            write_string(buf, path)
        }
        ExceptionWire::MountedVolumeInUse { slot } => {
            buf.write_u8(7)?;
            buf.write_u32::<BigEndian>(*slot)
        }
        ExceptionWire::HeaderCorrupt { path } => {
            buf.write_u8(8)?;
            write_string(buf, path)
        }
        ExceptionWire::ParameterIncorrect { message } => {
            buf.write_u8(9)?;
            write_string(buf, message)
        }
        ExceptionWire::SystemException { subject, os_code, message } => {
            buf.write_u8(10)?;
            write_string(buf, subject)?;
            buf.write_i32::<BigEndian>(*os_code)?;
            write_string(buf, message)
        }
        ExceptionWire::NotImplemented { operation } => {
            buf.write_u8(11)?;
            write_string(buf, operation)
        }
        ExceptionWire::TestFailed { message } => {
            buf.write_u8(12)?;
            write_string(buf, message)
        }
        ExceptionWire::NoFreeSlot => buf.write_u8(13),
    }
}

fn read_exception(cursor: &mut &[u8]) -> io::Result<ExceptionWire> {
    let kind = cursor.read_u8()?;
    Ok(match kind {
        0 => ExceptionWire::UserAbort,
        1 => ExceptionWire::PasswordIncorrect { path: read_string(cursor)? },
        2 => ExceptionWire::PasswordKeyfilesIncorrect { path: read_string(cursor)? },
        3 => ExceptionWire::ProtectionPasswordIncorrect,
        4 => ExceptionWire::VolumeAlreadyMounted { path: read_string(cursor)? },
        5 => ExceptionWire::VolumeProtected,
        6 => ExceptionWire::VolumeReadOnly { path: read_string(cursor)? },
        7 => ExceptionWire::MountedVolumeInUse { slot: cursor.read_u32::<BigEndian>()? },
        8 => ExceptionWire::HeaderCorrupt { path: read_string(cursor)? },
        9 => ExceptionWire::ParameterIncorrect { message: read_string(cursor)? },
        10 => {
            let subject = read_string(cursor)?;
            let os_code = cursor.read_i32::<BigEndian>()?;
            let message = read_string(cursor)?;
            ExceptionWire::SystemException { subject, os_code, message }
        }
        11 => ExceptionWire::NotImplemented { operation: read_string(cursor)? },
        12 => ExceptionWire::TestFailed { message: read_string(cursor)? },
        13 => ExceptionWire::NoFreeSlot,
        other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown exception kind {other}"))),
    })
}

pub fn write_response(stream: &mut impl Write, response: &Response) -> io::Result<()> {
    match response {
        Response::HostDevices(devices) => {
            let mut buf = Vec::new();
            buf.write_u32::<BigEndian>(devices.len() as u32)?;
            for device in devices {
                write_host_device(&mut buf, device)?;
            }
            write_frame(stream, 0, &buf)
        }
        Response::Slot(slot) => {
            let mut buf = Vec::with_capacity(4);
            buf.write_u32::<BigEndian>(*slot)?;
            write_frame(stream, 1, &buf)
        }
        Response::Ack => write_frame(stream, 2, &[]),
        Response::MountedVolumes(infos) => {
            let mut buf = Vec::new();
            buf.write_u32::<BigEndian>(infos.len() as u32)?;
            for info in infos {
                write_volume_info(&mut buf, info)?;
            }
            write_frame(stream, 3, &buf)
        }
        Response::Exception(exception) => {
            let mut buf = Vec::new();
            write_exception(&mut buf, exception)?;
            write_frame(stream, 4, &buf)
        }
    }
}

pub fn read_response(stream: &mut impl Read) -> io::Result<Response> {
    let (tag, payload) = read_frame(stream)?;
    let mut cursor = &payload[..];
    Ok(match tag {
        0 => {
            let count = cursor.read_u32::<BigEndian>()?;
            let mut devices = Vec::with_capacity(count as usize);
            for _ in 0..count {
                devices.push(read_host_device(&mut cursor)?);
            }
            Response::HostDevices(devices)
        }
        1 => Response::Slot(cursor.read_u32::<BigEndian>()?),
        2 => Response::Ack,
        3 => {
            let count = cursor.read_u32::<BigEndian>()?;
            let mut infos = Vec::with_capacity(count as usize);
            for _ in 0..count {
                infos.push(read_volume_info(&mut cursor)?);
            }
            Response::MountedVolumes(infos)
        }
        4 => Response::Exception(read_exception(&mut cursor)?),
        other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown response tag {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_volume_request_round_trips() {
        let request = Request::OpenVolume {
            path: "/tmp/v.basalt".to_string(),
            outer_credential: vec![1, 2, 3],
            hidden_credential: Some(vec![4, 5]),
            read_only: true,
        };
        let mut buf = Vec::new();
        write_request(&mut buf, &request).unwrap();
        match read_request(&mut &buf[..]).unwrap() {
            Request::OpenVolume { path, outer_credential, hidden_credential, read_only } => {
                assert_eq!(path, "/tmp/v.basalt");
                assert_eq!(outer_credential, vec![1, 2, 3]);
                assert_eq!(hidden_credential, Some(vec![4, 5]));
                assert!(read_only);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn exception_response_round_trips() {
        let response = Response::Exception(ExceptionWire::VolumeAlreadyMounted { path: "/tmp/v.basalt".to_string() });
        let mut buf = Vec::new();
        write_response(&mut buf, &response).unwrap();
        match read_response(&mut &buf[..]).unwrap() {
            Response::Exception(ExceptionWire::VolumeAlreadyMounted { path }) => assert_eq!(path, "/tmp/v.basalt"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn mounted_volumes_response_round_trips_empty_and_populated() {
        let mut buf = Vec::new();
        write_response(&mut buf, &Response::MountedVolumes(vec![])).unwrap();
        assert!(matches!(read_response(&mut &buf[..]).unwrap(), Response::MountedVolumes(v) if v.is_empty()));

        let info = VolumeInfoWire {
            slot: 3,
            path: "/tmp/v.basalt".to_string(),
            size: 1024,
            sector_size: 512,
            cascade_name: "AES".to_string(),
            mode_name: "XTS".to_string(),
            kdf_name: "Argon2id".to_string(),
            read_only: false,
            hidden_protection_enabled: true,
            hidden_protection_triggered: false,
            bytes_read: 0,
            bytes_written: 0,
            virtual_device_path: Some("/dev/basalt0".to_string()),
        };
        let mut buf = Vec::new();
        write_response(&mut buf, &Response::MountedVolumes(vec![info])).unwrap();
        match read_response(&mut &buf[..]).unwrap() {
            Response::MountedVolumes(v) => {
                assert_eq!(v.len(), 1);
                assert_eq!(v[0].slot, 3);
                assert_eq!(v[0].virtual_device_path.as_deref(), Some("/dev/basalt0"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
