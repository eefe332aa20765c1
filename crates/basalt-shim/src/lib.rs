//! The userspace block shim: turns a mounted `Volume`'s sector API into a
//! loopback endpoint the host OS can connect to. Pure consumer of the
//! `Volume` it is handed — it never mutates a header and knows nothing
//! about mounting/unmounting the table entry that owns that volume; the
//! `basalt` facade crate wires the two together.

mod backends;
mod engine;
mod protocol;
mod volume_io;

pub use backends::{IscsiLoopbackBackend, LoopbackFileBackend, Nfs4LoopbackBackend};
pub use engine::ShimError;
pub use protocol::{Request, Response};
pub use volume_io::SharedVolume;

/// Names the three shim instantiations a `BasaltConfig::shim_backend`
/// string may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimBackendKind {
    LoopbackFile,
    Nfs4Loopback,
    IscsiLoopback,
}

impl ShimBackendKind {
    pub fn by_name(name: &str) -> Option<ShimBackendKind> {
        match name {
            "loopback-file" => Some(ShimBackendKind::LoopbackFile),
            "nfs4-loopback" => Some(ShimBackendKind::Nfs4Loopback),
            "iscsi-loopback" => Some(ShimBackendKind::IscsiLoopback),
            _ => None,
        }
    }
}

/// A started shim endpoint, whichever backend produced it, exposed
/// uniformly so the facade crate doesn't need to match on the backend
/// kind to dismount.
pub enum ShimEndpoint {
    LoopbackFile(LoopbackFileBackend),
    Nfs4Loopback(Nfs4LoopbackBackend),
    IscsiLoopback(IscsiLoopbackBackend),
}

impl ShimEndpoint {
    pub fn start(kind: ShimBackendKind, volume: SharedVolume) -> Result<ShimEndpoint, ShimError> {
        Ok(match kind {
            ShimBackendKind::LoopbackFile => ShimEndpoint::LoopbackFile(LoopbackFileBackend::start(volume)?),
            ShimBackendKind::Nfs4Loopback => ShimEndpoint::Nfs4Loopback(Nfs4LoopbackBackend::start(volume)?),
            ShimBackendKind::IscsiLoopback => ShimEndpoint::IscsiLoopback(IscsiLoopbackBackend::start(volume)?),
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        match self {
            ShimEndpoint::LoopbackFile(b) => b.local_addr(),
            ShimEndpoint::Nfs4Loopback(b) => b.local_addr(),
            ShimEndpoint::IscsiLoopback(b) => b.local_addr(),
        }
    }

    pub fn stop(self) {
        match self {
            ShimEndpoint::LoopbackFile(b) => b.stop(),
            ShimEndpoint::Nfs4Loopback(b) => b.stop(),
            ShimEndpoint::IscsiLoopback(b) => b.stop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;
    use std::sync::{Arc, Mutex};

    use basalt_core::{BasaltConfig, Core, CreationOptions, OpenCredentials, Volume};
    use basalt_header::{mix_credentials, VolumePassword};
    use basalt_io::{BackingFile, FileBacking};
    use basalt_primitives::CascadeKind;
    use tempfile::NamedTempFile;

    use crate::protocol::{read_response, write_request, Request, Response};

    use super::*;

    fn open_test_volume(core: &Core, path: std::path::PathBuf, credential: &[u8]) -> Volume {
        let backing = Box::new(FileBacking::open(&path, false).unwrap()) as Box<dyn BackingFile>;
        Volume::open(path, backing, OpenCredentials { outer: credential, hidden_protection: None }, false, core.worker_pool().clone()).unwrap()
    }

    fn create_fixture() -> (Core, NamedTempFile, Vec<u8>) {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).unwrap();
        let password = VolumePassword::new("shim test password").unwrap();
        let credential = mix_credentials(&password, &[]).unwrap();
        let core = Core::init(BasaltConfig::default()).unwrap();
        let options = CreationOptions {
            target_path: tmp.path().to_path_buf(),
            requested_size: 2 * 1024 * 1024,
            cascade: CascadeKind::Aes,
            kdf: basalt_kdf::by_name("Argon2id").unwrap(),
            quick: true,
            credential_material: credential.to_vec(),
            hidden: None,
        };
        core.create_volume(options).join().unwrap();
        (core, tmp, credential.to_vec())
    }

    #[test]
    fn loopback_file_backend_serves_size_query() {
        let (core, tmp, credential) = create_fixture();
        let volume = open_test_volume(&core, tmp.path().to_path_buf(), &credential);
        let shared: SharedVolume = Arc::new(Mutex::new(volume));

        let backend = LoopbackFileBackend::start(shared).unwrap();
        let mut stream = TcpStream::connect(backend.local_addr()).unwrap();
        write_request(&mut stream, &Request::SizeQuery).unwrap();
        match read_response(&mut stream).unwrap() {
            Response::Size(size) => assert_eq!(size, 2 * 1024 * 1024),
            other => panic!("unexpected response: {other:?}"),
        }

        write_request(&mut stream, &Request::Shutdown).unwrap();
        let _ = read_response(&mut stream);
        drop(stream);
        backend.stop();
    }

    #[test]
    fn loopback_file_backend_round_trips_a_sector() {
        let (core, tmp, credential) = create_fixture();
        let volume = open_test_volume(&core, tmp.path().to_path_buf(), &credential);
        let shared: SharedVolume = Arc::new(Mutex::new(volume));

        let backend = LoopbackFileBackend::start(shared).unwrap();
        let mut stream = TcpStream::connect(backend.local_addr()).unwrap();

        let payload = vec![0x7Au8; 512];
        write_request(&mut stream, &Request::Write { offset: 0, data: payload.clone() }).unwrap();
        assert!(matches!(read_response(&mut stream).unwrap(), Response::Ack));

        write_request(&mut stream, &Request::Read { offset: 0, len: 512 }).unwrap();
        match read_response(&mut stream).unwrap() {
            Response::Data(data) => assert_eq!(data, payload),
            other => panic!("unexpected response: {other:?}"),
        }

        write_request(&mut stream, &Request::Shutdown).unwrap();
        let _ = read_response(&mut stream);
        drop(stream);
        backend.stop();
    }

    #[test]
    fn by_name_recognizes_every_backend() {
        assert_eq!(ShimBackendKind::by_name("loopback-file"), Some(ShimBackendKind::LoopbackFile));
        assert_eq!(ShimBackendKind::by_name("nfs4-loopback"), Some(ShimBackendKind::Nfs4Loopback));
        assert_eq!(ShimBackendKind::by_name("iscsi-loopback"), Some(ShimBackendKind::IscsiLoopback));
        assert_eq!(ShimBackendKind::by_name("made-up"), None);
    }
}
