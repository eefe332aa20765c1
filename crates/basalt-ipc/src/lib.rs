//! Framed request/response IPC between an unprivileged caller and the
//! elevated helper process that owns raw device access (§4.10). The helper
//! links `basalt-core` directly and runs [`server::serve_connection`]
//! against it; the caller links this crate and drives an [`IpcClient`]
//! whose method shapes mirror `Core`'s own device-level operations, so the
//! facade crate can route a call through either one without branching on
//! privilege at every call site.
//!
//! Exceptions cross the boundary by kind, not by message — see
//! [`exception::ExceptionWire`] — so a caller matching on `CoreError`
//! variants behaves identically whether the error came from an in-process
//! `Core` or a round trip through the helper.

mod exception;
mod protocol;
mod wire;

pub mod client;
pub mod server;

pub use client::IpcClient;
pub use exception::ExceptionWire;
pub use wire::PROTOCOL_VERSION;

#[cfg(test)]
mod tests {
    use std::net::{TcpListener, TcpStream};

    use basalt_core::{BasaltConfig, Core, CoreError};

    use crate::client::IpcClient;
    use crate::server::serve_connection;

    #[test]
    fn client_and_server_round_trip_over_a_loopback_connection() {
        let core = Core::init(BasaltConfig::default()).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            serve_connection(&core, &mut stream).unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut client = IpcClient::connect(stream).unwrap();

        let devices = client.get_host_devices(true).unwrap();
        assert!(devices.len() <= 64, "sanity bound on an unfiltered listing");

        let err = client.close_volume(7).unwrap_err();
        assert!(matches!(err, CoreError::MountedVolumeInUse { slot: 7 }));

        drop(client);
        handle.join().unwrap();
    }
}
