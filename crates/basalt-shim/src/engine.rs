//! The shared accept-loop engine every shim backend instantiation is built
//! from: a loopback-only TCP listener, one handler thread per connection,
//! and a drain-then-close shutdown sequence.
//!
//! Grounded on the teacher workspace's own hosted-mode networking (a plain
//! blocking `std::net::TcpListener` accept loop spawning a thread per
//! connection, no async runtime) rather than reaching for a crate this
//! corpus never uses for sockets.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{info, warn};

use crate::protocol::{read_request, write_response, Request};
use crate::volume_io::{handle_request, SharedVolume};

#[derive(Debug, Error)]
pub enum ShimError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("rejected non-loopback connection from {0}")]
    NonLoopback(SocketAddr),
}

type Result<T> = std::result::Result<T, ShimError>;

/// One running endpoint. `label` names the instantiation (`"loopback-file"`,
/// `"nfs4-loopback"`, `"iscsi-loopback"`) purely for logging — all three
/// share this same engine, per §4.8's "two instantiations share the same
/// lifecycle" requirement (a third, portable instantiation is included
/// alongside the original's two).
pub struct LoopbackEngine {
    label: &'static str,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
}

impl LoopbackEngine {
    /// Binds an ephemeral loopback port and starts the accept loop on a
    /// background thread. Returns once the listener is bound, not once a
    /// client has connected.
    pub fn start(volume: SharedVolume, label: &'static str) -> Result<LoopbackEngine> {
        let listener = TcpListener::bind((IpAddr::from([127, 0, 0, 1]), 0))?;
        let local_addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shutdown = shutdown.clone();
        let accept_handle = std::thread::Builder::new()
            .name(format!("basalt-shim-{label}"))
            .spawn(move || accept_loop(listener, volume, label, thread_shutdown))
            .expect("failed to spawn shim accept thread");

        info!(%label, %local_addr, "shim endpoint started");
        Ok(LoopbackEngine { label, local_addr, shutdown, accept_handle: Some(accept_handle) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals the accept loop to stop taking new connections, then
    /// unblocks `accept()` with a throwaway local connection so the
    /// background thread notices the flag without a poll timeout.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(self.local_addr);
    }

    /// Requests shutdown if not already requested, then blocks until the
    /// accept loop and every in-flight connection handler have drained.
    pub fn stop(mut self) {
        self.request_shutdown();
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        info!(label = %self.label, "shim endpoint stopped");
    }
}

fn accept_loop(listener: TcpListener, volume: SharedVolume, label: &'static str, shutdown: Arc<AtomicBool>) {
    let mut connection_handles = Vec::new();

    for incoming in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let stream = match incoming {
            Ok(s) => s,
            Err(_) => continue,
        };

        match stream.peer_addr() {
            Ok(peer) if peer.ip().is_loopback() => {}
            Ok(peer) => {
                warn!(%label, %peer, "rejected non-loopback shim connection");
                continue;
            }
            Err(_) => continue,
        }

        let conn_volume = volume.clone();
        let conn_shutdown = shutdown.clone();
        connection_handles.push(std::thread::spawn(move || serve_connection(stream, conn_volume, conn_shutdown)));
    }

    for handle in connection_handles {
        let _ = handle.join();
    }
}

/// Serves one client to completion: translates requests to Volume calls
/// one at a time until the client disconnects or sends `Shutdown`, then
/// drains (there is nothing left in flight, since requests are handled
/// synchronously one at a time) and closes.
fn serve_connection(mut stream: TcpStream, volume: SharedVolume, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let request = match read_request(&mut stream) {
            Ok(r) => r,
            Err(_) => break, // disconnect or malformed frame: drain-and-close
        };

        let is_shutdown = matches!(request, Request::Shutdown);
        let response = handle_request(&volume, request);
        let _ = write_response(&mut stream, &response);

        // A single failed request (Response::Error) does not tear down the
        // connection; the client decides whether to retry or disconnect.
        if is_shutdown {
            break;
        }
    }
}
