//! The three concrete shim instantiations. All three are the same
//! `LoopbackEngine` under a different name and default label: the original
//! implementation's NFS4 loopback server and iSCSI loopback target, plus a
//! portable `LoopbackFile` default that needs no host-OS mount helper to
//! exercise.

use std::net::SocketAddr;

use crate::engine::{LoopbackEngine, ShimError};
use crate::volume_io::SharedVolume;

/// A plain local endpoint reflecting the volume's decrypted bytes — no
/// network protocol beyond the shim's own framing. The portable default
/// used wherever no real NFS4/iSCSI loopback stack is available.
pub struct LoopbackFileBackend(LoopbackEngine);

impl LoopbackFileBackend {
    pub fn start(volume: SharedVolume) -> Result<LoopbackFileBackend, ShimError> {
        LoopbackEngine::start(volume, "loopback-file").map(LoopbackFileBackend)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.0.local_addr()
    }

    pub fn stop(self) {
        self.0.stop();
    }
}

/// Models the original implementation's NFS4 loopback server
/// (`LamarckFUSE`/`DarwinFUSE`): presents the decrypted volume as a single
/// file in a tiny virtual directory, mounted by the host OS over loopback
/// NFS. The NFS4 wire protocol itself is out of scope here; this
/// instantiation shares the generic engine and differs only in the label
/// under which it is mounted and logged.
pub struct Nfs4LoopbackBackend(LoopbackEngine);

impl Nfs4LoopbackBackend {
    pub fn start(volume: SharedVolume) -> Result<Nfs4LoopbackBackend, ShimError> {
        LoopbackEngine::start(volume, "nfs4-loopback").map(Nfs4LoopbackBackend)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.0.local_addr()
    }

    pub fn stop(self) {
        self.0.stop();
    }
}

/// Models the original implementation's iSCSI loopback target
/// (`iscsi_target.c`): presents the decrypted volume as a real block
/// device via the host OS's built-in iSCSI initiator. As with the NFS4
/// instantiation, the iSCSI wire protocol is out of scope; this shares the
/// generic engine.
pub struct IscsiLoopbackBackend(LoopbackEngine);

impl IscsiLoopbackBackend {
    pub fn start(volume: SharedVolume) -> Result<IscsiLoopbackBackend, ShimError> {
        LoopbackEngine::start(volume, "iscsi-loopback").map(IscsiLoopbackBackend)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.0.local_addr()
    }

    pub fn stop(self) {
        self.0.stop();
    }
}
