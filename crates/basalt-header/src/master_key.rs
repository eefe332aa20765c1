//! The key material a decrypted header hands to the mode engine. Scoped to
//! the `Volume` that decrypted it; zeroized the moment it is dropped.

use zeroize::Zeroizing;

use basalt_mode::ModeKind;
use basalt_primitives::CascadeKind;

pub struct MasterKey {
    bytes: Zeroizing<Vec<u8>>,
    cascade: CascadeKind,
    mode: ModeKind,
}

impl MasterKey {
    pub fn new(bytes: Vec<u8>, cascade: CascadeKind, mode: ModeKind) -> MasterKey {
        MasterKey { bytes: Zeroizing::new(bytes), cascade, mode }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn cascade(&self) -> CascadeKind {
        self.cascade
    }

    pub fn mode(&self) -> ModeKind {
        self.mode
    }
}
