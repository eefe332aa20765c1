//! Block ciphers used by the mode engine. Every entry here is 128-bit block,
//! 256-bit key — the only shapes a Basalt volume ever uses.

mod aes256;
mod serpent;
mod twofish256;

pub use aes256::Aes256;
pub use serpent::Serpent256;
pub use twofish256::Twofish256;

pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;

/// A single 128-bit block cipher keyed with a 256-bit key.
///
/// Implementors operate in place on a single block at a time; the mode
/// engine is responsible for chaining and tweaking across sectors.
pub trait BlockCipher256: Send + Sync {
    /// Human-readable algorithm name, as it appears in `VolumeInfo` and the
    /// header codec's cascade validation.
    fn name(&self) -> &'static str;

    fn new(key: &[u8; KEY_SIZE]) -> Self
    where
        Self: Sized;

    fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]);
    fn decrypt_block(&self, block: &mut [u8; BLOCK_SIZE]);
}

/// One named, constructible entry in the cipher registry the header codec's
/// trial-decryption loop walks.
pub struct CipherKind {
    pub name: &'static str,
    pub construct: fn(&[u8; KEY_SIZE]) -> Box<dyn BlockCipher256>,
}

/// The three primitive ciphers Basalt volumes may select, in the order the
/// header codec tries them during trial decryption of a single-cipher
/// volume.
pub fn primitive_kinds() -> &'static [CipherKind] {
    &[
        CipherKind { name: "AES", construct: |k| Box::new(Aes256::new(k)) },
        CipherKind { name: "Serpent", construct: |k| Box::new(Serpent256::new(k)) },
        CipherKind { name: "Twofish", construct: |k| Box::new(Twofish256::new(k)) },
    ]
}
