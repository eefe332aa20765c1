use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use twofish::Twofish;

use super::{BlockCipher256, BLOCK_SIZE, KEY_SIZE};

/// Twofish with a 256-bit key, wrapping RustCrypto's implementation.
pub struct Twofish256 {
    inner: Twofish,
}

impl BlockCipher256 for Twofish256 {
    fn name(&self) -> &'static str {
        "Twofish"
    }

    fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self { inner: Twofish::new(GenericArray::from_slice(key)) }
    }

    fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        self.inner.encrypt_block(GenericArray::from_mut_slice(block));
    }

    fn decrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        self.inner.decrypt_block(GenericArray::from_mut_slice(block));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let key = [0x11u8; KEY_SIZE];
        let cipher = Twofish256::new(&key);
        let mut block = *b"abcdefghijklmnop";
        let original = block;
        cipher.encrypt_block(&mut block);
        assert_ne!(block, original);
        cipher.decrypt_block(&mut block);
        assert_eq!(block, original);
    }
}
