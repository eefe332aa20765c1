use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256 as RcAes256;

use super::{BlockCipher256, BLOCK_SIZE, KEY_SIZE};

/// AES-256, wrapping RustCrypto's constant-time software implementation.
pub struct Aes256 {
    inner: RcAes256,
}

impl BlockCipher256 for Aes256 {
    fn name(&self) -> &'static str {
        "AES"
    }

    fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self { inner: RcAes256::new(GenericArray::from_slice(key)) }
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
        let key = [0x42u8; KEY_SIZE];
        let cipher = Aes256::new(&key);
        let mut block = *b"0123456789abcdef";
        let original = block;
        cipher.encrypt_block(&mut block);
        assert_ne!(block, original);
        cipher.decrypt_block(&mut block);
        assert_eq!(block, original);
    }
}
