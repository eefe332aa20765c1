//! Hash functions used by the RNG pool's mixing step and by the KDF
//! registry's HMAC constructions. Each one is wrapped behind
//! [`HashFunction`] so the RNG pool can hold "whichever hash the caller
//! selected" as a trait object.

use digest::Digest;

/// An arbitrary-length-input, fixed-length-output hash function.
pub trait HashFunction: Send + Sync {
    fn name(&self) -> &'static str;
    fn digest_size(&self) -> usize;
    fn hash(&self, data: &[u8]) -> Vec<u8>;
}

macro_rules! wrap_digest {
    ($wrapper:ident, $inner:ty, $name:expr) => {
        pub struct $wrapper;

        impl HashFunction for $wrapper {
            fn name(&self) -> &'static str {
                $name
            }

            fn digest_size(&self) -> usize {
                <$inner as Digest>::output_size()
            }

            fn hash(&self, data: &[u8]) -> Vec<u8> {
                <$inner>::digest(data).to_vec()
            }
        }
    };
}

wrap_digest!(Sha512Hash, sha2::Sha512, "SHA-512");
wrap_digest!(Sha1Hash, sha1::Sha1, "SHA-1");
wrap_digest!(Ripemd160Hash, ripemd::Ripemd160, "RIPEMD-160");
wrap_digest!(WhirlpoolHash, whirlpool::Whirlpool, "Whirlpool");

/// Every hash the RNG pool may be configured with, default first. This
/// mirrors the KDF registry's own ordering: SHA-512 is the modern default,
/// the others exist so the pool can reproduce the predecessor format's
/// self-test vectors.
pub fn available_hashes() -> Vec<Box<dyn HashFunction>> {
    vec![Box::new(Sha512Hash), Box::new(Sha1Hash), Box::new(Ripemd160Hash), Box::new(WhirlpoolHash)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_sizes_match_output() {
        for h in available_hashes() {
            assert_eq!(h.hash(b"abc").len(), h.digest_size());
        }
    }

    #[test]
    fn sha512_known_answer() {
        let digest = Sha512Hash.hash(b"abc");
        let expected = "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f";
        assert_eq!(hex::encode(digest), expected);
    }
}
