//! PBKDF2-HMAC over whatever digest the caller names. `pbkdf2_hmac` is
//! generic over the hash, so one function here backs every PBKDF2 entry in
//! the registry.

use pbkdf2::pbkdf2_hmac;
use sha2::digest::{Digest, FixedOutputReset};
use zeroize::Zeroizing;

pub fn derive<D>(password: &[u8], salt: &[u8], rounds: u32, key_len: usize) -> Zeroizing<Vec<u8>>
where
    D: Digest + FixedOutputReset + Clone,
{
    let mut out = Zeroizing::new(vec![0u8; key_len]);
    pbkdf2_hmac::<D>(password, salt, rounds, &mut out);
    out
}
