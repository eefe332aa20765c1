//! Argon2id, offered alongside the PBKDF2 entries for new volumes. Unlike
//! PBKDF2 its cost is tunable in both time and memory, which is why the
//! registry carries two presets (`Argon2id` and `Argon2id (max)`) rather
//! than one.

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

pub fn derive(password: &[u8], salt: &[u8], key_len: usize, t_cost: u32, m_cost_kib: u32, parallelism: u32) -> Zeroizing<Vec<u8>> {
    let params = Params::new(m_cost_kib, t_cost, parallelism, Some(key_len)).expect("fixed Argon2id parameters are always valid");
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = Zeroizing::new(vec![0u8; key_len]);
    argon2.hash_password_into(password, salt, &mut out).expect("fixed-length Argon2id derivation should not fail");
    out
}
