//! The KDF registry: every password-stretching function Basalt can derive a
//! header key with, in the fixed order the mount path tries them.
//!
//! A new volume's creator picks one [`KdfKind`] from [`creation_choices`].
//! Mounting an existing volume instead walks [`mount_order`] — legacy
//! entries first, since an existing volume is far more likely to need one
//! of those, and trying them first avoids paying for Argon2id's memory cost
//! on every legacy mount.

mod argon2id;
mod pbkdf2_hmac;
pub mod selftest;

use zeroize::Zeroizing;

/// One derivation strategy: a name stable across releases (it is stored
/// nowhere on disk, only reported in `VolumeInfo`, but still must not
/// change shape once volumes exist that were created with it), whether it
/// is a legacy predecessor-format entry, and the derive function itself.
#[derive(Clone, Copy)]
pub struct KdfKind {
    pub name: &'static str,
    pub legacy: bool,
    derive: fn(password: &[u8], salt: &[u8], key_len: usize) -> Zeroizing<Vec<u8>>,
}

impl KdfKind {
    /// Derives `key_len` bytes of key material from `password` and `salt`.
    /// The result is wrapped so it is zeroized when the caller drops it.
    pub fn derive(&self, password: &[u8], salt: &[u8], key_len: usize) -> Zeroizing<Vec<u8>> {
        (self.derive)(password, salt, key_len)
    }
}

const PBKDF2_SHA512_ITERS: u32 = 500_000;
const PBKDF2_RIPEMD160_ITERS: u32 = 655_331;
const PBKDF2_WHIRLPOOL_ITERS: u32 = 500_000;
const PBKDF2_SHA1_ITERS: u32 = 500_000;

// The predecessor format's iteration counts, kept only so its volumes can
// still be mounted; never offered when creating a new one.
const LEGACY_SHA512_ITERS: u32 = 1_000;
const LEGACY_RIPEMD160_ITERS: u32 = 2_000;
const LEGACY_WHIRLPOOL_ITERS: u32 = 1_000;
const LEGACY_SHA1_ITERS: u32 = 2_000;

const ARGON2ID_T_COST: u32 = 4;
const ARGON2ID_M_COST_KIB: u32 = 256 * 1024;
const ARGON2ID_PARALLELISM: u32 = 4;

const ARGON2ID_MAX_M_COST_KIB: u32 = 1024 * 1024;
const ARGON2ID_MAX_PARALLELISM: u32 = 8;

macro_rules! pbkdf2_kind {
    ($name:expr, $legacy:expr, $hash:ty, $iters:expr) => {
        KdfKind {
            name: $name,
            legacy: $legacy,
            derive: |password, salt, key_len| pbkdf2_hmac::derive::<$hash>(password, salt, $iters, key_len),
        }
    };
}

fn all_kinds() -> Vec<KdfKind> {
    vec![
        pbkdf2_kind!("PBKDF2-HMAC-SHA-512", false, sha2::Sha512, PBKDF2_SHA512_ITERS),
        pbkdf2_kind!("PBKDF2-HMAC-RIPEMD-160", false, ripemd::Ripemd160, PBKDF2_RIPEMD160_ITERS),
        pbkdf2_kind!("PBKDF2-HMAC-Whirlpool", false, whirlpool::Whirlpool, PBKDF2_WHIRLPOOL_ITERS),
        pbkdf2_kind!("PBKDF2-HMAC-SHA-1", false, sha1::Sha1, PBKDF2_SHA1_ITERS),
        KdfKind {
            name: "Argon2id",
            legacy: false,
            derive: |password, salt, key_len| {
                argon2id::derive(password, salt, key_len, ARGON2ID_T_COST, ARGON2ID_M_COST_KIB, ARGON2ID_PARALLELISM)
            },
        },
        KdfKind {
            name: "Argon2id (max)",
            legacy: false,
            derive: |password, salt, key_len| {
                argon2id::derive(
                    password,
                    salt,
                    key_len,
                    ARGON2ID_T_COST,
                    ARGON2ID_MAX_M_COST_KIB,
                    ARGON2ID_MAX_PARALLELISM,
                )
            },
        },
        pbkdf2_kind!("PBKDF2-HMAC-SHA-512 (legacy)", true, sha2::Sha512, LEGACY_SHA512_ITERS),
        pbkdf2_kind!("PBKDF2-HMAC-RIPEMD-160 (legacy)", true, ripemd::Ripemd160, LEGACY_RIPEMD160_ITERS),
        pbkdf2_kind!("PBKDF2-HMAC-Whirlpool (legacy)", true, whirlpool::Whirlpool, LEGACY_WHIRLPOOL_ITERS),
        pbkdf2_kind!("PBKDF2-HMAC-SHA-1 (legacy)", true, sha1::Sha1, LEGACY_SHA1_ITERS),
    ]
}

/// The order the mount path tries KDFs in: every legacy entry, then every
/// modern one. A successful trial is the first whose derived key makes the
/// header's CRC32s check out.
pub fn mount_order() -> Vec<KdfKind> {
    let kinds = all_kinds();
    let mut legacy: Vec<KdfKind> = kinds.iter().copied().filter(|k| k.legacy).collect();
    let modern: Vec<KdfKind> = kinds.iter().copied().filter(|k| !k.legacy).collect();
    legacy.extend(modern);
    legacy
}

/// The KDFs offered when creating a new volume: modern entries only, in
/// the registry's published order.
pub fn creation_choices() -> Vec<KdfKind> {
    all_kinds().iter().copied().filter(|k| !k.legacy).collect()
}

pub fn by_name(name: &str) -> Option<KdfKind> {
    all_kinds().into_iter().find(|k| k.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_order_tries_legacy_before_modern() {
        let order = mount_order();
        let first_modern = order.iter().position(|k| !k.legacy).expect("a modern entry exists");
        assert!(order[..first_modern].iter().all(|k| k.legacy), "a legacy entry appeared after a modern one");
    }

    #[test]
    fn creation_choices_excludes_legacy() {
        assert!(creation_choices().iter().all(|k| !k.legacy));
    }

    #[test]
    fn derive_is_deterministic_and_salt_sensitive() {
        let kind = by_name("PBKDF2-HMAC-SHA-512").unwrap();
        let a = kind.derive(b"hunter2", b"salt-one-salt-one", 64);
        let b = kind.derive(b"hunter2", b"salt-one-salt-one", 64);
        assert_eq!(&a[..], &b[..]);
        let c = kind.derive(b"hunter2", b"salt-two-salt-two", 64);
        assert_ne!(&a[..], &c[..]);
    }

    #[test]
    fn argon2id_derive_produces_requested_length() {
        let kind = by_name("Argon2id").unwrap();
        let dk = kind.derive(b"password", b"0123456789abcdef", 96);
        assert_eq!(dk.len(), 96);
    }

    #[test]
    fn by_name_is_case_sensitive_and_exact() {
        assert!(by_name("argon2id").is_none());
        assert!(by_name("Argon2id").is_some());
    }
}
