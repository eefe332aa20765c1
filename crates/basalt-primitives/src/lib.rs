//! Block ciphers, hash functions, and cipher cascades.
//!
//! This crate has no notion of sectors, headers, or volumes — it only
//! provides the keyed primitives that [`basalt-mode`] and [`basalt-kdf`]
//! build on.

pub mod cascade;
pub mod cipher;
pub mod hash;
pub mod selftest;

pub use cascade::{Cascade, CascadeKind};
pub use cipher::{BlockCipher256, BLOCK_SIZE, KEY_SIZE};
pub use hash::HashFunction;
