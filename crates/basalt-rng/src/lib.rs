//! The process-wide entropy pool. One [`Pool`] backs every salt, master
//! key, and keyfile-free volume created in a process; [`start`]/[`stop`]
//! gate its lifecycle and [`get_data`] is the only way out.

use std::sync::Mutex;

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

use basalt_primitives::hash::{HashFunction, Sha512Hash};

/// Pool size in bytes. TrueCrypt-derived implementations use 320; the spec
/// requires at least that much.
pub const POOL_SIZE: usize = 320;

/// Bytes absorbed via `add_to_pool` before an automatic re-mix.
const MAX_BYTES_BEFORE_MIX: usize = 16;

#[derive(Debug, Error)]
pub enum RngError {
    #[error("RNG pool is not running")]
    NotRunning,
    #[error("RNG pool is already running")]
    AlreadyRunning,
    #[error("requested {0} bytes but the pool is only {1} bytes")]
    RequestTooLarge(usize, usize),
    #[error("failed to draw system entropy")]
    SystemEntropy,
}

type Result<T> = std::result::Result<T, RngError>;

struct State {
    running: bool,
    pool: [u8; POOL_SIZE],
    write_cursor: usize,
    read_cursor: usize,
    bytes_since_mix: usize,
    hash: Box<dyn HashFunction>,
}

impl Drop for State {
    fn drop(&mut self) {
        self.pool.zeroize();
    }
}

/// The entropy pool. Every operation is serialized through an internal
/// mutex, matching the single process-wide instance the mount/create paths
/// share.
pub struct Pool {
    state: Mutex<State>,
}

impl Default for Pool {
    fn default() -> Pool {
        Pool::new()
    }
}

impl Pool {
    pub fn new() -> Pool {
        Pool {
            state: Mutex::new(State {
                running: false,
                pool: [0u8; POOL_SIZE],
                write_cursor: 0,
                read_cursor: 0,
                bytes_since_mix: 0,
                hash: Box::new(Sha512Hash),
            }),
        }
    }

    /// Zeroes the pool, binds the default hash (SHA-512), and draws a
    /// mandatory system-entropy fill. Failing the initial draw aborts
    /// start: the pool is left not running.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock().expect("RNG pool mutex poisoned");
        if state.running {
            return Err(RngError::AlreadyRunning);
        }
        state.pool = [0u8; POOL_SIZE];
        state.write_cursor = 0;
        state.read_cursor = 0;
        state.bytes_since_mix = 0;
        state.hash = Box::new(Sha512Hash);
        state.running = true;
        drop(state);

        if let Err(e) = self.add_system_entropy() {
            let mut state = self.state.lock().expect("RNG pool mutex poisoned");
            state.running = false;
            return Err(e);
        }
        Ok(())
    }

    pub fn stop(&self) {
        let mut state = self.state.lock().expect("RNG pool mutex poisoned");
        state.pool.zeroize();
        state.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().expect("RNG pool mutex poisoned").running
    }

    /// Binds a different hash function for pool mixing. Matches `SetHash`:
    /// callable any time, running or not.
    pub fn set_hash(&self, hash: Box<dyn HashFunction>) {
        self.state.lock().expect("RNG pool mutex poisoned").hash = hash;
    }

    /// XORs `data` into the pool at the write cursor, advancing it modulo
    /// the pool size, and re-mixes once enough bytes have accumulated.
    pub fn add_to_pool(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().expect("RNG pool mutex poisoned");
        if !state.running {
            return Err(RngError::NotRunning);
        }
        Self::add_to_pool_locked(&mut state, data);
        Ok(())
    }

    fn add_to_pool_locked(state: &mut State, data: &[u8]) {
        for &byte in data {
            let cursor = state.write_cursor;
            state.pool[cursor] ^= byte;
            state.write_cursor = (cursor + 1) % POOL_SIZE;
            state.bytes_since_mix += 1;
            if state.bytes_since_mix >= MAX_BYTES_BEFORE_MIX {
                Self::hash_mix_locked(state);
            }
        }
    }

    fn hash_mix_locked(state: &mut State) {
        state.bytes_since_mix = 0;
        let mut pool_pos = 0;
        while pool_pos < POOL_SIZE {
            let digest = state.hash.hash(&state.pool);
            for &byte in &digest {
                if pool_pos >= POOL_SIZE {
                    break;
                }
                state.pool[pool_pos] ^= byte;
                pool_pos += 1;
            }
        }
    }

    fn add_system_entropy(&self) -> Result<()> {
        let mut buf = [0u8; POOL_SIZE];
        OsRng.try_fill_bytes(&mut buf).map_err(|_| RngError::SystemEntropy)?;
        let mut state = self.state.lock().expect("RNG pool mutex poisoned");
        Self::add_to_pool_locked(&mut state, &buf);
        buf.zeroize();
        Ok(())
    }

    /// Fills `out` with whitened pool output: system entropy is drawn and
    /// mixed in before and after the XOR-read, so the output leaks nothing
    /// about the pool's prior state.
    pub fn get_data(&self, out: &mut [u8]) -> Result<()> {
        if out.len() > POOL_SIZE {
            return Err(RngError::RequestTooLarge(out.len(), POOL_SIZE));
        }
        if !self.is_running() {
            return Err(RngError::NotRunning);
        }

        self.add_system_entropy()?;
        {
            let mut state = self.state.lock().expect("RNG pool mutex poisoned");
            Self::hash_mix_locked(&mut state);
            Self::xor_read_locked(&mut state, out);
        }

        self.add_system_entropy()?;
        {
            let mut state = self.state.lock().expect("RNG pool mutex poisoned");
            Self::hash_mix_locked(&mut state);
            Self::xor_read_locked(&mut state, out);
        }

        Ok(())
    }

    fn xor_read_locked(state: &mut State, out: &mut [u8]) {
        for byte in out.iter_mut() {
            let cursor = state.read_cursor;
            *byte ^= state.pool[cursor];
            state.read_cursor = (cursor + 1) % POOL_SIZE;
        }
    }
}
