//! A fixed-size pool of worker threads that the Volume object hands sector
//! I/O buffers to, one fragment per worker, joining before any call
//! returns. Started at core init, stopped at core shutdown; never
//! survives a fork (see `restart_after_fork`).

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use thiserror::Error;

use basalt_mode::Mode;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is not running")]
    NotRunning,
    #[error("a worker panicked while processing a fragment")]
    WorkerPanicked,
    #[error(transparent)]
    Mode(#[from] basalt_mode::ModeError),
}

type Result<T> = std::result::Result<T, PoolError>;

/// A raw pointer to caller-owned buffer data, smuggled across the
/// persistent worker threads. Safe only because `run` blocks on every
/// fragment's completion signal before it returns, so the borrow the
/// pointer stands in for never outlives the call that created it.
struct FragmentPtr {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for FragmentPtr {}

impl FragmentPtr {
    fn as_mut_slice(&self) -> &'static mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

/// A raw pointer to the keyed mode engine, shared read-only across
/// workers for the duration of one `run` call, under the same borrow
/// discipline as `FragmentPtr`.
struct ModePtr(*const dyn Mode);
unsafe impl Send for ModePtr {}
unsafe impl Sync for ModePtr {}

impl ModePtr {
    fn as_ref(&self) -> &'static dyn Mode {
        unsafe { &*self.0 }
    }
}

struct Job {
    mode: ModePtr,
    fragment: FragmentPtr,
    base_sector_index: u64,
    sector_size: u32,
    encrypt: bool,
    done: Sender<std::result::Result<(), basalt_mode::ModeError>>,
}

fn run_job(job: Job) {
    let mode = job.mode.as_ref();
    let buf = job.fragment.as_mut_slice();
    let result = if job.encrypt {
        mode.encrypt_sectors(buf, job.base_sector_index, job.sector_size)
    } else {
        mode.decrypt_sectors(buf, job.base_sector_index, job.sector_size)
    };
    // The caller is always still waiting on `done` at this point (`run`
    // doesn't return until every fragment reports in), so a send failure
    // here would mean a logic bug, not a legitimate disconnect.
    let _ = job.done.send(result);
}

const MAX_WORKERS: usize = 16;

pub struct WorkerPool {
    job_tx: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Sizing is chosen at start: one worker per logical CPU, clamped to
    /// `MAX_WORKERS`.
    pub fn start() -> Arc<WorkerPool> {
        let worker_count = num_cpus::get().clamp(1, MAX_WORKERS);
        let (job_tx, job_rx) = bounded::<Job>(worker_count * 4);

        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let job_rx = job_rx.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("basalt-worker-{id}"))
                    .spawn(move || {
                        while let Ok(job) = job_rx.recv() {
                            run_job(job);
                        }
                    })
                    .expect("failed to spawn worker thread"),
            );
        }

        Arc::new(WorkerPool { job_tx: Mutex::new(Some(job_tx)), handles: Mutex::new(handles), worker_count })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn is_running(&self) -> bool {
        self.job_tx.lock().expect("worker pool mutex poisoned").is_some()
    }

    /// Stops accepting new jobs and waits for every worker thread to
    /// drain its queue and exit. Dismount is gated on the pool being
    /// idle, so this never races an in-flight `run`.
    pub fn stop(&self) {
        self.job_tx.lock().expect("worker pool mutex poisoned").take();
        let mut handles = self.handles.lock().expect("worker pool mutex poisoned");
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Splits `buf` into one fragment per worker (each at least one
    /// sector), dispatches a mode-engine job per fragment, and blocks
    /// until every fragment reports in. The first fragment's error, if
    /// any, is what the caller sees — matching the "first exception wins"
    /// policy for a job that fails.
    pub fn run(&self, mode: &dyn Mode, buf: &mut [u8], base_sector_index: u64, sector_size: u32, encrypt: bool) -> Result<()> {
        let job_tx = {
            let guard = self.job_tx.lock().expect("worker pool mutex poisoned");
            guard.clone().ok_or(PoolError::NotRunning)?
        };

        let sector_size_usize = sector_size as usize;
        let total_sectors = buf.len() / sector_size_usize;
        let fragment_count = self.worker_count.min(total_sectors.max(1));
        let sectors_per_fragment = total_sectors.div_ceil(fragment_count.max(1)).max(1);
        let fragment_bytes = sectors_per_fragment * sector_size_usize;

        let (done_tx, done_rx) = bounded(fragment_count.max(1));
        let mode_ptr = ModePtr(mode as *const dyn Mode);

        let mut dispatched = 0usize;
        let mut offset = 0usize;
        while offset < buf.len() {
            let end = (offset + fragment_bytes).min(buf.len());
            let fragment = FragmentPtr { ptr: unsafe { buf.as_mut_ptr().add(offset) }, len: end - offset };
            let base = base_sector_index + (offset / sector_size_usize) as u64;

            job_tx
                .send(Job { mode: ModePtr(mode_ptr.0), fragment, base_sector_index: base, sector_size, encrypt, done: done_tx.clone() })
                .map_err(|_| PoolError::NotRunning)?;

            dispatched += 1;
            offset = end;
        }

        let mut first_error = None;
        for _ in 0..dispatched {
            match done_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(PoolError::Mode(e));
                }
                Err(_) => {
                    first_error.get_or_insert(PoolError::WorkerPanicked);
                }
            };
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// The pool does not survive a fork (the userspace shim may
    /// daemonize by forking): the child calls this to rebuild a fresh
    /// pool rather than trying to resurrect threads that no longer
    /// exist in its address space.
    pub fn restart_after_fork() -> Arc<WorkerPool> {
        WorkerPool::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_mode::XtsMode;
    use basalt_primitives::CascadeKind;

    fn mode() -> XtsMode {
        let key: Vec<u8> = (0..XtsMode::key_len(CascadeKind::Aes)).map(|i| i as u8).collect();
        XtsMode::new(CascadeKind::Aes, &key).unwrap()
    }

    #[test]
    fn run_matches_sequential_encrypt() {
        let pool = WorkerPool::start();
        let m = mode();
        let mut via_pool = vec![0x5Au8; 512 * 8];
        let mut sequential = via_pool.clone();

        pool.run(&m, &mut via_pool, 100, 512, true).unwrap();
        m.encrypt_sectors(&mut sequential, 100, 512).unwrap();

        assert_eq!(via_pool, sequential);
        pool.stop();
    }

    #[test]
    fn run_round_trips_through_the_pool() {
        let pool = WorkerPool::start();
        let m = mode();
        let mut buf = vec![0x3Cu8; 512 * 5];
        let original = buf.clone();

        pool.run(&m, &mut buf, 0, 512, true).unwrap();
        assert_ne!(buf, original);
        pool.run(&m, &mut buf, 0, 512, false).unwrap();
        assert_eq!(buf, original);

        pool.stop();
    }

    #[test]
    fn stopped_pool_rejects_new_work() {
        let pool = WorkerPool::start();
        pool.stop();
        let m = mode();
        let mut buf = vec![0u8; 512];
        assert!(matches!(pool.run(&m, &mut buf, 0, 512, true), Err(PoolError::NotRunning)));
    }
}
