//! Thread-local worker identity and random source.
//!
//! Every random transform draws from the calling thread's worker RNG. Loader
//! workers seed it with [`init_worker_rng`]; threads that never seed it fall
//! back to the system thread RNG.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::cell::RefCell;

thread_local! {
    /// Thread-local worker ID (0 to num_workers-1), assigned when a loader
    /// worker is spawned. The main thread reports 0.
    pub static WORKER_ID: RefCell<usize> = const { RefCell::new(0) };

    /// Thread-local RNG for deterministic augmentation in workers
    pub static WORKER_RNG: RefCell<Option<StdRng>> = const { RefCell::new(None) };
}

/// Seed formula: base_seed + (epoch << 32) + worker_id
pub fn worker_seed(worker_id: usize, epoch: usize, base_seed: u64) -> u64 {
    base_seed
        .wrapping_add((epoch as u64) << 32)
        .wrapping_add(worker_id as u64)
}

/// Initialize worker's RNG based on worker_id, epoch, and base seed.
pub fn init_worker_rng(worker_id: usize, epoch: usize, base_seed: u64) {
    let seed = worker_seed(worker_id, epoch, base_seed);
    WORKER_RNG.with(|rng| *rng.borrow_mut() = Some(StdRng::seed_from_u64(seed)))
}

/// Drops the seeded RNG so the thread goes back to system randomness.
pub fn clear_worker_rng() {
    WORKER_RNG.with(|rng| *rng.borrow_mut() = None)
}

/// Returns the ID of the worker running on this thread.
pub fn current_worker_id() -> usize {
    WORKER_ID.with(|id| *id.borrow())
}

/// Runs `f` with the worker RNG, or the system thread RNG when none is seeded.
///
/// Must not be nested: the closure holds the thread-local borrow.
pub fn with_worker_rng<R>(f: impl FnOnce(&mut dyn RngCore) -> R) -> R {
    WORKER_RNG.with(|rng| {
        let mut rng_ref = rng.borrow_mut();
        match rng_ref.as_mut() {
            Some(rng) => f(rng),
            None => f(&mut rand::rng()),
        }
    })
}
