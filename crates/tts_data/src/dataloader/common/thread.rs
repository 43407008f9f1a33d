//! Thread-local worker identity and random state.
//!
//! Every loader worker owns its RNG, so random crops drawn while collating need
//! no locking and two workers never share a random stream. Outside a worker
//! (e.g. a collator called directly), draws fall back to `rand::rng()`.

use rand::rngs::StdRng;
use rand::Rng as _;
use rand::SeedableRng;
use std::cell::RefCell;
use std::ops::Range;

thread_local! {
    /// Id of the loader worker running on this thread (0 on the main thread).
    pub static WORKER_ID: RefCell<usize> = const { RefCell::new(0) };

    /// Per-worker RNG used by collators for crop offsets.
    pub static WORKER_RNG: RefCell<Option<StdRng>> = const { RefCell::new(None) };
}

/// Id of the loader worker running the current thread.
///
/// Inside a collator this tells which worker builds the batch. Inline loading
/// and any thread outside a loader report 0.
pub fn current_worker_id() -> usize {
    WORKER_ID.with(|id| *id.borrow())
}

/// Builds the RNG for a given worker and epoch.
/// Seed formula: base_seed + (epoch << 32) + worker_id
pub fn seeded_worker_rng(worker_id: usize, epoch: usize, base_seed: u64) -> StdRng {
    let seed = base_seed
        .wrapping_add((epoch as u64) << 32)
        .wrapping_add(worker_id as u64);
    StdRng::seed_from_u64(seed)
}

/// Seeds this thread's RNG for a given worker and epoch.
pub fn init_worker_rng(worker_id: usize, epoch: usize, base_seed: u64) {
    let seeded = seeded_worker_rng(worker_id, epoch, base_seed);
    WORKER_RNG.with(|rng| *rng.borrow_mut() = Some(seeded));
}

/// Clears this thread's RNG so later draws use `rand::rng()` again.
pub fn reset_worker_rng() {
    WORKER_RNG.with(|rng| *rng.borrow_mut() = None);
}

/// Swaps `rng` into `WORKER_RNG` on creation and back out on drop.
struct InstalledRng<'a> {
    rng: &'a mut Option<StdRng>,
}

impl<'a> InstalledRng<'a> {
    fn new(rng: &'a mut Option<StdRng>) -> Self {
        WORKER_RNG.with(|slot| std::mem::swap(&mut *slot.borrow_mut(), rng));
        Self { rng }
    }
}

impl Drop for InstalledRng<'_> {
    fn drop(&mut self) {
        WORKER_RNG.with(|slot| std::mem::swap(&mut *slot.borrow_mut(), self.rng));
    }
}

/// Runs `f` with `rng` as this thread's worker RNG.
///
/// The thread's previous RNG is restored afterwards and `rng` keeps the state
/// `f` advanced it to, so several owners can share one thread without
/// touching each other's streams.
pub(crate) fn with_installed_rng<T>(rng: &mut Option<StdRng>, f: impl FnOnce() -> T) -> T {
    let _installed = InstalledRng::new(rng);
    f()
}

/// Draws a uniform integer from `range` using the worker RNG.
///
/// Panics on an empty range; callers check it first.
pub fn worker_gen_range(range: Range<i64>) -> i64 {
    WORKER_RNG.with(|rng| match rng.borrow_mut().as_mut() {
        Some(rng) => rng.random_range(range),
        None => rand::rng().random_range(range),
    })
}
