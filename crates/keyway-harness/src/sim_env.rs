//! Seeded environment on tokio's clock.
//!
//! Randomness comes from a ChaCha8 stream so a seed replays the same
//! challenges and keys. Time is tokio's: under `start_paused` it is virtual
//! and advances only when every task is idle, so timeout tests finish
//! instantly and deterministically.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant, SystemTime},
};

use keyway_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall clock at the start of every simulation: 2023-11-14T22:13:20Z.
const EPOCH_SECS: u64 = 1_700_000_000;

/// Simulation environment.
///
/// Clones share one RNG stream, so the order of draws across actors is part
/// of the replay.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    started: tokio::time::Instant,
}

impl SimEnv {
    /// Environment with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment replaying `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            started: tokio::time::Instant::now(),
        }
    }

    /// Virtual time since this environment was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("elapsed", &self.elapsed()).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn wall_clock(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(EPOCH_SECS) + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
