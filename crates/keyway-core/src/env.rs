//! Environment abstraction.
//!
//! Everything nondeterministic the protocol needs goes through
//! [`Environment`]: monotonic time, wall-clock time, sleeping and random
//! bytes. Production uses [`SystemEnv`]; the simulation harness substitutes a
//! seeded RNG and virtual time so runs replay exactly.

use std::{
    future::Future,
    time::{Duration, Instant, SystemTime},
};

use rand::{RngCore, rngs::OsRng};

/// Source of time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic now.
    fn now(&self) -> Instant;

    /// Wall-clock now, for timestamps that leave the process.
    fn wall_clock(&self) -> SystemTime;

    /// Suspend for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random u32.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    /// Seconds since the unix epoch, zero if the clock is before it.
    fn unix_seconds(&self) -> u64 {
        self.wall_clock().duration_since(SystemTime::UNIX_EPOCH).map_or(0, |d| d.as_secs())
    }
}

/// Real clock, tokio timers and the operating system RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        OsRng.fill_bytes(buffer);
    }
}
