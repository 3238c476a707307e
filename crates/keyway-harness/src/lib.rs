//! Deterministic simulation harness for Keyway.
//!
//! Simulated implementations of the [`keyway_core::Environment`] and
//! [`keyway_core::Radio`] traits, so locks, phones and the backend run in
//! one process on a seeded RNG and tokio's virtual clock.
//!
//! - [`sim_env`]: seeded environment on tokio time
//! - [`sim_radio`]: in-memory radio with fault injection
//! - [`backend`]: the access service behind the client's backend trait
//! - [`scenario`]: deployment builder with mandatory oracles
//! - [`model`]: reference lock model for model-based tests

#![forbid(unsafe_code)]

pub mod backend;
pub mod model;
pub mod scenario;
pub mod sim_env;
pub mod sim_radio;

pub use backend::InProcessBackend;
pub use model::{ModelLock, Operation, OperationResult};
pub use scenario::{Scenario, World};
pub use sim_env::SimEnv;
pub use sim_radio::{Faults, SimLink, SimLock, SimRadio};
