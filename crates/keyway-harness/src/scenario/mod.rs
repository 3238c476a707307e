//! Scenario testing with mandatory oracles.
//!
//! A scenario declares a deployment, brings it up through the same client
//! and backend code paths production uses, then hands the world to an
//! oracle. Tests keep driving the returned world for the interesting part.

mod builder;
pub mod oracle;
mod world;

pub use builder::{DEFAULT_SEED, RunnableScenario, Scenario};
pub use world::{Actor, SimClient, World};

/// Verifies a world, describing the first violation found.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
