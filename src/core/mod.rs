//! Simulation core: the numeric kernel, its memo stores and the off-thread worker.

pub mod cache_key;
pub mod error;
pub mod kernel;
pub mod sim_cache;
pub mod worker;

pub use error::{ErrorKind, SimError, SimResult};
