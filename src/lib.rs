//! Density-matrix quantum circuit simulation kernel.
//!
//! The numeric core lives under [`core::kernel`]; [`core::sim_cache`] memoizes results,
//! gate matrices and reduced-state data, and [`core::worker`] runs simulations on a
//! dedicated thread behind a JSON message contract.
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod io;
pub mod logging;

pub use crate::core::kernel::{Circuit, Engine, GateInstance, GateRegistry, InitialState, SimulationResult};
pub use crate::core::{SimError, SimResult};
