//! Density-matrix simulation kernel.
pub mod circuit;
pub mod complex;
pub mod engine;
pub mod gates;
pub mod precision;
pub mod reduced;
pub mod sampling;

pub use circuit::{register_dim, Circuit, GateInstance, InitialState, SimulationOptions, MAX_QUBITS};
pub use complex::{c, ComplexExt, ComplexMatrix};
pub use num_complex::Complex64 as C64;
pub use engine::{embed_operator, Engine, SimWarning, SimulationResult};
pub use gates::{GateDef, GateKind, GateRegistry, RealApprox};
pub use reduced::{BlochVector, ReducedState};
pub use sampling::sample_counts;
