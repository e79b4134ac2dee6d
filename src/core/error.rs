use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type SimResult<T> = Result<T, SimError>;

/// Failure classes of the kernel. Gate-level classes are recovered by the engine,
/// circuit-level classes end up in `SimulationResult::error`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownGate,
    MissingOrInvalidParameter,
    InvalidQubitIndex,
    MalformedCircuit,
    NumericInstability,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("unknown gate '{0}'")]
    UnknownGate(String),

    #[error("gate '{gate}' requires parameter '{param}'")]
    MissingParameter { gate: String, param: String },

    #[error("gate '{gate}' got unusable value {value} for parameter '{param}'")]
    InvalidParameter { gate: String, param: String, value: f64 },

    #[error("gate '{gate}' has invalid targets {qubits:?} for a {num_qubits}-qubit register: {reason}")]
    InvalidQubitIndex {
        gate: String,
        qubits: Vec<usize>,
        num_qubits: usize,
        reason: String,
    },

    #[error("malformed circuit: {0}")]
    MalformedCircuit(String),

    #[error("division by a zero-magnitude complex number")]
    DivisionByZero,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid initial state: {0}")]
    InvalidInitialState(String),

    #[error("operator is not unitary (max |UU†-I| = {deviation:e})")]
    NotUnitary { deviation: f64 },

    #[error("worker: {0}")]
    Worker(String),
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::UnknownGate(_) => ErrorKind::UnknownGate,
            SimError::MissingParameter { .. } | SimError::InvalidParameter { .. } => {
                ErrorKind::MissingOrInvalidParameter
            }
            SimError::InvalidQubitIndex { .. } => ErrorKind::InvalidQubitIndex,
            SimError::MalformedCircuit(_)
            | SimError::DimensionMismatch { .. }
            | SimError::InvalidInitialState(_) => ErrorKind::MalformedCircuit,
            SimError::DivisionByZero | SimError::NotUnitary { .. } => ErrorKind::NumericInstability,
            SimError::Worker(_) => ErrorKind::Internal,
        }
    }

    /// True for the failures `apply` swallows (skip the gate, keep the state).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnknownGate | ErrorKind::MissingOrInvalidParameter | ErrorKind::InvalidQubitIndex
        )
    }

    pub fn invalid_qubits(gate: &str, qubits: &[usize], num_qubits: usize, reason: &str) -> Self {
        SimError::InvalidQubitIndex {
            gate: gate.to_string(),
            qubits: qubits.to_vec(),
            num_qubits,
            reason: reason.to_string(),
        }
    }
}
