//! Circuit descriptors as handed over by editors and format translators.
use std::collections::BTreeMap;
use std::time::Duration;

use num_complex::Complex64 as C64;
use serde::{Deserialize, Serialize};

use crate::core::error::{SimError, SimResult};
use crate::core::kernel::complex::{c, ComplexMatrix};

/// Register sizes above this are rejected as malformed (the engine builds dense
/// 2^n × 2^n operators).
pub const MAX_QUBITS: usize = 12;

/// Side length of the density matrix for a register of `num_qubits` qubits.
/// Sizes outside `1..=MAX_QUBITS` are malformed.
pub fn register_dim(num_qubits: usize) -> SimResult<usize> {
    if num_qubits == 0 || num_qubits > MAX_QUBITS {
        return Err(SimError::MalformedCircuit(format!(
            "register of {num_qubits} qubits is outside 1..={MAX_QUBITS}"
        )));
    }
    Ok(1usize << num_qubits)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateInstance {
    pub name: String,
    pub qubits: Vec<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, f64>,
}

impl GateInstance {
    pub fn new(name: impl Into<String>, qubits: impl Into<Vec<usize>>) -> Self {
        Self { name: name.into(), qubits: qubits.into(), parameters: BTreeMap::new() }
    }

    pub fn with_angle(mut self, theta: f64) -> Self {
        self.parameters.insert("theta".to_string(), theta);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Targets must be distinct, in range, and exactly `arity` long.
    pub fn check_targets(&self, arity: usize, num_qubits: usize) -> SimResult<()> {
        if self.qubits.len() != arity {
            return Err(SimError::invalid_qubits(
                &self.name,
                &self.qubits,
                num_qubits,
                &format!("expected {arity} target(s)"),
            ));
        }
        if let Some(q) = self.qubits.iter().find(|&&q| q >= num_qubits) {
            return Err(SimError::invalid_qubits(
                &self.name,
                &self.qubits,
                num_qubits,
                &format!("qubit {q} out of range"),
            ));
        }
        for (i, q) in self.qubits.iter().enumerate() {
            if self.qubits[..i].contains(q) {
                return Err(SimError::invalid_qubits(&self.name, &self.qubits, num_qubits, "duplicate target"));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circuit {
    pub num_qubits: usize,
    #[serde(default)]
    pub gates: Vec<GateInstance>,
}

impl Circuit {
    pub fn new(num_qubits: usize) -> Self {
        Self { num_qubits, gates: Vec::new() }
    }

    pub fn gate(mut self, name: &str, qubits: &[usize]) -> Self {
        self.gates.push(GateInstance::new(name, qubits));
        self
    }

    pub fn rotation(mut self, name: &str, qubits: &[usize], theta: f64) -> Self {
        self.gates.push(GateInstance::new(name, qubits).with_angle(theta));
        self
    }

    pub fn push(mut self, g: GateInstance) -> Self {
        self.gates.push(g);
        self
    }

    pub fn dim(&self) -> usize {
        1usize << self.num_qubits
    }

    /// Circuit-level sanity only; per-gate problems are handled by the engine.
    pub fn validate(&self) -> SimResult<()> {
        if self.num_qubits == 0 {
            return Err(SimError::MalformedCircuit("circuit has zero qubits".into()));
        }
        if self.num_qubits > MAX_QUBITS {
            return Err(SimError::MalformedCircuit(format!(
                "{} qubits exceeds the supported maximum of {MAX_QUBITS}",
                self.num_qubits
            )));
        }
        if let Some((i, g)) = self.gates.iter().enumerate().find(|(_, g)| g.name.trim().is_empty()) {
            return Err(SimError::MalformedCircuit(format!(
                "gate #{i} has an empty name (targets {:?})",
                g.qubits
            )));
        }
        Ok(())
    }

    pub fn bell() -> Self {
        Circuit::new(2).gate("H", &[0]).gate("CNOT", &[0, 1])
    }

    pub fn ghz(n: usize) -> Self {
        let mut circ = Circuit::new(n).gate("H", &[0]);
        for q in 1..n {
            circ = circ.gate("CNOT", &[q - 1, q]);
        }
        circ
    }
}

/// Starting point of a simulation.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InitialState {
    /// |0…0⟩⟨0…0|
    #[default]
    Zero,
    /// Computational basis state, qubit 0 = most significant bit.
    Basis(usize),
    /// Pure state amplitudes as `[re, im]` pairs; normalized on use.
    Amplitudes(Vec<[f64; 2]>),
    MaximallyMixed,
    Density(ComplexMatrix),
}

impl InitialState {
    /// Build the density matrix for an `num_qubits` register.
    pub fn density(&self, num_qubits: usize) -> SimResult<ComplexMatrix> {
        let dim = register_dim(num_qubits)?;
        match self {
            InitialState::Zero => Ok(basis_density(dim, 0)),
            InitialState::Basis(k) => {
                if *k >= dim {
                    return Err(SimError::InvalidInitialState(format!(
                        "basis index {k} outside a {dim}-dimensional register"
                    )));
                }
                Ok(basis_density(dim, *k))
            }
            InitialState::Amplitudes(amps) => {
                if amps.len() != dim {
                    return Err(SimError::DimensionMismatch { expected: dim, actual: amps.len() });
                }
                let psi: Vec<C64> = amps.iter().map(|[re, im]| c(*re, *im)).collect();
                let norm = psi.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
                if !norm.is_finite() || norm < 1e-12 {
                    return Err(SimError::InvalidInitialState("amplitude vector has zero norm".into()));
                }
                let psi: Vec<C64> = psi.iter().map(|z| *z / norm).collect();
                Ok(ComplexMatrix::outer(&psi))
            }
            InitialState::MaximallyMixed => {
                Ok(ComplexMatrix::identity(dim).scale(c(1.0 / dim as f64, 0.0)))
            }
            InitialState::Density(m) => {
                if m.nrows() != dim || m.ncols() != dim {
                    return Err(SimError::DimensionMismatch { expected: dim, actual: m.nrows() });
                }
                Ok(m.clone())
            }
        }
    }

    /// Stable textual descriptor used in cache keys.
    pub fn descriptor(&self) -> String {
        match self {
            InitialState::Zero => "zero".into(),
            InitialState::Basis(k) => format!("basis:{k}"),
            InitialState::Amplitudes(a) => {
                let parts: Vec<String> = a
                    .iter()
                    .map(|[re, im]| format!("{}{}", fmt_f64(*re), fmt_signed(*im)))
                    .collect();
                format!("amps:[{}]", parts.join(","))
            }
            InitialState::MaximallyMixed => "mixed".into(),
            InitialState::Density(m) => {
                let parts: Vec<String> = m
                    .rows()
                    .iter()
                    .flatten()
                    .map(|z| format!("{}{}", fmt_f64(z.re), fmt_signed(z.im)))
                    .collect();
                format!("rho{}x{}:[{}]", m.nrows(), m.ncols(), parts.join(","))
            }
        }
    }
}

fn basis_density(dim: usize, k: usize) -> ComplexMatrix {
    let mut rho = ComplexMatrix::zeros(dim, dim);
    rho[(k, k)] = c(1.0, 0.0);
    rho
}

/// Shortest round-trip formatting with `-0.0` folded into `0`.
pub(crate) fn fmt_f64(v: f64) -> String {
    let v = if v == 0.0 { 0.0 } else { v };
    format!("{v:?}")
}

fn fmt_signed(v: f64) -> String {
    let s = fmt_f64(v);
    if s.starts_with('-') {
        format!("{s}i")
    } else {
        format!("+{s}i")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOptions {
    /// Compute per-qubit reduced states.
    pub reduced_states: bool,
    /// Consult and fill the result cache.
    pub use_cache: bool,
    /// Overrides the cache's default TTL for this result.
    #[serde(skip)]
    pub ttl: Option<Duration>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self { reduced_states: true, use_cache: true, ttl: None }
    }
}

impl SimulationOptions {
    /// Only the options that change the result take part in the cache key.
    pub fn descriptor(&self) -> String {
        format!("reduced={}", u8::from(self.reduced_states))
    }
}
