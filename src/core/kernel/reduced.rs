//! Single-qubit views of a register: partial trace, Bloch vector and the scalar
//! metrics the visualizers plot.
//!
//! Bit convention matches the engine: qubit 0 is the most significant bit of a basis
//! index.
use serde::{Deserialize, Serialize};

use crate::core::error::{SimError, SimResult};
use crate::core::kernel::circuit::register_dim;
use crate::core::kernel::complex::{c, ComplexMatrix};
use crate::core::kernel::gates;
use crate::core::kernel::precision::{eigenvalues_2x2, hermitian_eigen, hermitian_eigenvalues};

/// Eigenvalues below this contribute nothing to entropies.
const ENTROPY_CUTOFF: f64 = 1e-15;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlochVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BlochVector {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x: x.clamp(-1.0, 1.0), y: y.clamp(-1.0, 1.0), z: z.clamp(-1.0, 1.0) }
    }

    /// From a 2×2 reduced density matrix: `x = 2 Re ρ01`, `y = 2 Im ρ10`,
    /// `z = Re ρ00 − Re ρ11`.
    pub fn from_density(rho: &ComplexMatrix) -> Self {
        Self::new(
            2.0 * rho[(0, 1)].re,
            2.0 * rho[(1, 0)].im,
            rho[(0, 0)].re - rho[(1, 1)].re,
        )
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// `(θ, φ)`: polar angle from +z and azimuth from +x.
    pub fn angles(&self) -> (f64, f64) {
        let r = self.length();
        if r < 1e-12 {
            return (0.0, 0.0);
        }
        let theta = (self.z / r).clamp(-1.0, 1.0).acos();
        let phi = self.y.atan2(self.x);
        (theta, phi)
    }

    pub fn is_pure(&self, tol: f64) -> bool {
        (self.length() - 1.0).abs() <= tol
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReducedState {
    pub qubit: usize,
    pub density: ComplexMatrix,
    pub bloch: BlochVector,
    /// tr(ρ²): 1 for a pure qubit, 0.5 when maximally mixed.
    pub purity: f64,
    /// Sum of off-diagonal magnitudes, clamped to [0, 1].
    pub coherence: f64,
    /// Von Neumann entropy in bits. Equals the entanglement entropy with the rest of
    /// the register when the whole register is pure.
    pub entropy: f64,
}

impl ReducedState {
    pub fn from_density(qubit: usize, density: ComplexMatrix) -> Self {
        Self {
            qubit,
            bloch: BlochVector::from_density(&density),
            purity: purity(&density),
            coherence: coherence(&density),
            entropy: von_neumann_entropy(&density),
            density,
        }
    }

    pub fn estimated_bytes(&self) -> usize {
        self.density.estimated_bytes() + std::mem::size_of::<Self>()
    }
}

/// Insert bit `bit` at position `shift` of `rest`, shifting higher bits up.
#[inline]
fn embed(bit: usize, rest: usize, shift: usize) -> usize {
    let low = rest & ((1usize << shift) - 1);
    let high = (rest >> shift) << (shift + 1);
    high | (bit << shift) | low
}

/// Reduced 2×2 density matrix of `keep`, tracing out every other qubit.
pub fn partial_trace(state: &ComplexMatrix, keep: usize, num_qubits: usize) -> SimResult<ComplexMatrix> {
    if num_qubits == 0 || keep >= num_qubits {
        return Err(SimError::invalid_qubits("partial_trace", &[keep], num_qubits, "qubit out of range"));
    }
    let dim = register_dim(num_qubits)?;
    if state.nrows() != dim || state.ncols() != dim {
        return Err(SimError::DimensionMismatch { expected: dim, actual: state.nrows() });
    }
    let shift = num_qubits - 1 - keep;
    let others = 1usize << (num_qubits - 1);
    let mut out = ComplexMatrix::zeros(2, 2);
    for i in 0..2 {
        for j in 0..2 {
            let mut acc = c(0.0, 0.0);
            for rest in 0..others {
                acc += state[(embed(i, rest, shift), embed(j, rest, shift))];
            }
            out[(i, j)] = acc;
        }
    }
    Ok(out)
}

pub fn reduced_state(state: &ComplexMatrix, qubit: usize, num_qubits: usize) -> SimResult<ReducedState> {
    let rho = partial_trace(state, qubit, num_qubits)?;
    Ok(ReducedState::from_density(qubit, rho))
}

pub fn reduced_states(state: &ComplexMatrix, num_qubits: usize) -> SimResult<Vec<ReducedState>> {
    (0..num_qubits).map(|q| reduced_state(state, q, num_qubits)).collect()
}

/// tr(ρ²), computed as Σ|ρij|² (valid for Hermitian ρ).
pub fn purity(rho: &ComplexMatrix) -> f64 {
    rho.as_dmatrix().iter().map(|z| z.norm_sqr()).sum()
}

pub fn coherence(rho: &ComplexMatrix) -> f64 {
    let mut total = 0.0;
    for i in 0..rho.nrows() {
        for j in 0..rho.ncols() {
            if i != j {
                total += rho[(i, j)].norm();
            }
        }
    }
    total.clamp(0.0, 1.0)
}

/// −Σ λ log2 λ over the eigenvalues of ρ.
pub fn von_neumann_entropy(rho: &ComplexMatrix) -> f64 {
    let eigenvalues = if rho.nrows() == 2 && rho.ncols() == 2 {
        let (lo, hi) = eigenvalues_2x2(rho);
        vec![lo, hi]
    } else {
        hermitian_eigenvalues(rho)
    };
    let s: f64 = eigenvalues
        .into_iter()
        .filter(|&l| l > ENTROPY_CUTOFF)
        .map(|l| -l * l.log2())
        .sum();
    s.max(0.0)
}

/// Wootters concurrence of a two-qubit density matrix.
///
/// C = max(0, λ1 − λ2 − λ3 − λ4), λ the descending square roots of the eigenvalues of
/// √ρ ρ̃ √ρ with ρ̃ = (Y⊗Y) ρ* (Y⊗Y).
pub fn concurrence(rho: &ComplexMatrix) -> SimResult<f64> {
    if rho.nrows() != 4 || rho.ncols() != 4 {
        return Err(SimError::DimensionMismatch { expected: 4, actual: rho.nrows() });
    }
    let yy = gates::y().kron(&gates::y());
    let flipped = yy.mul(&rho.conj())?.mul(&yy)?;

    let (values, vectors) = hermitian_eigen(rho);
    let v = ComplexMatrix::from_dmatrix(vectors);
    let mut sqrt_diag = ComplexMatrix::zeros(4, 4);
    for (k, l) in values.iter().enumerate() {
        sqrt_diag[(k, k)] = c(l.max(0.0).sqrt(), 0.0);
    }
    let sqrt_rho = v.mul(&sqrt_diag)?.mul(&v.dagger())?;
    let m = sqrt_rho.mul(&flipped)?.mul(&sqrt_rho)?;

    let mut lambdas: Vec<f64> = hermitian_eigenvalues(&m)
        .into_iter()
        .map(|mu| mu.max(0.0).sqrt())
        .collect();
    lambdas.sort_by(|a, b| b.total_cmp(a));
    let value = lambdas[0] - lambdas[1] - lambdas[2] - lambdas[3];
    Ok(value.clamp(0.0, 1.0))
}
