//! Tolerance-aware wrappers used to assert unitarity of gates and validity of
//! density matrices. This is a checking harness, not part of the per-gate path.
use nalgebra::{DMatrix, SymmetricEigen};
use num_complex::Complex64 as C64;
use serde::Serialize;

use crate::core::error::{SimError, SimResult};
use crate::core::kernel::complex::{c, ComplexExt, ComplexMatrix, DEFAULT_TOLERANCE};
use crate::core::kernel::gates::{GateKind, GateRegistry};

/// Angles every parameterized gate is checked at.
pub const CHECK_ANGLES: [f64; 4] = [
    0.0,
    std::f64::consts::FRAC_PI_4,
    std::f64::consts::FRAC_PI_2,
    std::f64::consts::PI,
];

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PreciseComplex {
    pub z: C64,
    pub tol: f64,
}

impl PreciseComplex {
    pub fn new(z: C64, tol: f64) -> Self {
        Self { z, tol }
    }

    pub fn is_zero(&self) -> bool {
        self.z.is_negligible(self.tol)
    }

    pub fn approx_eq(&self, other: C64) -> bool {
        self.z.approx_eq(other, self.tol)
    }

    /// Unit-magnitude version of the number.
    pub fn normalize(&self) -> SimResult<C64> {
        if self.is_zero() {
            return Err(SimError::DivisionByZero);
        }
        self.z.checked_div(c(self.z.norm(), 0.0))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum DensityViolation {
    NotSquare { rows: usize, cols: usize },
    NotHermitian { deviation: f64 },
    TraceNotOne { trace: f64 },
    NegativeEigenvalue { value: f64 },
    ComplexDiagonal { index: usize, imag: f64 },
    NonFinite { row: usize, col: usize },
}

#[derive(Clone, Debug)]
pub struct PreciseMatrix {
    pub matrix: ComplexMatrix,
    pub tol: f64,
}

impl PreciseMatrix {
    pub fn new(matrix: ComplexMatrix, tol: f64) -> Self {
        Self { matrix, tol }
    }

    pub fn with_default_tolerance(matrix: ComplexMatrix) -> Self {
        Self::new(matrix, DEFAULT_TOLERANCE)
    }

    /// max |U U† − I|; infinite for non-square input.
    pub fn unitarity_deviation(&self) -> f64 {
        if !self.matrix.is_square() {
            return f64::INFINITY;
        }
        match self.matrix.mul(&self.matrix.dagger()) {
            Ok(uu) => uu.max_abs_diff(&ComplexMatrix::identity(self.matrix.nrows())),
            Err(_) => f64::INFINITY,
        }
    }

    pub fn is_unitary(&self) -> bool {
        self.unitarity_deviation() <= self.tol
    }

    pub fn hermiticity_deviation(&self) -> f64 {
        self.matrix.max_abs_diff(&self.matrix.dagger())
    }

    pub fn is_hermitian(&self) -> bool {
        self.hermiticity_deviation() <= self.tol
    }

    pub fn has_unit_trace(&self) -> bool {
        self.matrix.trace().approx_eq(c(1.0, 0.0), self.tol)
    }

    /// Rescale to unit trace.
    pub fn normalize(&self) -> SimResult<PreciseMatrix> {
        let tr = self.matrix.trace();
        let k = c(1.0, 0.0).checked_div(tr)?;
        Ok(Self::new(self.matrix.scale(k), self.tol))
    }

    /// Eigenvalues of the Hermitian part, ascending.
    pub fn eigenvalues(&self) -> Vec<f64> {
        if self.matrix.nrows() == 2 && self.matrix.ncols() == 2 {
            let (lo, hi) = eigenvalues_2x2(&self.matrix);
            return vec![lo, hi];
        }
        hermitian_eigenvalues(&self.matrix)
    }

    /// Every density-matrix invariant that fails.
    pub fn density_violations(&self) -> Vec<DensityViolation> {
        let m = &self.matrix;
        if !m.is_square() {
            return vec![DensityViolation::NotSquare { rows: m.nrows(), cols: m.ncols() }];
        }
        // the tolerance checks below all pass on NaN
        let bad: Vec<DensityViolation> = (0..m.nrows())
            .flat_map(|row| (0..m.ncols()).map(move |col| (row, col)))
            .filter(|&(row, col)| !m[(row, col)].is_finite())
            .map(|(row, col)| DensityViolation::NonFinite { row, col })
            .collect();
        if !bad.is_empty() {
            return bad;
        }
        let mut out = Vec::new();
        let herm = self.hermiticity_deviation();
        if herm > self.tol {
            out.push(DensityViolation::NotHermitian { deviation: herm });
        }
        for i in 0..m.nrows() {
            let imag = m[(i, i)].im;
            if imag.abs() > self.tol {
                out.push(DensityViolation::ComplexDiagonal { index: i, imag });
            }
        }
        if !self.has_unit_trace() {
            out.push(DensityViolation::TraceNotOne { trace: m.trace().re });
        }
        if let Some(&value) = self
            .eigenvalues()
            .iter()
            .find(|&&v| v.is_nan() || v < -self.tol)
        {
            out.push(DensityViolation::NegativeEigenvalue { value });
        }
        out
    }

    pub fn is_valid_density(&self) -> bool {
        self.density_violations().is_empty()
    }
}

/// Closed-form eigenvalues `(low, high)` of a 2×2 Hermitian matrix
/// `[[a, b], [b*, d]]`: `(a+d)/2 ± sqrt(((a−d)/2)² + |b|²)`.
pub fn eigenvalues_2x2(m: &ComplexMatrix) -> (f64, f64) {
    let a = m[(0, 0)].re;
    let d = m[(1, 1)].re;
    // average the off-diagonal pair so tiny Hermiticity drift doesn't bias the result
    let b = (m[(0, 1)] + m[(1, 0)].conj()) * 0.5;
    let mean = (a + d) / 2.0;
    let half_gap = (((a - d) / 2.0).powi(2) + b.norm_sqr()).sqrt();
    (mean - half_gap, mean + half_gap)
}

/// Eigen-decomposition of the Hermitian part of `m` (values ascending order not
/// guaranteed by nalgebra, so they are sorted here).
pub fn hermitian_eigen(m: &ComplexMatrix) -> (Vec<f64>, DMatrix<C64>) {
    let a = m.as_dmatrix();
    let herm = (a + a.adjoint()).map(|z| z * 0.5);
    let eig = SymmetricEigen::new(herm);
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]));
    let values = order.iter().map(|&i| eig.eigenvalues[i]).collect();
    let vectors = DMatrix::from_fn(a.nrows(), order.len(), |r, k| eig.eigenvectors[(r, order[k])]);
    (values, vectors)
}

pub fn hermitian_eigenvalues(m: &ComplexMatrix) -> Vec<f64> {
    hermitian_eigen(m).0
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GateCheck {
    pub gate: String,
    pub angle: Option<f64>,
    pub deviation: f64,
    pub unitary: bool,
}

/// Unitarity report for every registered gate; parameterized gates are checked at
/// each of `angles`.
pub fn verify_registry(registry: &GateRegistry, angles: &[f64], tol: f64) -> Vec<GateCheck> {
    let mut out = Vec::new();
    for def in registry.definitions() {
        let angles: Vec<Option<f64>> = match def.kind {
            GateKind::Constant(_) => vec![None],
            GateKind::Parameterized(_) => angles.iter().copied().map(Some).collect(),
        };
        for angle in angles {
            let m = def.matrix(angle);
            let shape_ok = m.nrows() == def.dim() && m.ncols() == def.dim();
            let deviation = if shape_ok {
                PreciseMatrix::new(m, tol).unitarity_deviation()
            } else {
                f64::INFINITY
            };
            out.push(GateCheck {
                gate: def.name.to_string(),
                angle,
                deviation,
                unitary: deviation <= tol,
            });
        }
    }
    out
}

/// Error form of [`PreciseMatrix::is_unitary`], for callers registering custom gates.
pub fn ensure_unitary(m: &ComplexMatrix, tol: f64) -> SimResult<()> {
    let deviation = PreciseMatrix::new(m.clone(), tol).unitarity_deviation();
    if deviation > tol {
        return Err(SimError::NotUnitary { deviation });
    }
    Ok(())
}
