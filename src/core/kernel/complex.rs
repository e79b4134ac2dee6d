//! Complex scalars and dense complex matrices.
//!
//! Scalars are `num_complex::Complex64`; [`ComplexExt`] adds the checked and
//! tolerance-aware operations the kernel needs on top. [`ComplexMatrix`] wraps a
//! `nalgebra::DMatrix<C64>` and is used both for gate operators and for density
//! matrices. Matrix equality is always tolerance-based.
use std::fmt;
use std::ops::{Index, IndexMut};

use nalgebra::DMatrix;
use num_complex::Complex64 as C64;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::core::error::{SimError, SimResult};

/// Entries (and entry components) below this are flushed to exact zero.
pub const EPS: f64 = 1e-12;
/// Default tolerance for matrix comparisons and unitarity checks.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

#[inline]
pub fn c(r: f64, i: f64) -> C64 {
    C64::new(r, i)
}

/// e^{iθ}
#[inline]
pub fn cis(theta: f64) -> C64 {
    C64::from_polar(1.0, theta)
}

pub trait ComplexExt: Copy {
    fn magnitude(self) -> f64;
    fn phase(self) -> f64;
    /// Division that refuses (near-)zero divisors instead of producing infinities.
    fn checked_div(self, rhs: C64) -> SimResult<C64>;
    fn is_negligible(self, tol: f64) -> bool;
    /// Flush components smaller than `eps` to zero.
    fn chop(self, eps: f64) -> C64;
    fn approx_eq(self, other: C64, tol: f64) -> bool;
}

impl ComplexExt for C64 {
    #[inline]
    fn magnitude(self) -> f64 {
        self.norm()
    }

    #[inline]
    fn phase(self) -> f64 {
        self.arg()
    }

    fn checked_div(self, rhs: C64) -> SimResult<C64> {
        let denominator = rhs.norm_sqr();
        if denominator.sqrt() < EPS {
            return Err(SimError::DivisionByZero);
        }
        Ok(C64::new(
            (self.re * rhs.re + self.im * rhs.im) / denominator,
            (self.im * rhs.re - self.re * rhs.im) / denominator,
        ))
    }

    #[inline]
    fn is_negligible(self, tol: f64) -> bool {
        self.norm() < tol
    }

    #[inline]
    fn chop(self, eps: f64) -> C64 {
        let re = if self.re.abs() < eps { 0.0 } else { self.re };
        let im = if self.im.abs() < eps { 0.0 } else { self.im };
        C64::new(re, im)
    }

    #[inline]
    fn approx_eq(self, other: C64, tol: f64) -> bool {
        (self - other).norm() <= tol
    }
}

/// Dense complex matrix addressed by `(row, col)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ComplexMatrix {
    m: DMatrix<C64>,
}

impl ComplexMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { m: DMatrix::from_element(rows, cols, c(0.0, 0.0)) }
    }

    pub fn identity(n: usize) -> Self {
        Self { m: DMatrix::identity(n, n) }
    }

    /// Row-major construction; `data.len()` must equal `rows * cols`.
    pub fn from_row_slice(rows: usize, cols: usize, data: &[C64]) -> Self {
        Self { m: DMatrix::from_row_slice(rows, cols, data) }
    }

    pub fn from_rows(rows: Vec<Vec<C64>>) -> SimResult<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(nrows * ncols);
        for row in rows {
            if row.len() != ncols {
                return Err(SimError::DimensionMismatch { expected: ncols, actual: row.len() });
            }
            data.extend(row);
        }
        Ok(Self::from_row_slice(nrows, ncols, &data))
    }

    /// Real-valued rows, for convenience when writing constant gates and tests.
    pub fn from_real(rows: usize, cols: usize, data: &[f64]) -> Self {
        let cdata: Vec<C64> = data.iter().map(|&r| c(r, 0.0)).collect();
        Self::from_row_slice(rows, cols, &cdata)
    }

    /// |ψ⟩⟨ψ|
    pub fn outer(psi: &[C64]) -> Self {
        let n = psi.len();
        let mut out = Self::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                out.m[(i, j)] = psi[i] * psi[j].conj();
            }
        }
        out
    }

    pub fn from_dmatrix(m: DMatrix<C64>) -> Self {
        Self { m }
    }

    pub fn as_dmatrix(&self) -> &DMatrix<C64> {
        &self.m
    }

    pub fn into_dmatrix(self) -> DMatrix<C64> {
        self.m
    }

    pub fn nrows(&self) -> usize {
        self.m.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.m.ncols()
    }

    pub fn is_square(&self) -> bool {
        self.m.nrows() == self.m.ncols()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> C64 {
        self.m[(row, col)]
    }

    pub fn mul(&self, other: &ComplexMatrix) -> SimResult<ComplexMatrix> {
        if self.ncols() != other.nrows() {
            return Err(SimError::DimensionMismatch { expected: self.ncols(), actual: other.nrows() });
        }
        Ok(Self { m: &self.m * &other.m })
    }

    /// Kronecker product A ⊗ B: `R[i][j] = A[i/p][j/q] · B[i%p][j%q]`.
    pub fn kron(&self, other: &ComplexMatrix) -> ComplexMatrix {
        let (ar, ac) = (self.nrows(), self.ncols());
        let (br, bc) = (other.nrows(), other.ncols());
        let mut out = Self::zeros(ar * br, ac * bc);
        for i in 0..ar {
            for j in 0..ac {
                let aij = self.m[(i, j)];
                if aij == c(0.0, 0.0) {
                    continue;
                }
                for k in 0..br {
                    for l in 0..bc {
                        out.m[(i * br + k, j * bc + l)] = aij * other.m[(k, l)];
                    }
                }
            }
        }
        out
    }

    /// Conjugate transpose.
    pub fn dagger(&self) -> ComplexMatrix {
        Self { m: self.m.adjoint() }
    }

    pub fn conj(&self) -> ComplexMatrix {
        Self { m: self.m.map(|z| z.conj()) }
    }

    pub fn transpose(&self) -> ComplexMatrix {
        Self { m: self.m.transpose() }
    }

    /// Sum of the main diagonal (defined for rectangular input as well).
    pub fn trace(&self) -> C64 {
        let n = self.nrows().min(self.ncols());
        (0..n).map(|i| self.m[(i, i)]).sum()
    }

    pub fn scale(&self, k: C64) -> ComplexMatrix {
        Self { m: self.m.map(|z| z * k) }
    }

    pub fn add(&self, other: &ComplexMatrix) -> SimResult<ComplexMatrix> {
        self.check_same_shape(other)?;
        Ok(Self { m: &self.m + &other.m })
    }

    pub fn sub(&self, other: &ComplexMatrix) -> SimResult<ComplexMatrix> {
        self.check_same_shape(other)?;
        Ok(Self { m: &self.m - &other.m })
    }

    /// U ρ U†
    pub fn conjugate_by(&self, u: &ComplexMatrix) -> SimResult<ComplexMatrix> {
        u.mul(self)?.mul(&u.dagger())
    }

    /// Largest entrywise distance; infinite when shapes differ.
    pub fn max_abs_diff(&self, other: &ComplexMatrix) -> f64 {
        if self.m.shape() != other.m.shape() {
            return f64::INFINITY;
        }
        self.m
            .iter()
            .zip(other.m.iter())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0_f64, |m, d| if d.is_nan() { f64::INFINITY } else { m.max(d) })
    }

    pub fn approx_eq(&self, other: &ComplexMatrix, tol: f64) -> bool {
        self.max_abs_diff(other) <= tol
    }

    /// Flush tiny components to zero in place (denormal / NaN-drift guard).
    pub fn chop(&mut self, eps: f64) {
        for z in self.m.iter_mut() {
            *z = z.chop(eps);
        }
    }

    pub fn diagonal_re(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        (0..n).map(|i| self.m[(i, i)].re).collect()
    }

    pub fn is_real(&self, tol: f64) -> bool {
        self.m.iter().all(|z| z.im.abs() <= tol)
    }

    pub fn is_diagonal(&self, tol: f64) -> bool {
        (0..self.nrows())
            .all(|i| (0..self.ncols()).all(|j| i == j || self.m[(i, j)].norm() <= tol))
    }

    pub fn rows(&self) -> Vec<Vec<C64>> {
        (0..self.nrows())
            .map(|i| (0..self.ncols()).map(|j| self.m[(i, j)]).collect())
            .collect()
    }

    /// Approximate heap footprint, for cache budgeting.
    pub fn estimated_bytes(&self) -> usize {
        self.m.len() * std::mem::size_of::<C64>() + std::mem::size_of::<Self>()
    }

    fn check_same_shape(&self, other: &ComplexMatrix) -> SimResult<()> {
        if self.m.shape() != other.m.shape() {
            return Err(SimError::DimensionMismatch {
                expected: self.nrows() * self.ncols(),
                actual: other.nrows() * other.ncols(),
            });
        }
        Ok(())
    }
}

impl Index<(usize, usize)> for ComplexMatrix {
    type Output = C64;
    fn index(&self, idx: (usize, usize)) -> &C64 {
        &self.m[idx]
    }
}

impl IndexMut<(usize, usize)> for ComplexMatrix {
    fn index_mut(&mut self, idx: (usize, usize)) -> &mut C64 {
        &mut self.m[idx]
    }
}

impl fmt::Display for ComplexMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.nrows() {
            let row: Vec<String> = (0..self.ncols())
                .map(|j| {
                    let z = self.m[(i, j)];
                    format!("{:+.4}{:+.4}i", z.re, z.im)
                })
                .collect();
            writeln!(f, "[{}]", row.join(", "))?;
        }
        Ok(())
    }
}

// Serialized as rows of `[re, im]` pairs.
impl Serialize for ComplexMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.nrows()))?;
        for i in 0..self.nrows() {
            let row: Vec<[f64; 2]> = (0..self.ncols())
                .map(|j| {
                    let z = self.m[(i, j)];
                    [z.re, z.im]
                })
                .collect();
            seq.serialize_element(&row)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ComplexMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows: Vec<Vec<[f64; 2]>> = Vec::deserialize(deserializer)?;
        let rows = rows
            .into_iter()
            .map(|r| r.into_iter().map(|[re, im]| c(re, im)).collect())
            .collect();
        ComplexMatrix::from_rows(rows).map_err(de::Error::custom)
    }
}
