//! Gate registry: named unitaries, constant or functions of one angle.
//!
//! Multi-qubit matrices use the register-wide convention: the first listed target is
//! the most significant bit of the gate's local index, so for `CNOT` the first target is
//! the control.
use std::collections::BTreeMap;
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4};

use nalgebra::DMatrix;
use num_complex::Complex64 as C64;
use once_cell::sync::Lazy;

use crate::core::error::{SimError, SimResult};
use crate::core::kernel::complex::{c, cis, ComplexMatrix, DEFAULT_TOLERANCE};

/// Angle used when a parameterized gate is given no angle at all.
pub const DEFAULT_ANGLE: f64 = FRAC_PI_2;

/// Parameter names accepted as "the angle", in lookup order.
pub const ANGLE_KEYS: [&str; 4] = ["theta", "angle", "phi", "lambda"];

pub type AngleFn = fn(f64) -> ComplexMatrix;

#[derive(Clone, Debug)]
pub enum GateKind {
    Constant(ComplexMatrix),
    Parameterized(AngleFn),
}

#[derive(Clone, Debug)]
pub struct GateDef {
    pub name: &'static str,
    pub arity: usize,
    pub kind: GateKind,
}

impl GateDef {
    pub fn constant(name: &'static str, arity: usize, m: ComplexMatrix) -> Self {
        Self { name, arity, kind: GateKind::Constant(m) }
    }

    pub fn parameterized(name: &'static str, arity: usize, f: AngleFn) -> Self {
        Self { name, arity, kind: GateKind::Parameterized(f) }
    }

    pub fn is_parameterized(&self) -> bool {
        matches!(self.kind, GateKind::Parameterized(_))
    }

    /// Matrix for this gate; the angle is ignored by constant gates and defaults to
    /// [`DEFAULT_ANGLE`] for parameterized ones.
    pub fn matrix(&self, angle: Option<f64>) -> ComplexMatrix {
        match &self.kind {
            GateKind::Constant(m) => m.clone(),
            GateKind::Parameterized(f) => f(angle.unwrap_or(DEFAULT_ANGLE)),
        }
    }

    pub fn dim(&self) -> usize {
        1 << self.arity
    }
}

/// Real-valued compatibility view of a gate.
///
/// Exact for gates whose matrix is already real (H, X, Z, RY, CNOT, SWAP, ...).
/// Lossy otherwise:
/// - diagonal gates (S, SDG, T, TDG, RZ, P, CP, CRZ, RZZ and CZ-like phases) become the
///   identity, dropping every relative phase;
/// - any other complex entry becomes its signed magnitude, the sign taken from its
///   dominant component (Y becomes `[[0, -1], [1, 0]]`), dropping the i factors.
///
/// Not physically equivalent to the complex gate; never feed it back into the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct RealApprox {
    pub matrix: DMatrix<f64>,
    pub lossy: bool,
}

#[derive(Clone, Debug)]
pub struct GateRegistry {
    defs: BTreeMap<&'static str, GateDef>,
    aliases: BTreeMap<&'static str, &'static str>,
}

static STANDARD: Lazy<GateRegistry> = Lazy::new(GateRegistry::standard);

impl GateRegistry {
    pub fn empty() -> Self {
        Self { defs: BTreeMap::new(), aliases: BTreeMap::new() }
    }

    /// Process-wide read-only copy of [`GateRegistry::standard`].
    pub fn shared() -> &'static GateRegistry {
        &STANDARD
    }

    pub fn standard() -> Self {
        let mut r = Self::empty();
        // 1-qubit constants
        r.register(GateDef::constant("I", 1, i2()));
        r.register(GateDef::constant("H", 1, h()));
        r.register(GateDef::constant("X", 1, x()));
        r.register(GateDef::constant("Y", 1, y()));
        r.register(GateDef::constant("Z", 1, z()));
        r.register(GateDef::constant("S", 1, s()));
        r.register(GateDef::constant("SDG", 1, s().dagger()));
        r.register(GateDef::constant("T", 1, t()));
        r.register(GateDef::constant("TDG", 1, t().dagger()));
        r.register(GateDef::constant("SX", 1, sx()));
        // 1-qubit rotations
        r.register(GateDef::parameterized("RX", 1, rx));
        r.register(GateDef::parameterized("RY", 1, ry));
        r.register(GateDef::parameterized("RZ", 1, rz));
        r.register(GateDef::parameterized("P", 1, phase));
        // 2-qubit
        r.register(GateDef::constant("CNOT", 2, controlled(&x())));
        r.register(GateDef::constant("CY", 2, controlled(&y())));
        r.register(GateDef::constant("CZ", 2, controlled(&z())));
        r.register(GateDef::constant("SWAP", 2, swap()));
        r.register(GateDef::constant("ISWAP", 2, iswap()));
        r.register(GateDef::parameterized("CP", 2, cphase));
        r.register(GateDef::parameterized("CRX", 2, |t| controlled(&rx(t))));
        r.register(GateDef::parameterized("CRY", 2, |t| controlled(&ry(t))));
        r.register(GateDef::parameterized("CRZ", 2, |t| controlled(&rz(t))));
        r.register(GateDef::parameterized("RXX", 2, rxx));
        r.register(GateDef::parameterized("RYY", 2, ryy));
        r.register(GateDef::parameterized("RZZ", 2, rzz));
        // 3-qubit
        r.register(GateDef::constant("CCX", 3, controlled(&controlled(&x()))));
        r.register(GateDef::constant("CSWAP", 3, controlled(&swap())));

        r.alias("CX", "CNOT");
        r.alias("PHASE", "P");
        r.alias("CPHASE", "CP");
        r.alias("TOFFOLI", "CCX");
        r.alias("FREDKIN", "CSWAP");
        r
    }

    pub fn register(&mut self, def: GateDef) {
        self.defs.insert(def.name, def);
    }

    pub fn alias(&mut self, alias: &'static str, target: &'static str) {
        self.aliases.insert(alias, target);
    }

    /// Case-sensitive lookup, following aliases.
    pub fn lookup(&self, name: &str) -> Option<&GateDef> {
        let canonical = self.aliases.get(name).copied().unwrap_or(name);
        self.defs.get(canonical)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn arity(&self, name: &str) -> SimResult<usize> {
        self.lookup(name)
            .map(|d| d.arity)
            .ok_or_else(|| SimError::UnknownGate(name.to_string()))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &GateDef> {
        self.defs.values()
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.aliases.iter().map(|(a, t)| (*a, *t))
    }

    pub fn resolve(&self, name: &str, params: &BTreeMap<String, f64>) -> SimResult<ComplexMatrix> {
        let def = self.lookup(name).ok_or_else(|| SimError::UnknownGate(name.to_string()))?;
        let angle = angle_param(def, params)?;
        Ok(def.matrix(angle))
    }

    pub fn resolve_angle(&self, name: &str, angle: Option<f64>) -> SimResult<ComplexMatrix> {
        let def = self.lookup(name).ok_or_else(|| SimError::UnknownGate(name.to_string()))?;
        if let Some(a) = angle {
            if !a.is_finite() {
                return Err(SimError::InvalidParameter {
                    gate: name.to_string(),
                    param: ANGLE_KEYS[0].to_string(),
                    value: a,
                });
            }
        }
        Ok(def.matrix(angle))
    }

    pub fn real_view(&self, name: &str, params: &BTreeMap<String, f64>) -> SimResult<RealApprox> {
        let m = self.resolve(name, params)?;
        Ok(real_approx(&m))
    }
}

impl Default for GateRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Extract the angle of a gate instance.
///
/// `Ok(None)` means "use the default". A parameter map that names no known angle key
/// is a missing parameter; a non-finite angle is an invalid one. Constant gates
/// ignore their parameters entirely.
pub fn angle_param(def: &GateDef, params: &BTreeMap<String, f64>) -> SimResult<Option<f64>> {
    if !def.is_parameterized() || params.is_empty() {
        return Ok(None);
    }
    let found = ANGLE_KEYS.iter().find_map(|k| params.get(*k).map(|v| (*k, *v)));
    match found {
        Some((_, v)) if v.is_finite() => Ok(Some(v)),
        Some((k, v)) => Err(SimError::InvalidParameter {
            gate: def.name.to_string(),
            param: k.to_string(),
            value: v,
        }),
        None => Err(SimError::MissingParameter {
            gate: def.name.to_string(),
            param: ANGLE_KEYS[0].to_string(),
        }),
    }
}

pub fn real_approx(m: &ComplexMatrix) -> RealApprox {
    let (rows, cols) = (m.nrows(), m.ncols());
    if m.is_real(DEFAULT_TOLERANCE) {
        return RealApprox { matrix: DMatrix::from_fn(rows, cols, |i, j| m[(i, j)].re), lossy: false };
    }
    if m.is_diagonal(DEFAULT_TOLERANCE) {
        return RealApprox { matrix: DMatrix::identity(rows, cols), lossy: true };
    }
    let matrix = DMatrix::from_fn(rows, cols, |i, j| {
        let z = m[(i, j)];
        let dominant = if z.re.abs() >= z.im.abs() { z.re } else { z.im };
        dominant.signum() * z.norm()
    });
    RealApprox { matrix, lossy: true }
}

/// Block-diagonal `diag(I, U)`: control on the most significant bit.
pub fn controlled(u: &ComplexMatrix) -> ComplexMatrix {
    let d = u.nrows();
    let mut out = ComplexMatrix::identity(2 * d);
    for i in 0..d {
        for j in 0..d {
            out[(d + i, d + j)] = u[(i, j)];
        }
    }
    out
}

fn diag(entries: &[C64]) -> ComplexMatrix {
    let n = entries.len();
    let mut m = ComplexMatrix::zeros(n, n);
    for (i, z) in entries.iter().enumerate() {
        m[(i, i)] = *z;
    }
    m
}

pub fn i2() -> ComplexMatrix {
    ComplexMatrix::identity(2)
}
pub fn x() -> ComplexMatrix {
    ComplexMatrix::from_real(2, 2, &[0.0, 1.0, 1.0, 0.0])
}
pub fn y() -> ComplexMatrix {
    ComplexMatrix::from_row_slice(2, 2, &[c(0.0, 0.0), c(0.0, -1.0), c(0.0, 1.0), c(0.0, 0.0)])
}
pub fn z() -> ComplexMatrix {
    ComplexMatrix::from_real(2, 2, &[1.0, 0.0, 0.0, -1.0])
}
pub fn h() -> ComplexMatrix {
    let s = FRAC_1_SQRT_2;
    ComplexMatrix::from_real(2, 2, &[s, s, s, -s])
}
pub fn s() -> ComplexMatrix {
    diag(&[c(1.0, 0.0), c(0.0, 1.0)])
}
pub fn t() -> ComplexMatrix {
    diag(&[c(1.0, 0.0), cis(FRAC_PI_4)])
}
pub fn sx() -> ComplexMatrix {
    ComplexMatrix::from_row_slice(2, 2, &[c(0.5, 0.5), c(0.5, -0.5), c(0.5, -0.5), c(0.5, 0.5)])
}
pub fn rx(theta: f64) -> ComplexMatrix {
    let (c0, s0) = ((theta / 2.0).cos(), (theta / 2.0).sin());
    ComplexMatrix::from_row_slice(2, 2, &[c(c0, 0.0), c(0.0, -s0), c(0.0, -s0), c(c0, 0.0)])
}
pub fn ry(theta: f64) -> ComplexMatrix {
    let (c0, s0) = ((theta / 2.0).cos(), (theta / 2.0).sin());
    ComplexMatrix::from_real(2, 2, &[c0, -s0, s0, c0])
}
pub fn rz(theta: f64) -> ComplexMatrix {
    diag(&[cis(-theta / 2.0), cis(theta / 2.0)])
}
pub fn phase(theta: f64) -> ComplexMatrix {
    diag(&[c(1.0, 0.0), cis(theta)])
}
pub fn swap() -> ComplexMatrix {
    ComplexMatrix::from_real(
        4,
        4,
        &[
            1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    )
}
pub fn iswap() -> ComplexMatrix {
    let mut m = swap();
    m[(1, 2)] = c(0.0, 1.0);
    m[(2, 1)] = c(0.0, 1.0);
    m
}
pub fn cphase(theta: f64) -> ComplexMatrix {
    diag(&[c(1.0, 0.0), c(1.0, 0.0), c(1.0, 0.0), cis(theta)])
}

/// exp(-iθ/2 · P⊗P) = cos(θ/2)·I − i·sin(θ/2)·P⊗P
fn pauli_pair_rotation(p: &ComplexMatrix, theta: f64) -> ComplexMatrix {
    let pp = p.kron(p);
    let (c0, s0) = ((theta / 2.0).cos(), (theta / 2.0).sin());
    let mut out = ComplexMatrix::identity(4).scale(c(c0, 0.0));
    for i in 0..4 {
        for j in 0..4 {
            out[(i, j)] += pp[(i, j)] * c(0.0, -s0);
        }
    }
    out
}
pub fn rxx(theta: f64) -> ComplexMatrix {
    pauli_pair_rotation(&x(), theta)
}
pub fn ryy(theta: f64) -> ComplexMatrix {
    pauli_pair_rotation(&y(), theta)
}
pub fn rzz(theta: f64) -> ComplexMatrix {
    let (m, p) = (cis(-theta / 2.0), cis(theta / 2.0));
    diag(&[m, p, p, m])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn params(k: &str, v: f64) -> BTreeMap<String, f64> {
        let mut p = BTreeMap::new();
        p.insert(k.to_string(), v);
        p
    }

    #[test]
    fn lookup_is_case_sensitive_and_follows_aliases() {
        let r = GateRegistry::standard();
        assert!(r.contains("CNOT"));
        assert!(!r.contains("cnot"));
        assert_eq!(r.lookup("CX").map(|d| d.name), Some("CNOT"));
        assert_eq!(r.lookup("TOFFOLI").map(|d| d.arity), Some(3));
        assert_eq!(r.arity("nope"), Err(SimError::UnknownGate("nope".into())));
    }

    #[test]
    fn cnot_has_control_first() {
        let m = GateRegistry::shared().resolve("CNOT", &BTreeMap::new()).unwrap();
        // |10> -> |11>
        assert_eq!(m[(3, 2)], c(1.0, 0.0));
        assert_eq!(m[(2, 3)], c(1.0, 0.0));
        assert_eq!(m[(1, 1)], c(1.0, 0.0));
    }

    #[test]
    fn missing_angle_defaults_to_half_pi() {
        let r = GateRegistry::standard();
        let dflt = r.resolve("RX", &BTreeMap::new()).unwrap();
        assert!(dflt.approx_eq(&rx(FRAC_PI_2), 1e-12));
        let explicit = r.resolve("RX", &params("angle", PI)).unwrap();
        assert!(explicit.approx_eq(&x().scale(c(0.0, -1.0)), 1e-12));
    }

    #[test]
    fn bad_parameters_are_reported() {
        let r = GateRegistry::standard();
        assert!(matches!(
            r.resolve("RZ", &params("omega", 1.0)),
            Err(SimError::MissingParameter { .. })
        ));
        assert!(matches!(
            r.resolve("RZ", &params("theta", f64::NAN)),
            Err(SimError::InvalidParameter { .. })
        ));
        // constant gates ignore parameters
        assert!(r.resolve("H", &params("theta", f64::NAN)).is_ok());
    }

    #[test]
    fn toffoli_flips_only_on_both_controls() {
        let m = GateRegistry::shared().resolve("CCX", &BTreeMap::new()).unwrap();
        assert_eq!(m[(7, 6)], c(1.0, 0.0));
        assert_eq!(m[(6, 7)], c(1.0, 0.0));
        assert_eq!(m[(5, 5)], c(1.0, 0.0));
    }

    #[test]
    fn real_view_marks_phase_gates_lossy() {
        let r = GateRegistry::standard();
        let hv = r.real_view("H", &BTreeMap::new()).unwrap();
        assert!(!hv.lossy);
        let sv = r.real_view("S", &BTreeMap::new()).unwrap();
        assert!(sv.lossy);
        assert_eq!(sv.matrix, DMatrix::identity(2, 2));
        let yv = r.real_view("Y", &BTreeMap::new()).unwrap();
        assert!(yv.lossy);
        assert_eq!(yv.matrix, DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 1.0, 0.0]));
    }
}
