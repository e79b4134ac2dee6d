//! Circuit execution: embeds k-qubit gates into the 2^n space and evolves ρ → UρU†.
//!
//! Every gate, single-qubit ones included, goes through the same index-remapping
//! embedding with qubit 0 as the most significant bit of a basis index. Gate-level
//! failures (unknown name, bad angle, bad targets) skip the gate and leave the state
//! untouched; circuit-level failures come back in `SimulationResult::error`.
use std::sync::Arc;

use num_complex::Complex64 as C64;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::cache_key;
use crate::core::error::{ErrorKind, SimError, SimResult};
use crate::core::kernel::circuit::{register_dim, Circuit, GateInstance, InitialState, SimulationOptions, MAX_QUBITS};
use crate::core::kernel::complex::{c, ComplexExt, ComplexMatrix, DEFAULT_TOLERANCE, EPS};
use crate::core::kernel::gates::{angle_param, GateRegistry};
use crate::core::kernel::precision::PreciseMatrix;
use crate::core::kernel::reduced::{self, ReducedState};
use crate::core::sim_cache::CacheService;

/// Gate amplitudes below this are not written into the embedded operator.
pub const GATE_EPS: f64 = 1e-10;

/// Tolerance for accepting a caller-supplied density matrix.
const INITIAL_STATE_TOL: f64 = 1e-8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimWarning {
    pub gate_index: usize,
    pub gate: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl SimWarning {
    pub fn new(gate_index: usize, gate: &GateInstance, err: &SimError) -> Self {
        Self {
            gate_index,
            gate: gate.name.clone(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub num_qubits: usize,
    /// Amplitudes of the final state when it is pure, global phase fixed so the
    /// largest component is real and positive.
    #[serde(with = "amplitudes")]
    pub statevector: Option<Vec<C64>>,
    pub probabilities: Vec<f64>,
    pub density_matrix: ComplexMatrix,
    pub reduced_states: Vec<ReducedState>,
    /// Wootters concurrence, only defined for two-qubit registers.
    pub concurrence: Option<f64>,
    pub warnings: Vec<SimWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SimulationResult {
    /// Empty result carrying a circuit-level error.
    pub fn failed(num_qubits: usize, err: &SimError) -> Self {
        Self {
            num_qubits,
            statevector: None,
            probabilities: Vec::new(),
            density_matrix: ComplexMatrix::zeros(0, 0),
            reduced_states: Vec::new(),
            concurrence: None,
            warnings: Vec::new(),
            error: Some(err.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn estimated_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.density_matrix.estimated_bytes()
            + self.probabilities.len() * std::mem::size_of::<f64>()
            + self.statevector.as_ref().map_or(0, |v| v.len() * std::mem::size_of::<C64>())
            + self.reduced_states.iter().map(ReducedState::estimated_bytes).sum::<usize>()
            + self.warnings.iter().map(|w| w.message.len() + w.gate.len()).sum::<usize>()
    }
}

mod amplitudes {
    use num_complex::Complex64 as C64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<C64>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(amps) => s.collect_seq(amps.iter().map(|z| [z.re, z.im])),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<C64>>, D::Error> {
        let raw: Option<Vec<[f64; 2]>> = Option::deserialize(d)?;
        Ok(raw.map(|v| v.into_iter().map(|[re, im]| C64::new(re, im)).collect()))
    }
}

/// A k-qubit gate lifted into the full register, kept as its non-zero entries
/// `(row, col, amplitude)`.
#[derive(Clone, Debug)]
pub struct EmbeddedOperator {
    pub dim: usize,
    pub entries: Vec<(usize, usize, C64)>,
}

impl EmbeddedOperator {
    pub fn to_dense(&self) -> ComplexMatrix {
        let mut u = ComplexMatrix::zeros(self.dim, self.dim);
        for &(r, col, amp) in &self.entries {
            u[(r, col)] = amp;
        }
        u
    }

    /// U ρ U†, touching only the non-zero entries of U.
    pub fn conjugate(&self, rho: &ComplexMatrix) -> SimResult<ComplexMatrix> {
        let d = self.dim;
        if rho.nrows() != d || rho.ncols() != d {
            return Err(SimError::DimensionMismatch { expected: d, actual: rho.nrows() });
        }
        // T = U ρ
        let mut t = ComplexMatrix::zeros(d, d);
        for &(a, k, amp) in &self.entries {
            for j in 0..d {
                t[(a, j)] += amp * rho[(k, j)];
            }
        }
        // ρ' = T U†, (U†)[k][b] = conj(U[b][k])
        let mut out = ComplexMatrix::zeros(d, d);
        for &(b, k, amp) in &self.entries {
            let ac = amp.conj();
            for i in 0..d {
                out[(i, b)] += t[(i, k)] * ac;
            }
        }
        Ok(out)
    }
}

/// Lift `gate` (2^k × 2^k) onto `targets` of an `num_qubits` register.
///
/// For each basis index `r`, the target bits of `r` form the gate's input index; every
/// non-negligible `gate[out][in]` lands at `U[row][r]` where `row` is `r` with its target
/// bits overwritten by `out`. The first target is the gate's most significant bit.
pub fn embed_operator(gate: &ComplexMatrix, targets: &[usize], num_qubits: usize) -> SimResult<EmbeddedOperator> {
    let dim = register_dim(num_qubits)?;
    for (i, &q) in targets.iter().enumerate() {
        if q >= num_qubits || targets[..i].contains(&q) {
            return Err(SimError::invalid_qubits("embed", targets, num_qubits, "bad target list"));
        }
    }
    // distinct in-range targets, so k <= num_qubits
    let k = targets.len();
    let gdim = 1usize << k;
    if gate.nrows() != gdim || gate.ncols() != gdim {
        return Err(SimError::DimensionMismatch { expected: gdim, actual: gate.nrows() });
    }

    let shifts: Vec<usize> = targets.iter().map(|&q| num_qubits - 1 - q).collect();
    let mask = shifts.iter().fold(0usize, |m, s| m | (1 << s));

    let mut entries = Vec::with_capacity(dim * gdim);
    for r in 0..dim {
        let mut in_idx = 0usize;
        for (j, s) in shifts.iter().enumerate() {
            if (r >> s) & 1 == 1 {
                in_idx |= 1 << (k - 1 - j);
            }
        }
        let base = r & !mask;
        for out_idx in 0..gdim {
            let amp = gate[(out_idx, in_idx)];
            if amp.is_negligible(GATE_EPS) {
                continue;
            }
            let mut row = base;
            for (j, s) in shifts.iter().enumerate() {
                if (out_idx >> (k - 1 - j)) & 1 == 1 {
                    row |= 1 << s;
                }
            }
            entries.push((row, r, amp));
        }
    }
    Ok(EmbeddedOperator { dim, entries })
}

/// Recover |ψ⟩ from ρ = |ψ⟩⟨ψ| using the column of the largest diagonal entry.
pub fn recover_statevector(rho: &ComplexMatrix, tol: f64) -> Option<Vec<C64>> {
    if rho.nrows() == 0 || (reduced::purity(rho) - 1.0).abs() > tol {
        return None;
    }
    let diag = rho.diagonal_re();
    let (k, &pk) = diag.iter().enumerate().max_by(|a, b| a.1.total_cmp(b.1))?;
    let norm = c(pk.max(0.0).sqrt(), 0.0);
    (0..rho.nrows())
        .map(|i| rho[(i, k)].checked_div(norm).ok().map(|z| z.chop(EPS)))
        .collect()
}

#[derive(Clone, Debug)]
pub struct Engine<'r> {
    registry: &'r GateRegistry,
    tolerance: f64,
    max_qubits: usize,
}

impl<'r> Engine<'r> {
    pub fn new(registry: &'r GateRegistry) -> Self {
        Self { registry, tolerance: DEFAULT_TOLERANCE, max_qubits: MAX_QUBITS }
    }

    /// Registers wider than this are rejected as malformed; capped at [`MAX_QUBITS`].
    pub fn with_max_qubits(mut self, max_qubits: usize) -> Self {
        self.max_qubits = max_qubits.min(MAX_QUBITS);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn registry(&self) -> &GateRegistry {
        self.registry
    }

    /// Apply one gate, reporting every failure.
    pub fn try_apply(&self, state: &ComplexMatrix, gate: &GateInstance, num_qubits: usize) -> SimResult<ComplexMatrix> {
        self.step(state, gate, num_qubits, None)
    }

    /// Best-effort apply: a gate that cannot be applied is logged and skipped, and the
    /// input state comes back unchanged.
    pub fn apply(&self, state: &ComplexMatrix, gate: &GateInstance, num_qubits: usize) -> ComplexMatrix {
        match self.try_apply(state, gate, num_qubits) {
            Ok(next) => next,
            Err(err) => {
                warn!(gate = %gate.name, qubits = ?gate.qubits, error = %err, "skipping gate");
                state.clone()
            }
        }
    }

    /// Evolve `state` by an explicit gate matrix on `targets`.
    pub fn evolve(&self, state: &ComplexMatrix, gate: &ComplexMatrix, targets: &[usize], num_qubits: usize) -> SimResult<ComplexMatrix> {
        let dim = register_dim(num_qubits)?;
        if state.nrows() != dim || state.ncols() != dim {
            return Err(SimError::DimensionMismatch { expected: dim, actual: state.nrows() });
        }
        let op = embed_operator(gate, targets, num_qubits)?;
        let mut next = op.conjugate(state)?;
        next.chop(EPS);
        Ok(next)
    }

    fn step(
        &self,
        state: &ComplexMatrix,
        gate: &GateInstance,
        num_qubits: usize,
        caches: Option<&mut CacheService>,
    ) -> SimResult<ComplexMatrix> {
        let def = self
            .registry
            .lookup(&gate.name)
            .ok_or_else(|| SimError::UnknownGate(gate.name.clone()))?;
        gate.check_targets(def.arity, num_qubits)?;
        let angle = angle_param(def, &gate.parameters)?;

        let matrix = match caches {
            Some(caches) => {
                let key = cache_key::gate_matrix_key(def.name, angle);
                match caches.gates.get(&key) {
                    Some(m) => m,
                    None => {
                        let m = def.matrix(angle);
                        caches.gates.set(key, m.clone(), None);
                        m
                    }
                }
            }
            None => def.matrix(angle),
        };
        #[cfg(feature = "trace-gates")]
        tracing::trace!(gate = def.name, qubits = ?gate.qubits, ?angle, "apply");
        self.evolve(state, &matrix, &gate.qubits, num_qubits)
    }

    pub fn simulate(&self, circuit: &Circuit, initial: Option<&InitialState>) -> SimulationResult {
        self.run(circuit, initial, &SimulationOptions::default(), None)
    }

    pub fn simulate_with(&self, circuit: &Circuit, initial: Option<&InitialState>, options: &SimulationOptions) -> SimulationResult {
        self.run(circuit, initial, options, None)
    }

    /// Simulate through the memo stores: whole results first, then gate matrices and
    /// reduced-state data on a miss.
    pub fn simulate_cached(
        &self,
        circuit: &Circuit,
        initial: Option<&InitialState>,
        options: &SimulationOptions,
        caches: &mut CacheService,
    ) -> Arc<SimulationResult> {
        if !options.use_cache {
            return Arc::new(self.run(circuit, initial, options, None));
        }
        let init = initial.cloned().unwrap_or_default();
        let key = cache_key::simulation_key(circuit, &init, options);
        if let Some(hit) = caches.results.get(&key) {
            debug!(key = %key, "result cache hit");
            return hit;
        }
        debug!(key = %key, "result cache miss");
        let result = Arc::new(self.run(circuit, Some(&init), options, Some(&mut *caches)));
        if result.is_ok() {
            caches.results.set(key, Arc::clone(&result), options.ttl);
        }
        result
    }

    fn run(
        &self,
        circuit: &Circuit,
        initial: Option<&InitialState>,
        options: &SimulationOptions,
        mut caches: Option<&mut CacheService>,
    ) -> SimulationResult {
        let checked = circuit.validate().and_then(|_| {
            if circuit.num_qubits > self.max_qubits {
                return Err(SimError::MalformedCircuit(format!(
                    "{} qubits exceeds the configured limit of {}",
                    circuit.num_qubits, self.max_qubits
                )));
            }
            Ok(())
        });
        if let Err(err) = checked {
            warn!(error = %err, "rejecting circuit");
            return SimulationResult::failed(circuit.num_qubits, &err);
        }
        let n = circuit.num_qubits;
        let initial = initial.cloned().unwrap_or_default();
        let mut rho = match self.initial_density(&initial, n) {
            Ok(rho) => rho,
            Err(err) => {
                warn!(error = %err, "rejecting initial state");
                return SimulationResult::failed(n, &err);
            }
        };

        let mut warnings = Vec::new();
        for (i, gate) in circuit.gates.iter().enumerate() {
            match self.step(&rho, gate, n, caches.as_deref_mut()) {
                Ok(next) => rho = next,
                Err(err) => {
                    warn!(index = i, gate = %gate.name, qubits = ?gate.qubits, error = %err, "skipping gate");
                    warnings.push(SimWarning::new(i, gate, &err));
                }
            }
        }

        let reduced_states = if options.reduced_states {
            self.reduced_states(&rho, n, caches.as_deref_mut())
        } else {
            Vec::new()
        };
        let concurrence = if n == 2 { reduced::concurrence(&rho).ok() } else { None };

        SimulationResult {
            num_qubits: n,
            statevector: recover_statevector(&rho, self.tolerance),
            probabilities: rho.diagonal_re(),
            density_matrix: rho,
            reduced_states,
            concurrence,
            warnings,
            error: None,
        }
    }

    fn initial_density(&self, initial: &InitialState, n: usize) -> SimResult<ComplexMatrix> {
        let rho = initial.density(n)?;
        if let InitialState::Density(_) = initial {
            let violations = PreciseMatrix::new(rho.clone(), INITIAL_STATE_TOL).density_violations();
            if !violations.is_empty() {
                return Err(SimError::InvalidInitialState(format!("{violations:?}")));
            }
        }
        Ok(rho)
    }

    fn reduced_states(&self, rho: &ComplexMatrix, n: usize, caches: Option<&mut CacheService>) -> Vec<ReducedState> {
        let compute = || match reduced::reduced_states(rho, n) {
            Ok(states) => states,
            Err(err) => {
                warn!(error = %err, "reduced-state analysis failed");
                Vec::new()
            }
        };
        let Some(caches) = caches else {
            return compute();
        };
        let key = format!("{}|n={n}", cache_key::state_fingerprint(rho));
        if let Some(hit) = caches.visuals.get(&key) {
            debug!(key = %key, "visual cache hit");
            return hit.as_ref().clone();
        }
        let states = compute();
        caches.visuals.set(key, Arc::new(states.clone()), None);
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::gates;

    fn engine() -> Engine<'static> {
        Engine::new(GateRegistry::shared())
    }

    /// Oracle: I ⊗ … ⊗ U ⊗ … ⊗ I with qubit 0 leftmost.
    fn kron_lift(u: &ComplexMatrix, n: usize, target: usize) -> ComplexMatrix {
        let mut acc = ComplexMatrix::identity(1);
        for q in 0..n {
            let m = if q == target { u.clone() } else { gates::i2() };
            acc = acc.kron(&m);
        }
        acc
    }

    #[test]
    fn single_qubit_embedding_matches_kron_lift() {
        for n in 1..=3 {
            for target in 0..n {
                let embedded = embed_operator(&gates::ry(0.7), &[target], n).unwrap().to_dense();
                assert!(embedded.approx_eq(&kron_lift(&gates::ry(0.7), n, target), 1e-12));
            }
        }
    }

    #[test]
    fn cnot_embedding_on_reversed_targets() {
        // control = qubit 1 (LSB), target = qubit 0 (MSB): |01> -> |11>
        let u = embed_operator(&gates::controlled(&gates::x()), &[1, 0], 2).unwrap().to_dense();
        assert_eq!(u[(3, 1)], c(1.0, 0.0));
        assert_eq!(u[(1, 3)], c(1.0, 0.0));
        assert_eq!(u[(2, 2)], c(1.0, 0.0));
    }

    #[test]
    fn sparse_conjugation_matches_dense() {
        let rho = InitialState::Amplitudes(vec![[0.6, 0.0], [0.0, 0.8], [0.0, 0.0], [0.0, 0.0]])
            .density(2)
            .unwrap();
        let op = embed_operator(&gates::iswap(), &[0, 1], 2).unwrap();
        let dense = rho.conjugate_by(&op.to_dense()).unwrap();
        assert!(op.conjugate(&rho).unwrap().approx_eq(&dense, 1e-12));
    }

    #[test]
    fn apply_skips_unknown_and_bad_targets() {
        let rho = InitialState::Basis(1).density(2).unwrap();
        let e = engine();
        assert_eq!(e.apply(&rho, &GateInstance::new("NOPE", vec![0]), 2), rho);
        assert_eq!(e.apply(&rho, &GateInstance::new("H", vec![5]), 2), rho);
        assert_eq!(e.apply(&rho, &GateInstance::new("CNOT", vec![1, 1]), 2), rho);
        assert!(matches!(
            e.try_apply(&rho, &GateInstance::new("NOPE", vec![0]), 2),
            Err(SimError::UnknownGate(_))
        ));
    }

    #[test]
    fn apply_rejects_register_size_mismatch() {
        let rho = InitialState::Zero.density(1).unwrap();
        let e = engine();
        assert_eq!(e.apply(&rho, &GateInstance::new("H", vec![63]), 64), rho);
        assert_eq!(e.apply(&rho, &GateInstance::new("H", vec![0]), 2), rho);
        assert!(matches!(
            e.try_apply(&rho, &GateInstance::new("H", vec![0]), 2),
            Err(SimError::DimensionMismatch { expected: 4, actual: 2 })
        ));
        assert!(matches!(
            e.try_apply(&rho, &GateInstance::new("H", vec![40]), 41),
            Err(SimError::MalformedCircuit(_))
        ));
        assert!(embed_operator(&gates::h(), &[0], 64).is_err());
        assert!(embed_operator(&gates::h(), &[0], 0).is_err());
    }

    #[test]
    fn zero_qubits_report_error() {
        let res = engine().simulate(&Circuit::new(0).gate("H", &[0]), None);
        assert!(res.error.is_some());
        assert!(res.probabilities.is_empty());
        assert!(res.reduced_states.is_empty());
    }

    #[test]
    fn warnings_are_structured() {
        let circ = Circuit::new(1).gate("H", &[0]).gate("FOO", &[0]).rotation("RZ", &[3], 1.0);
        let res = engine().simulate(&circ, None);
        assert!(res.is_ok());
        assert_eq!(res.warnings.len(), 2);
        assert_eq!(res.warnings[0].gate_index, 1);
        assert_eq!(res.warnings[0].kind, ErrorKind::UnknownGate);
        assert_eq!(res.warnings[1].kind, ErrorKind::InvalidQubitIndex);
        assert!((res.probabilities[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn statevector_is_recovered_for_pure_states() {
        let res = engine().simulate(&Circuit::bell(), None);
        let psi = res.statevector.expect("pure");
        let s = std::f64::consts::FRAC_1_SQRT_2;
        assert!(psi[0].approx_eq(c(s, 0.0), 1e-9));
        assert!(psi[3].approx_eq(c(s, 0.0), 1e-9));
        let mixed = engine().simulate(&Circuit::new(1), Some(&InitialState::MaximallyMixed));
        assert!(mixed.statevector.is_none());
    }

    #[test]
    fn configured_qubit_limit_is_enforced() {
        let e = engine().with_max_qubits(2);
        let res = e.simulate(&Circuit::ghz(3), None);
        assert!(res.error.unwrap().contains("configured limit"));
        assert!(e.simulate(&Circuit::bell(), None).is_ok());
    }

    #[test]
    fn invalid_density_initial_state_is_an_error() {
        let bad = ComplexMatrix::from_real(2, 2, &[2.0, 0.0, 0.0, 0.0]);
        let res = engine().simulate(&Circuit::new(1), Some(&InitialState::Density(bad)));
        assert!(res.error.unwrap().contains("invalid initial state"));
    }

    #[test]
    fn nan_density_initial_state_is_rejected() {
        let rho = ComplexMatrix::from_real(2, 2, &[0.5, f64::NAN, f64::NAN, 0.5]);
        let res = engine().simulate(&Circuit::new(1).gate("H", &[0]), Some(&InitialState::Density(rho)));
        let err = res.error.expect("NaN state must fail validation");
        assert!(err.contains("invalid initial state"));
        assert!(err.contains("NonFinite"));
        assert!(res.probabilities.is_empty());
        assert!(res.reduced_states.is_empty());
    }

    #[test]
    fn cached_simulation_reuses_results() {
        let mut caches = CacheService::default();
        let e = engine();
        let opts = SimulationOptions::default();
        let a = e.simulate_cached(&Circuit::bell(), None, &opts, &mut caches);
        let b = e.simulate_cached(&Circuit::bell(), Some(&InitialState::Zero), &opts, &mut caches);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(caches.results.stats().hits, 1);
        assert!(caches.gates.len() >= 2);
        assert_eq!(caches.visuals.len(), 1);
    }
}
