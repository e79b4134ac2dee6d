//! Deterministic cache keys.
//!
//! Keys are readable strings built from the logical inputs of a call; parameter and
//! option maps are serialized in sorted order so construction order never matters.
//! Long keys are replaced by their SHA-256 digest.
use sha2::{Digest, Sha256};

use crate::core::kernel::circuit::{fmt_f64, Circuit, GateInstance, InitialState, SimulationOptions};
use crate::core::kernel::complex::ComplexMatrix;

pub const KEY_PREFIX: &str = "sim:v1";
const MAX_PLAIN_KEY: usize = 256;
/// Entries are rounded to this grid before fingerprinting a state.
const FINGERPRINT_GRID: f64 = 1e-10;

pub fn gate_descriptor(g: &GateInstance) -> String {
    let qubits: Vec<String> = g.qubits.iter().map(|q| q.to_string()).collect();
    let mut out = format!("{}[{}]", g.name, qubits.join(","));
    if !g.parameters.is_empty() {
        let params: Vec<String> =
            g.parameters.iter().map(|(k, v)| format!("{k}={}", fmt_f64(*v))).collect();
        out.push('{');
        out.push_str(&params.join(","));
        out.push('}');
    }
    out
}

pub fn circuit_descriptor(circuit: &Circuit) -> String {
    let gates: Vec<String> = circuit.gates.iter().map(gate_descriptor).collect();
    format!("n={}|g={}", circuit.num_qubits, gates.join(";"))
}

pub fn simulation_key(circuit: &Circuit, initial: &InitialState, options: &SimulationOptions) -> String {
    let plain = format!(
        "{KEY_PREFIX}|{}|init={}|opts={}",
        circuit_descriptor(circuit),
        initial.descriptor(),
        options.descriptor()
    );
    if plain.len() > MAX_PLAIN_KEY {
        format!("{KEY_PREFIX}:sha256:{}", sha256_hex(plain.as_bytes()))
    } else {
        plain
    }
}

pub fn gate_matrix_key(name: &str, angle: Option<f64>) -> String {
    match angle {
        Some(a) => format!("gate:{name}|theta={}", fmt_f64(a)),
        None => format!("gate:{name}"),
    }
}

/// Digest of a density matrix, stable under sub-grid floating noise.
pub fn state_fingerprint(rho: &ComplexMatrix) -> String {
    let mut hasher = Sha256::new();
    hasher.update((rho.nrows() as u64).to_le_bytes());
    hasher.update((rho.ncols() as u64).to_le_bytes());
    for z in rho.as_dmatrix().iter() {
        hasher.update(quantize(z.re).to_le_bytes());
        hasher.update(quantize(z.im).to_le_bytes());
    }
    format!("rho:{}", hex(&hasher.finalize()))
}

fn quantize(v: f64) -> i64 {
    (v / FINGERPRINT_GRID).round() as i64
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex(&Sha256::digest(bytes))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::complex::c;

    #[test]
    fn bell_key_is_readable() {
        let key = simulation_key(&Circuit::bell(), &InitialState::Zero, &SimulationOptions::default());
        insta::assert_snapshot!(key, @"sim:v1|n=2|g=H[0];CNOT[0,1]|init=zero|opts=reduced=1");
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let a = GateInstance::new("RZ", vec![0]).with_param("theta", 0.5).with_param("angle", 1.0);
        let b = GateInstance::new("RZ", vec![0]).with_param("angle", 1.0).with_param("theta", 0.5);
        assert_eq!(gate_descriptor(&a), gate_descriptor(&b));
        assert_eq!(gate_descriptor(&a), "RZ[0]{angle=1.0,theta=0.5}");
    }

    #[test]
    fn distinct_inputs_get_distinct_keys() {
        let opts = SimulationOptions::default();
        let k1 = simulation_key(&Circuit::bell(), &InitialState::Zero, &opts);
        let k2 = simulation_key(&Circuit::bell(), &InitialState::Basis(1), &opts);
        let k3 = simulation_key(
            &Circuit::bell(),
            &InitialState::Zero,
            &SimulationOptions { reduced_states: false, ..opts.clone() },
        );
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
        // use_cache and ttl do not change the result
        let k4 = simulation_key(
            &Circuit::bell(),
            &InitialState::Zero,
            &SimulationOptions { use_cache: false, ..opts },
        );
        assert_eq!(k1, k4);
    }

    #[test]
    fn long_keys_are_hashed() {
        let mut circ = Circuit::new(3);
        for i in 0..40 {
            circ = circ.rotation("RX", &[i % 3], i as f64 * 0.1);
        }
        let key = simulation_key(&circ, &InitialState::Zero, &SimulationOptions::default());
        assert!(key.starts_with("sim:v1:sha256:"));
        assert_eq!(key.len(), "sim:v1:sha256:".len() + 64);
        assert_eq!(key, simulation_key(&circ.clone(), &InitialState::Zero, &SimulationOptions::default()));
    }

    #[test]
    fn fingerprint_ignores_noise() {
        let mut a = ComplexMatrix::identity(2).scale(c(0.5, 0.0));
        let b = a.clone();
        a[(0, 1)] = c(1e-14, 0.0);
        assert_eq!(state_fingerprint(&a), state_fingerprint(&b));
        a[(0, 1)] = c(1e-3, 0.0);
        assert_ne!(state_fingerprint(&a), state_fingerprint(&b));
    }

    #[test]
    fn gate_keys() {
        assert_eq!(gate_matrix_key("H", None), "gate:H");
        assert_eq!(gate_matrix_key("RX", Some(-0.0)), "gate:RX|theta=0.0");
    }
}
