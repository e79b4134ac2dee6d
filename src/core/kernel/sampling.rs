//! Measurement sampling over the computational basis.
use std::collections::BTreeMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::error::{SimError, SimResult};

/// Basis index as a bitstring, qubit 0 leftmost.
pub fn bitstring(index: usize, num_qubits: usize) -> String {
    (0..num_qubits)
        .map(|q| if (index >> (num_qubits - 1 - q)) & 1 == 1 { '1' } else { '0' })
        .collect()
}

/// Draw `shots` outcomes from `probabilities` (length 2^n). Tiny negative values left
/// by rounding are treated as zero. A fixed `seed` makes the counts reproducible.
pub fn sample_counts(probabilities: &[f64], shots: usize, seed: Option<u64>) -> SimResult<BTreeMap<String, usize>> {
    let dim = probabilities.len();
    if dim == 0 || !dim.is_power_of_two() {
        return Err(SimError::DimensionMismatch { expected: dim.next_power_of_two().max(1), actual: dim });
    }
    let num_qubits = dim.trailing_zeros() as usize;
    let weights: Vec<f64> = probabilities.iter().map(|p| p.max(0.0)).collect();
    let dist = WeightedIndex::new(&weights)
        .map_err(|e| SimError::MalformedCircuit(format!("cannot sample probabilities: {e}")))?;
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let mut counts = BTreeMap::new();
    for _ in 0..shots {
        let k = dist.sample(&mut rng);
        *counts.entry(bitstring(k, num_qubits)).or_insert(0) += 1;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitstrings_put_qubit_zero_first() {
        assert_eq!(bitstring(0b10, 2), "10");
        assert_eq!(bitstring(1, 3), "001");
        assert_eq!(bitstring(0, 0), "");
    }

    #[test]
    fn deterministic_distribution() {
        let counts = sample_counts(&[0.0, 0.0, 1.0, 0.0], 50, Some(7)).unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["10"], 50);
    }

    #[test]
    fn seeded_runs_repeat() {
        let p = [0.5, 0.0, 0.0, 0.5];
        let a = sample_counts(&p, 200, Some(42)).unwrap();
        let b = sample_counts(&p, 200, Some(42)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.values().sum::<usize>(), 200);
        assert!(a.keys().all(|k| k == "00" || k == "11"));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(sample_counts(&[], 10, None).is_err());
        assert!(sample_counts(&[0.5, 0.25, 0.25], 10, None).is_err());
        assert!(sample_counts(&[0.0, 0.0], 10, None).is_err());
    }
}
