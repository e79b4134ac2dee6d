//! `qsim simulate`: run a circuit file and report the final state.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;

use crate::config::SimConfig;
use crate::core::kernel::sampling::{bitstring, sample_counts};
use crate::core::kernel::{Circuit, Engine, GateRegistry, InitialState, SimulationOptions, SimulationResult};
use crate::core::sim_cache::CacheService;
use crate::io::atomic::write_json;

/// Probabilities below this are left out of the printed table.
const PRINT_CUTOFF: f64 = 1e-9;

pub struct SimulateArgs {
    pub input: PathBuf,
    pub init: String,
    pub shots: Option<usize>,
    pub seed: Option<u64>,
    pub out: Option<PathBuf>,
}

/// `zero`, `mixed` or `basis:N`.
pub fn parse_init(s: &str) -> Result<InitialState> {
    match s.trim() {
        "zero" => Ok(InitialState::Zero),
        "mixed" => Ok(InitialState::MaximallyMixed),
        other => {
            let idx = other
                .strip_prefix("basis:")
                .ok_or_else(|| anyhow!("unknown initial state '{other}' (expected zero, mixed or basis:N)"))?;
            let k = idx
                .parse::<usize>()
                .with_context(|| format!("basis index '{idx}' is not a non-negative integer"))?;
            Ok(InitialState::Basis(k))
        }
    }
}

pub fn load_circuit(path: &Path) -> Result<Circuit> {
    let txt = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&txt).with_context(|| format!("parsing circuit {}", path.display()))
}

pub fn run(cfg: &SimConfig, args: SimulateArgs) -> Result<()> {
    let circuit = load_circuit(&args.input)?;
    let initial = parse_init(&args.init)?;
    let result = execute(cfg, &circuit, &initial, &SimulationOptions::default())?;
    print_report(&result);

    if let Some(shots) = args.shots {
        let counts = sample_counts(&result.probabilities, shots, args.seed)
            .context("sampling measurement shots")?;
        println!("{} {shots} shots", "counts:".cyan().bold());
        for (bits, n) in &counts {
            println!("  {bits}  {n}");
        }
    }

    if let Some(out) = &args.out {
        write_json(out, &result).with_context(|| format!("writing {}", out.display()))?;
        println!("{} wrote {}", "ok:".green().bold(), out.display());
    }
    Ok(())
}

/// Simulate with engine limits and caches from `cfg`; a circuit-level error becomes `Err`.
/// The caches live for this call only, so they share gate matrices across the
/// circuit's steps but never results across invocations.
pub fn execute(
    cfg: &SimConfig,
    circuit: &Circuit,
    initial: &InitialState,
    options: &SimulationOptions,
) -> Result<SimulationResult> {
    let engine = Engine::new(GateRegistry::shared())
        .with_tolerance(cfg.numerics.tolerance)
        .with_max_qubits(cfg.numerics.max_qubits);
    let mut caches = CacheService::new(cfg.cache_config());
    let result = engine.simulate_cached(circuit, Some(initial), options, &mut caches);
    if let Some(err) = &result.error {
        bail!("simulation failed: {err}");
    }
    Ok(result.as_ref().clone())
}

pub fn print_report(result: &SimulationResult) {
    let n = result.num_qubits;
    println!(
        "{} {n} qubit(s), {} warning(s)",
        "ok:".green().bold(),
        result.warnings.len()
    );
    for w in &result.warnings {
        eprintln!(
            "{} gate {} ({}): {}",
            "warn:".yellow().bold(),
            w.gate_index,
            w.gate,
            w.message
        );
    }

    println!("{}", "probabilities:".cyan().bold());
    for (k, p) in result.probabilities.iter().enumerate() {
        if *p > PRINT_CUTOFF {
            println!("  |{}>  {:.6}", bitstring(k, n), p);
        }
    }

    if !result.reduced_states.is_empty() {
        println!("{}", "qubits:".cyan().bold());
    }
    for st in &result.reduced_states {
        let b = st.bloch;
        println!(
            "  q{}  bloch ({:+.3}, {:+.3}, {:+.3})  purity {:.3}  entropy {:.3}  coherence {:.3}",
            st.qubit, b.x, b.y, b.z, st.purity, st.entropy, st.coherence
        );
    }
    if let Some(cn) = result.concurrence {
        println!("{} {:.6}", "concurrence:".cyan().bold(), cn);
    }
}
