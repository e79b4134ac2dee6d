//! `qsim gates`: list the registry, optionally with a unitarity check.
use anyhow::{bail, Result};
use colored::Colorize;

use crate::config::SimConfig;
use crate::core::kernel::gates::GateRegistry;
use crate::core::kernel::precision::{verify_registry, CHECK_ANGLES};

pub fn run(cfg: &SimConfig, verify: bool) -> Result<()> {
    let registry = GateRegistry::shared();
    for def in registry.definitions() {
        let kind = if def.is_parameterized() { "param" } else { "fixed" };
        println!("{:<6} {} qubit(s)  {}", def.name, def.arity, kind);
    }
    let aliases: Vec<String> = registry.aliases().map(|(a, t)| format!("{a}->{t}")).collect();
    if !aliases.is_empty() {
        println!("{} {}", "aliases:".cyan().bold(), aliases.join(", "));
    }

    if verify {
        let checks = verify_registry(registry, &CHECK_ANGLES, cfg.numerics.tolerance);
        let failed: Vec<_> = checks.iter().filter(|c| !c.unitary).collect();
        for chk in &failed {
            eprintln!(
                "{} {} at {:?}: |UU†-I| = {:e}",
                "error:".bright_red().bold(),
                chk.gate,
                chk.angle,
                chk.deviation
            );
        }
        if !failed.is_empty() {
            bail!("{} of {} gate checks failed", failed.len(), checks.len());
        }
        println!("{} {} gate checks unitary", "ok:".green().bold(), checks.len());
    }
    Ok(())
}
