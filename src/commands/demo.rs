//! `qsim demo`: built-in circuits.
use anyhow::Result;

use crate::cli::DemoKind;
use crate::commands::simulate::{execute, print_report};
use crate::config::SimConfig;
use crate::core::kernel::{Circuit, InitialState, SimulationOptions};

pub fn circuit_for(which: DemoKind) -> Circuit {
    match which {
        DemoKind::Bell => Circuit::bell(),
        DemoKind::Ghz => Circuit::ghz(3),
        DemoKind::Plus => Circuit::new(1).gate("H", &[0]),
    }
}

pub fn run(cfg: &SimConfig, which: DemoKind) -> Result<()> {
    let result = execute(cfg, &circuit_for(which), &InitialState::Zero, &SimulationOptions::default())?;
    print_report(&result);
    Ok(())
}
