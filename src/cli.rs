use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DemoKind {
    /// H(0), CNOT(0,1)
    Bell,
    /// 3-qubit GHZ
    Ghz,
    /// H on one qubit
    Plus,
}

#[derive(Debug, Parser)]
#[command(
    name = "qsim",
    about = "Density-matrix quantum circuit simulator",
    version,
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct QsimCli {
    /// Global: path to config (TOML); default: ~/.qsim/config.toml
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Global: more log output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Simulate a circuit JSON file
    ///
    /// Examples:
    ///   qsim simulate bell.json
    ///   qsim simulate bell.json --init basis:1 --shots 1000 --seed 7 --out result.json
    Simulate {
        /// Circuit file: {"numQubits": n, "gates": [{"name", "qubits", "parameters"?}]}
        #[arg(value_name = "CIRCUIT")]
        input: PathBuf,

        /// Initial state: zero | basis:N | mixed
        #[arg(long = "init", value_name = "STATE", default_value = "zero")]
        init: String,

        /// Sample this many measurement shots from the final probabilities
        #[arg(long = "shots", value_name = "N")]
        shots: Option<usize>,

        /// Seed for shot sampling
        #[arg(long = "seed", value_name = "S")]
        seed: Option<u64>,

        /// Write the full result as JSON
        #[arg(long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// List registered gates
    Gates {
        /// Check every gate for unitarity
        #[arg(long = "verify", action = ArgAction::SetTrue)]
        verify: bool,
    },

    /// Run a built-in circuit
    Demo {
        #[arg(value_enum)]
        which: DemoKind,
    },
}
