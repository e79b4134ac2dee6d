/// qsim main: load config, set up logging, dispatch the subcommand.
use anyhow::Result;
use clap::Parser; // trait import enables QsimCli::parse()

use qsim_kernel::cli::{Command, QsimCli};
use qsim_kernel::commands;
use qsim_kernel::commands::simulate::SimulateArgs;
use qsim_kernel::config::{resolve_config_path, SimConfig};
use qsim_kernel::logging;

fn main() -> Result<()> {
    let args = QsimCli::parse();

    let cfg_path = resolve_config_path(&args.config);
    let cfg = SimConfig::load_or_default(cfg_path.as_deref())?;
    logging::init(args.verbose, &cfg.log.level);
    tracing::debug!(config = ?cfg_path, "configuration loaded");

    match args.cmd {
        Command::Simulate { input, init, shots, seed, out } => commands::simulate::run(
            &cfg,
            SimulateArgs { input, init, shots, seed, out },
        ),
        Command::Gates { verify } => commands::gates::run(&cfg, verify),
        Command::Demo { which } => commands::demo::run(&cfg, which),
    }
}
