//! tracing subscriber setup for the binary. Library code only emits events.
use tracing_subscriber::EnvFilter;

/// `-v` count to a level; `None` leaves the choice to the config file.
pub fn verbosity_level(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Filter precedence: `RUST_LOG`, then `-v`, then the configured level.
pub fn filter(verbose: u8, config_level: &str) -> EnvFilter {
    if let Ok(f) = EnvFilter::try_from_default_env() {
        return f;
    }
    let level = verbosity_level(verbose).unwrap_or(config_level);
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global fmt subscriber writing to stderr. Safe to call twice.
pub fn init(verbose: u8, config_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose, config_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
