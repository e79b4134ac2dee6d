//! User configuration: built-in defaults overlaid by an optional TOML file.
//!
//! - `SimConfig::default()` → built-in limits
//! - `SimConfig::from_toml_str(s)` / `SimConfig::load(path)` → parse a file
//! - `SimConfig::load_or_default(path)` → missing file means defaults
//!
//! ```toml
//! [cache]
//! max_entries = 256
//! max_bytes = 67108864
//! ttl_ms = 300000   # 0 disables expiry
//!
//! [numerics]
//! tolerance = 1e-10
//! max_qubits = 10
//!
//! [log]
//! level = "warn"
//! ```
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::kernel::circuit::MAX_QUBITS;
use crate::core::kernel::complex::DEFAULT_TOLERANCE;
use crate::core::sim_cache::{CacheConfig, DEFAULT_MAX_BYTES, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::core::worker::WorkerConfig;

pub fn default_config_path() -> Option<PathBuf> {
    // ~/.qsim/config.toml (C:\Users\you\.qsim\config.toml on Windows)
    dirs_next::home_dir().map(|h| h.join(".qsim").join("config.toml"))
}

pub fn resolve_config_path(cli_path: &Option<PathBuf>) -> Option<PathBuf> {
    if let Some(p) = cli_path {
        return Some(p.clone());
    }
    default_config_path()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_entries: usize,
    pub max_bytes: usize,
    pub ttl_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
            ttl_ms: DEFAULT_TTL.as_millis() as u64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericsSection {
    pub tolerance: f64,
    pub max_qubits: usize,
}

impl Default for NumericsSection {
    fn default() -> Self {
        Self { tolerance: DEFAULT_TOLERANCE, max_qubits: 10 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self { level: "warn".into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub cache: CacheSection,
    pub numerics: NumericsSection,
    pub log: LogSection,
}

impl SimConfig {
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let cfg: SimConfig = toml::from_str(txt).context("parsing config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&txt).with_context(|| format!("loading {}", path.display()))
    }

    /// Defaults when `path` is `None` or does not exist; a file that exists but fails
    /// to parse is still an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.numerics.tolerance.is_finite() && self.numerics.tolerance > 0.0) {
            bail!("numerics.tolerance must be a positive number");
        }
        if self.numerics.max_qubits == 0 || self.numerics.max_qubits > MAX_QUBITS {
            bail!("numerics.max_qubits must be between 1 and {MAX_QUBITS}");
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache.max_entries,
            max_bytes: self.cache.max_bytes,
            default_ttl: (self.cache.ttl_ms > 0).then(|| Duration::from_millis(self.cache.ttl_ms)),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            cache: self.cache_config(),
            tolerance: self.numerics.tolerance,
            max_qubits: self.numerics.max_qubits,
        }
    }
}
