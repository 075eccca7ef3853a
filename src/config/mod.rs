//! Configuration module
//!
//! Run settings come from built-in defaults, then a config file, then
//! `SEISMOGRAPH_*` environment variables, then command-line flags.

pub mod env;
pub mod file;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub use env::EnvConfig;
pub use file::{find_config_file, ConfigFile};

use crate::executor::PoolSettings;

/// Concurrency strategy, chosen once per run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Sequential,
    Thread,
    Cooperative,
    Process,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Thread => "thread",
            Strategy::Cooperative => "cooperative",
            Strategy::Process => "process",
        }
    }

    pub fn all() -> [Strategy; 4] {
        [
            Strategy::Sequential,
            Strategy::Thread,
            Strategy::Cooperative,
            Strategy::Process,
        ]
    }

    /// Whether suites run through the worker pool
    pub fn is_pooled(&self) -> bool {
        !matches!(self, Strategy::Sequential)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sequential" | "serial" => Ok(Strategy::Sequential),
            "thread" | "threads" | "threading" => Ok(Strategy::Thread),
            "cooperative" | "async" => Ok(Strategy::Cooperative),
            "process" | "processes" | "multiprocessing" => Ok(Strategy::Process),
            _ => anyhow::bail!(
                "Unknown strategy '{}'. Valid: sequential, thread, cooperative, process",
                s
            ),
        }
    }
}

/// Settings of one run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Execution backend
    pub strategy: Strategy,

    /// Upper bound of concurrently running workers
    pub max_concurrency: usize,

    /// Seconds to wait for a pool slot or a worker join
    pub release_timeout_secs: f64,

    /// Pool polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Stop at the first failure or error
    pub fail_fast: bool,

    /// Built-in suite catalog to run
    pub catalog: String,

    /// Program spawned for isolated workers; defaults to this executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_program: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_concurrency: 4,
            release_timeout_secs: 30.0,
            poll_interval_ms: 1,
            fail_fast: false,
            catalog: "smoke".to_string(),
            worker_program: None,
        }
    }
}

impl RunConfig {
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_release_timeout(mut self, secs: f64) -> Self {
        self.release_timeout_secs = secs;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = catalog.into();
        self
    }

    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    /// Load a bare run config from a JSON or YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if file::is_yaml_file(path) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be at least 1");
        }
        self.release_timeout()?;
        if self.catalog.trim().is_empty() {
            anyhow::bail!("catalog must not be empty");
        }
        Ok(())
    }

    /// `release_timeout_secs` as a duration; must be positive and representable
    pub fn release_timeout(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.release_timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => anyhow::bail!(
                "release_timeout_secs must be a positive number of seconds, got {}",
                self.release_timeout_secs
            ),
        }
    }

    /// Worker pool limits derived from this config
    pub fn pool_settings(&self) -> Result<PoolSettings> {
        self.validate()?;
        let max = NonZeroUsize::new(self.max_concurrency)
            .context("max_concurrency must be at least 1")?;

        Ok(PoolSettings::new(max, self.release_timeout()?)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms.max(1))))
    }
}
