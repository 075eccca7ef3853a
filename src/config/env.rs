//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;
use tracing::warn;

use super::{RunConfig, Strategy};

/// Environment variable prefix
const ENV_PREFIX: &str = "SEISMOGRAPH";

/// Overrides read from `SEISMOGRAPH_*` variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvConfig {
    /// Strategy from SEISMOGRAPH_STRATEGY
    pub strategy: Option<Strategy>,
    /// Concurrency from SEISMOGRAPH_CONCURRENCY
    pub max_concurrency: Option<usize>,
    /// Release timeout in seconds from SEISMOGRAPH_TIMEOUT
    pub release_timeout_secs: Option<f64>,
    /// Fail-fast from SEISMOGRAPH_FAIL_FAST
    pub fail_fast: Option<bool>,
    /// Catalog from SEISMOGRAPH_CATALOG
    pub catalog: Option<String>,
    /// Config file from SEISMOGRAPH_CONF
    pub config_file: Option<String>,
    /// Log level from SEISMOGRAPH_LOG
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `load` uses the process environment
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}_{name}")).filter(|v| !v.trim().is_empty())
        };

        Self {
            strategy: get("STRATEGY").and_then(|v| parse_or_warn("STRATEGY", &v)),
            max_concurrency: get("CONCURRENCY").and_then(|v| parse_or_warn("CONCURRENCY", &v)),
            release_timeout_secs: get("TIMEOUT").and_then(|v| parse_or_warn("TIMEOUT", &v)),
            fail_fast: get("FAIL_FAST").map(|v| parse_bool(&v)),
            catalog: get("CATALOG"),
            config_file: get("CONF"),
            log_level: get("LOG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.strategy.is_some()
            || self.max_concurrency.is_some()
            || self.release_timeout_secs.is_some()
            || self.fail_fast.is_some()
            || self.catalog.is_some()
            || self.config_file.is_some()
            || self.log_level.is_some()
    }

    /// Overlay every set variable onto `config`
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(max) = self.max_concurrency {
            config.max_concurrency = max;
        }
        if let Some(secs) = self.release_timeout_secs {
            config.release_timeout_secs = secs;
        }
        if let Some(fail_fast) = self.fail_fast {
            config.fail_fast = fail_fast;
        }
        if let Some(catalog) = &self.catalog {
            config.catalog = catalog.clone();
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        warn!("Ignoring {}_{}={:?}: not a valid value", ENV_PREFIX, name, value);
    }
    parsed
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

/// Print all SEISMOGRAPH environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_STRATEGY     Execution strategy (sequential, thread, cooperative, process)");
    println!("  {ENV_PREFIX}_CONCURRENCY  Maximum concurrently running workers");
    println!("  {ENV_PREFIX}_TIMEOUT      Release timeout in seconds");
    println!("  {ENV_PREFIX}_FAIL_FAST    Stop at the first failure (true/false)");
    println!("  {ENV_PREFIX}_CATALOG      Suite catalog to run");
    println!("  {ENV_PREFIX}_CONF         Path to configuration file");
    println!("  {ENV_PREFIX}_LOG          Log level (trace, debug, info, warn, error)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_STRATEGY=process");
    println!("  export {ENV_PREFIX}_CONCURRENCY=8");
    println!("  seismograph run --catalog pairs");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::from_lookup(lookup(&[]));
        assert_eq!(config, EnvConfig::default());
        assert!(!config.has_any());
    }

    #[test]
    fn test_env_config_parses_values() {
        let config = EnvConfig::from_lookup(lookup(&[
            ("SEISMOGRAPH_STRATEGY", "process"),
            ("SEISMOGRAPH_CONCURRENCY", "8"),
            ("SEISMOGRAPH_TIMEOUT", "2.5"),
            ("SEISMOGRAPH_FAIL_FAST", "yes"),
            ("SEISMOGRAPH_CATALOG", "pairs"),
        ]));

        assert_eq!(config.strategy, Some(Strategy::Process));
        assert_eq!(config.max_concurrency, Some(8));
        assert_eq!(config.release_timeout_secs, Some(2.5));
        assert_eq!(config.fail_fast, Some(true));
        assert_eq!(config.catalog.as_deref(), Some("pairs"));
        assert!(config.has_any());
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let config = EnvConfig::from_lookup(lookup(&[
            ("SEISMOGRAPH_STRATEGY", "fork"),
            ("SEISMOGRAPH_CONCURRENCY", "many"),
            ("SEISMOGRAPH_CATALOG", "  "),
        ]));

        assert!(config.strategy.is_none());
        assert!(config.max_concurrency.is_none());
        assert!(config.catalog.is_none());
    }

    #[test]
    fn test_apply_overrides_only_set_fields() {
        let mut run = RunConfig::default().with_catalog("stop");
        let env = EnvConfig {
            strategy: Some(Strategy::Thread),
            fail_fast: Some(false),
            ..Default::default()
        };
        env.apply(&mut run);

        assert_eq!(run.strategy, Strategy::Thread);
        assert_eq!(run.catalog, "stop");
        assert_eq!(run.max_concurrency, 4);
    }

    #[test]
    fn test_env_bool_parsing() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("off"));
    }
}
