//! Built-in suite catalogs
//!
//! The binary's suite source. A catalog is rebuilt from its name, so the
//! coordinator and every worker process see the same suites with the same
//! unit ids.

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::extensions::ExtensionRegistry;
use crate::models::{CaseError, Suite};

/// Catalog names with a one-line description
pub const CATALOGS: &[(&str, &str)] = &[
    ("smoke", "Mixed blocking, async, skipped and extension-backed suites"),
    ("pairs", "Five suites, each with one passing and one failing case"),
    ("stop", "Five suites; the third requests a stop"),
];

/// Build the suites of catalog `name`
pub fn load(name: &str) -> Result<Vec<Suite>> {
    match name {
        "smoke" => Ok(smoke()),
        "pairs" => Ok(pairs()),
        "stop" => Ok(stop()),
        _ => anyhow::bail!(
            "Unknown catalog '{}'. Available: {}",
            name,
            names().join(", ")
        ),
    }
}

pub fn names() -> Vec<&'static str> {
    CATALOGS.iter().map(|(name, _)| *name).collect()
}

pub fn describe(name: &str) -> Option<&'static str> {
    CATALOGS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, description)| *description)
}

/// Shared services the built-in suites look up
pub fn install_extensions(registry: &ExtensionRegistry) {
    registry.shared_data("greeting", "hello, seismograph".to_string());
    registry.shared_extension("clock", RunClock::new, true);
}

/// Time since the extension was first looked up
#[derive(Debug)]
pub struct RunClock {
    started: Instant,
}

impl RunClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RunClock {
    fn default() -> Self {
        Self::new()
    }
}

fn check(condition: bool, message: impl Into<String>) -> Result<(), CaseError> {
    if condition {
        Ok(())
    } else {
        Err(CaseError::failed(message))
    }
}

fn smoke() -> Vec<Suite> {
    vec![
        Suite::new("strings")
            .with_case("trim", |_| check("  quake  ".trim() == "quake", "trim kept whitespace"))
            .with_case("split", |_| {
                let parts: Vec<&str> = "p,s,surface".split(',').collect();
                check(parts.len() == 3, format!("expected 3 parts, got {}", parts.len()))
            })
            .with_case("utf8_len", |_| {
                check("Ω".len() == 2 && "Ω".chars().count() == 1, "unexpected UTF-8 width")
            }),
        Suite::new("timers")
            .with_async_case("sleep", |_| async {
                let start = Instant::now();
                tokio::time::sleep(Duration::from_millis(5)).await;
                check(start.elapsed() >= Duration::from_millis(5), "woke up early")
            })
            .with_async_case("yield", |_| async {
                tokio::task::yield_now().await;
                Ok(())
            }),
        Suite::new("fixtures")
            .require("greeting")
            .require("clock")
            .with_case("greeting", |ctx| {
                let greeting = ctx.ext::<String>("greeting")?;
                check(greeting.starts_with("hello"), format!("unexpected greeting {greeting:?}"))
            })
            .with_case("clock", |ctx| {
                let clock = ctx.ext::<RunClock>("clock")?;
                check(clock.elapsed() < Duration::from_secs(3600), "clock ran backwards")
            }),
        Suite::new("environment").with_case("home", |_| match std::env::var_os("HOME") {
            Some(_) => Ok(()),
            None => Err(CaseError::skipped("HOME is not set")),
        }),
        Suite::new("platform")
            .skip("needs a seismometer attached")
            .with_case("calibrate", |_| Ok(()))
            .with_case("record", |_| Ok(())),
    ]
}

fn pairs() -> Vec<Suite> {
    (1..=5)
        .map(|n| {
            Suite::new(format!("pair-{n}"))
                .with_case("passes", |_| Ok(()))
                .with_case("fails", move |_| {
                    Err(CaseError::failed(format!("pair {n} fails on purpose")))
                })
        })
        .collect()
}

fn stop() -> Vec<Suite> {
    (1..=5)
        .map(|n| {
            let suite = Suite::new(format!("stop-{n}")).with_case("work", |_| Ok(()));
            if n == 3 {
                suite
                    .with_case("halt", |ctx| {
                        ctx.request_stop();
                        Ok(())
                    })
                    .with_case("after", |_| Err(CaseError::failed("ran after a stop")))
            } else {
                suite
            }
        })
        .collect()
}

/// Registry with the catalog extensions installed
pub fn extensions() -> Arc<ExtensionRegistry> {
    let registry = Arc::new(ExtensionRegistry::new());
    install_extensions(&registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::run_suite;
    use crate::results::ResultState;

    #[test]
    fn test_every_catalog_loads() {
        for name in names() {
            let suites = load(name).unwrap();
            assert!(!suites.is_empty(), "{name}");
            assert!(describe(name).is_some());
        }
        assert!(load("missing").is_err());
    }

    #[test]
    fn test_reload_yields_same_ids() {
        let first = load("pairs").unwrap();
        let second = load("pairs").unwrap();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.id(), b.id());
            let ids_a: Vec<_> = a.cases().iter().map(|c| c.id().clone()).collect();
            let ids_b: Vec<_> = b.cases().iter().map(|c| c.id().clone()).collect();
            assert_eq!(ids_a, ids_b);
        }
    }

    #[test]
    fn test_smoke_is_green_with_extensions() {
        let extensions = extensions();
        let mut state = ResultState::new();
        for suite in load("smoke").unwrap() {
            run_suite(&suite, &mut state, &extensions);
        }

        assert!(state.was_success(), "{:?}", state.failures());
        assert!(state.skipped().len() >= 2);
    }

    #[test]
    fn test_pairs_shape() {
        let suites = load("pairs").unwrap();
        assert_eq!(suites.len(), 5);
        assert!(suites.iter().all(|s| s.len() == 2));
    }
}
