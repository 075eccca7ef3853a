//! Run summary
//!
//! A serializable snapshot of a finished [`ResultState`], handed to output
//! formatters and result storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{TestStatus, UnitResult};
use crate::results::ResultState;

/// Summary of a completed run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub strategy: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub proxies: usize,
    pub stopped_early: bool,
    pub fatal: Option<String>,
    pub total_duration_ms: u64,
    pub results: Vec<UnitResult>,
}

impl RunSummary {
    pub fn from_state(
        run_id: impl Into<String>,
        strategy: impl Into<String>,
        started_at: DateTime<Utc>,
        state: &ResultState,
    ) -> Self {
        let completed_at = Utc::now();
        let total_duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;

        let mut results = state.unit_results();
        results.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            run_id: run_id.into(),
            strategy: strategy.into(),
            started_at,
            completed_at,
            total: state.total(),
            passed: state.successes().len(),
            failed: state.failures().len(),
            skipped: state.skipped().len(),
            errors: state.errors().len(),
            proxies: state.proxies().len(),
            stopped_early: state.should_stop(),
            fatal: state.fatal().map(str::to_string),
            total_duration_ms,
            results,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    /// Overall verdict of the run
    pub fn was_success(&self) -> bool {
        self.failed == 0 && self.errors == 0 && self.fatal.is_none()
    }

    pub fn with_status(&self, status: TestStatus) -> impl Iterator<Item = &UnitResult> {
        self.results.iter().filter(move |r| r.status == status)
    }

    /// Distinct suite names in result order
    pub fn suites(&self) -> Vec<&str> {
        let mut suites: Vec<&str> = Vec::new();
        for result in &self.results {
            let name = result.suite_name();
            if !suites.contains(&name) {
                suites.push(name);
            }
        }
        suites
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} - {} backend", self.run_id, self.strategy)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Error: {}",
            self.total, self.passed, self.failed, self.skipped, self.errors
        )?;
        if let Some(fatal) = &self.fatal {
            writeln!(f, "Aborted: {fatal}")?;
        }
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}
