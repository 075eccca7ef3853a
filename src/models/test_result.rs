//! Test outcome models
//!
//! Defines status types, per-unit outcome details and flattened results.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{RunnableUnit, UnitId};

/// Test execution status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    Error,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
            TestStatus::Skip => "○",
            TestStatus::Error => "!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Pass)
    }

    /// Whether this status makes the whole run unsuccessful
    pub fn is_problem(&self) -> bool {
        matches!(self, TestStatus::Fail | TestStatus::Error)
    }

    pub fn all() -> [TestStatus; 4] {
        [
            TestStatus::Pass,
            TestStatus::Skip,
            TestStatus::Fail,
            TestStatus::Error,
        ]
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Skip => write!(f, "SKIP"),
            TestStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Detail recorded alongside a unit in a result container
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeDetail {
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl OutcomeDetail {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            message: None,
            duration_ms,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Flattened result of a single unit, as handed to reporting
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitResult {
    pub id: UnitId,
    pub name: String,
    pub suite: Option<UnitId>,
    pub status: TestStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl UnitResult {
    pub fn new(unit: &RunnableUnit, status: TestStatus, detail: &OutcomeDetail) -> Self {
        Self {
            id: unit.id.clone(),
            name: unit.name.clone(),
            suite: unit.owner.clone(),
            status,
            message: detail.message.clone(),
            duration_ms: detail.duration_ms,
        }
    }

    /// Name of the suite this result belongs to
    pub fn suite_name(&self) -> &str {
        self.suite.as_ref().unwrap_or(&self.id).as_str()
    }
}

impl fmt::Display for UnitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status.symbol(),
            self.id,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_problems() {
        assert!(TestStatus::Fail.is_problem());
        assert!(TestStatus::Error.is_problem());
        assert!(!TestStatus::Skip.is_problem());
        assert!(TestStatus::Pass.is_success());
    }

    #[test]
    fn test_unit_result_display() {
        let suite = RunnableUnit::suite("net");
        let case = RunnableUnit::case(&suite.id, "dns");
        let result = UnitResult::new(
            &case,
            TestStatus::Fail,
            &OutcomeDetail::new(12).with_message("no answer"),
        );

        assert_eq!(result.suite_name(), "net");
        assert_eq!(result.to_string(), "✗ net::dns [12ms] - no answer");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TestStatus::Skip).unwrap(), "\"skip\"");
    }
}
