//! Data models for test execution
//!
//! Runnable units, suites and cases, and the outcome types recorded for them.

mod suite;
mod test_result;
mod unit;

pub use suite::{Case, CaseBody, CaseContext, CaseError, CaseResult, Suite};
pub use test_result::{OutcomeDetail, TestStatus, UnitResult};
pub use unit::{RunnableUnit, UnitId, ID_SEPARATOR};
