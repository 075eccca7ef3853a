//! Seismograph - pluggable test-execution engine
//!
//! Runs suites of test cases through one of four interchangeable backends
//! and collects every outcome into a single [`results::ResultState`]:
//!
//! - `sequential`: suites run one after another in the calling thread
//! - `thread`: one OS thread per suite, bounded by the worker pool
//! - `cooperative`: one task per suite on a single-threaded tokio runtime
//! - `process`: one child process per suite; outcomes travel back as
//!   partial result bundles and are re-attached through the identity
//!   registry
//!
//! A stop request (explicit, or fail-fast) keeps new suites from being
//! started while suites already in flight run to completion.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod extensions;
pub mod models;
pub mod output;
pub mod results;
pub mod utils;

pub use config::{RunConfig, Strategy};
pub use error::EngineError;
pub use executor::{Backend, ExecutionBackend, TestRunner};
pub use models::{CaseError, Suite, TestStatus};
pub use results::{ResultState, RunSummary};
