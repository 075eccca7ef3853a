//! Test execution engine
//!
//! The worker pool, suite execution and the four execution backends.

mod backend;
mod cooperative;
mod pool;
mod process;
mod runner;
mod sequential;
mod suite;
mod threaded;

pub use backend::{Backend, ExecutionBackend};
pub use cooperative::{CooperativeBackend, TaskWorker};
pub use pool::{PoolSettings, WorkerHandle, WorkerPool};
pub use process::{serve_worker, ProcessBackend, ProcessWorker, WorkerCommand};
pub use runner::TestRunner;
pub use sequential::SequentialBackend;
pub use suite::{absorb, run_suite, run_suite_cooperative, SuiteExit};
pub use threaded::{ThreadBackend, ThreadWorker};
