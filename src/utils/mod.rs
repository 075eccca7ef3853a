//! Utility modules
//!
//! Logging setup, timers and polling waits.

pub mod logger;
pub mod timer;
pub mod wait;

pub use logger::{init_logger, LogLevel};
pub use timer::{Stopwatch, Timer};
pub use wait::{waiting_for, waiting_for_async, WaitTimeout};
