//! Logging utilities
//!
//! Log lines never go to stdout: a worker process speaks the result
//! protocol there, and a stray log line would be read as case output.

use std::fmt;
use std::str::FromStr;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Level of one process: `-v` wins, then `configured` (SEISMOGRAPH_LOG).
    /// Workers default to warnings so their stderr stays quiet.
    pub fn select(verbose: bool, worker: bool, configured: Option<&str>) -> Self {
        if verbose {
            return LogLevel::Debug;
        }
        if let Some(level) = configured.and_then(|s| s.parse().ok()) {
            return level;
        }
        if worker {
            LogLevel::Warn
        } else {
            LogLevel::Info
        }
    }

    /// Filter directive limiting output to this crate
    pub fn directive(self) -> String {
        format!("seismograph={}", self.to_tracing_level())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tracing_level())
    }
}

fn subscriber<W>(level: LogLevel, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level.directive()))
        .with_writer(writer)
        .with_target(false)
        .compact()
        .finish()
}

/// Initialize the global logger, writing to stderr. A second call is a no-op.
pub fn init_logger(level: LogLevel) {
    let _ = tracing::subscriber::set_global_default(subscriber(level, std::io::stderr));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("info".parse(), Ok(LogLevel::Info));
        assert_eq!("DEBUG".parse(), Ok(LogLevel::Debug));
        assert_eq!(" warning ".parse(), Ok(LogLevel::Warn));
        assert!("unknown".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_select_level() {
        assert_eq!(LogLevel::select(true, true, Some("error")), LogLevel::Debug);
        assert_eq!(LogLevel::select(false, false, Some("trace")), LogLevel::Trace);
        assert_eq!(LogLevel::select(false, false, Some("loud")), LogLevel::Info);
        assert_eq!(LogLevel::select(false, true, None), LogLevel::Warn);
        assert_eq!(LogLevel::select(false, false, None), LogLevel::Info);
    }

    #[test]
    fn test_directive_is_crate_scoped() {
        assert_eq!(LogLevel::Warn.directive(), "seismograph=WARN");
    }

    #[test]
    fn test_events_reach_only_the_given_writer() {
        let capture = Capture::default();
        let sink = capture.clone();

        tracing::subscriber::with_default(subscriber(LogLevel::Info, move || sink.clone()), || {
            tracing::info!("suite started");
            tracing::debug!("too chatty");
        });

        let text = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("suite started"));
        assert!(!text.contains("too chatty"));
    }
}
