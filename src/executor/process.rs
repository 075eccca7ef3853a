//! Process backend
//!
//! Every suite runs in its own worker process. Before anything is spawned,
//! each suite and its cases are registered in an [`IdentityRegistry`]. A
//! worker rebuilds the suite from the same catalog, runs it against a
//! process-local state and writes one [`PartialResultBundle`] line to stdout.
//!
//! The coordinator side keeps one reader thread per worker. It forwards the
//! bundle line onto the [`CrossBoundaryChannel`], raises the coordinator's
//! stop flag when the worker asks for a stop, and publishes a "missing"
//! envelope when the worker exits without a bundle. Once the pool has joined
//! every worker, the aggregator drains the channel and merges each envelope
//! exactly once.

use anyhow::Context;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::executor::{run_suite, ExecutionBackend, PoolSettings, WorkerHandle, WorkerPool};
use crate::extensions::ExtensionRegistry;
use crate::models::Suite;
use crate::results::{
    ChannelPublisher, CrossBoundaryChannel, Envelope, IdentityRegistry, PartialResultBundle,
    ResultAggregator, ResultState, StopFlag, BUNDLE_PREFIX, STOP_MARKER,
};
use crate::utils::{waiting_for, Stopwatch};

/// Program and leading arguments of a worker; `--suite <name>` is appended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    fn command_for(&self, suite: &str, fail_fast: bool) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--suite")
            .arg(suite)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if fail_fast {
            command.arg("--fail-fast");
        }
        command
    }
}

pub struct ProcessBackend {
    settings: PoolSettings,
    command: WorkerCommand,
}

impl ProcessBackend {
    pub fn new(settings: PoolSettings, command: WorkerCommand) -> Self {
        Self { settings, command }
    }

    fn spawn(
        &self,
        suite: String,
        fail_fast: bool,
        publisher: &ChannelPublisher,
        stop: &StopFlag,
    ) -> Result<ProcessWorker, EngineError> {
        let spawn_error = |source| EngineError::Spawn {
            suite: suite.clone(),
            source,
        };

        let mut child = self
            .command
            .command_for(&suite, fail_fast)
            .spawn()
            .map_err(spawn_error)?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(spawn_error(std::io::Error::other("worker stdout was not captured")));
        };

        let reader = {
            let suite = suite.clone();
            let publisher = publisher.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name(format!("reader-{suite}"))
                .spawn(move || read_worker_output(&suite, stdout, &publisher, &stop))
        };
        let reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(spawn_error(e));
            }
        };

        debug!("Started worker pid {} for suite {}", child.id(), suite);
        Ok(ProcessWorker {
            suite,
            child,
            reader: Some(reader),
            poll_interval: self.settings.poll_interval,
        })
    }
}

/// How long a killed worker's reader gets to see end of file
const READER_GRACE: Duration = Duration::from_secs(1);

/// Forward one worker's stdout onto the channel. Markers are found anywhere
/// in a line, since case output without a trailing newline may precede them.
fn read_worker_output<R: Read>(suite: &str, stdout: R, publisher: &ChannelPublisher, stop: &StopFlag) {
    let mut published = false;

    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read output of suite {}: {}", suite, e);
                break;
            }
        };

        if let Some(at) = line.find(BUNDLE_PREFIX) {
            if at > 0 {
                debug!("[{}] {}", suite, &line[..at]);
            }
            let payload = &line[at + BUNDLE_PREFIX.len()..];
            if published {
                warn!("Suite {} published a second bundle, ignoring it", suite);
                continue;
            }
            publisher.publish(Envelope::bundle(suite, payload));
            published = true;
        } else if line.ends_with(STOP_MARKER) {
            info!("Worker for suite {} requested a stop", suite);
            stop.set();
        } else {
            debug!("[{}] {}", suite, line);
        }
    }

    if !published {
        publisher.publish(Envelope::missing(suite));
    }
}

/// Worker process plus the thread reading its stdout
pub struct ProcessWorker {
    suite: String,
    child: Child,
    reader: Option<JoinHandle<()>>,
    poll_interval: Duration,
}

impl ProcessWorker {
    fn child_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl WorkerHandle for ProcessWorker {
    /// Results travel over the channel, not through the handle
    type Output = ();

    fn is_alive(&mut self) -> bool {
        self.child_running() || self.reader.as_ref().is_some_and(|r| !r.is_finished())
    }

    fn join(&mut self, timeout: Duration) -> Option<()> {
        let interval = self.poll_interval;
        waiting_for(|| !self.is_alive(), interval, timeout).ok()?;

        match self.child.wait() {
            Ok(status) if !status.success() => {
                debug!("Worker for suite {} exited with {}", self.suite, status)
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to reap worker for suite {}: {}", self.suite, e),
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Output reader of suite {} panicked", self.suite);
            }
        }
        Some(())
    }

    fn terminate(&mut self) {
        if !self.child_running() {
            return;
        }
        warn!("Killing worker pid {} (suite {})", self.child.id(), self.suite);
        if let Err(e) = self.child.kill() {
            warn!("Failed to kill worker for suite {}: {}", self.suite, e);
        }
    }

    /// The reader publishes the missing bundle; wait for it so the loss is
    /// merged with everything else
    fn abandoned(&mut self) -> Option<()> {
        if let Err(e) = self.child.wait() {
            warn!("Failed to reap worker for suite {}: {}", self.suite, e);
        }
        let Some(reader) = self.reader.take() else {
            return None;
        };
        if waiting_for(|| reader.is_finished(), self.poll_interval, READER_GRACE).is_ok() {
            let _ = reader.join();
        } else {
            warn!("Output reader of suite {} is still blocked", self.suite);
        }
        None
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        if self.child_running() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

impl ExecutionBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    fn run(&self, suites: &[Suite], state: &mut ResultState) -> Result<(), EngineError> {
        info!(
            "Running {} suites in worker processes (max {} concurrent)",
            suites.len(),
            self.settings.max_concurrency
        );
        let mut watch = Stopwatch::new();

        let mut registry = IdentityRegistry::new();
        for suite in suites {
            registry.register(suite)?;
        }
        watch.lap("register");

        let mut channel = CrossBoundaryChannel::new();
        let publisher = channel.publisher();
        let stop = state.stop_flag().clone();
        let fail_fast = state.fail_fast();

        let mut pool = WorkerPool::new(self.settings);
        for suite in suites {
            pool.submit(suite.name().to_string());
        }

        let driven = pool.drive(
            &stop,
            |suite| self.spawn(suite, fail_fast, &publisher, &stop),
            |()| {},
        );
        watch.lap("dispatch");

        // Whatever was published is merged, even when the pool aborted
        let merged = ResultAggregator::new(&registry).sync(state, &mut channel);
        watch.lap("merge");

        info!(
            "Process backend finished: {} workers, peak {} running, {}",
            pool.started(),
            pool.peak_running(),
            watch.format()
        );

        driven?;
        merged.map(|_| ())
    }
}

/// Body of a worker process: run `suite_name` from `suites` and write the
/// stop marker (if requested) and the bundle line to `out`
pub fn serve_worker<W: Write>(
    suites: &[Suite],
    suite_name: &str,
    fail_fast: bool,
    extensions: &Arc<ExtensionRegistry>,
    out: &mut W,
) -> anyhow::Result<PartialResultBundle> {
    let suite = suites
        .iter()
        .find(|s| s.name() == suite_name)
        .with_context(|| format!("Suite '{suite_name}' not found"))?;

    let mut state = ResultState::new().with_fail_fast(fail_fast);
    run_suite(suite, &mut state, extensions);

    // Case output may have left a line open
    writeln!(out).context("Failed to write result bundle")?;
    if state.should_stop() {
        writeln!(out, "{STOP_MARKER}").context("Failed to write stop marker")?;
    }

    let bundle = PartialResultBundle::from_state(suite.name(), &state);
    let line = bundle.to_line().context("Failed to encode result bundle")?;
    writeln!(out, "{line}").context("Failed to write result bundle")?;
    out.flush().context("Failed to flush result bundle")?;

    Ok(bundle)
}
