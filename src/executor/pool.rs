//! Admission-controlled worker pool
//!
//! Units wait in a FIFO pending queue until [`WorkerPool::drive`] starts them.
//! Started workers sit on a running stack until they report not-alive and are
//! joined. Admission is start-then-throttle: a unit is started first and the
//! pool then polls until the running stack is below `max_concurrency` again,
//! giving up with [`EngineError::PoolReleaseTimeout`] after `release_timeout`.
//!
//! The pool only needs liveness, bounded join and forced termination from a
//! worker, so threads, cooperative tasks and child processes all plug in
//! through [`WorkerHandle`].

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::results::StopFlag;
use crate::utils::{waiting_for, waiting_for_async};

/// One dispatched unit of concurrency
pub trait WorkerHandle {
    /// What a joined worker hands back
    type Output;

    fn is_alive(&mut self) -> bool;

    /// Wait up to `timeout` for the worker to finish and reap it.
    /// `None` if it is still running.
    fn join(&mut self, timeout: Duration) -> Option<Self::Output>;

    /// Forced, lossy stop
    fn terminate(&mut self);

    /// Output reported in place of a worker that was terminated before it
    /// could be joined. `None` when the worker reports its loss elsewhere.
    fn abandoned(&mut self) -> Option<Self::Output> {
        None
    }
}

/// Pool limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_concurrency: NonZeroUsize,
    pub release_timeout: Duration,
    pub poll_interval: Duration,
}

impl PoolSettings {
    pub fn new(max_concurrency: NonZeroUsize, release_timeout: Duration) -> Self {
        Self {
            max_concurrency,
            release_timeout,
            poll_interval: Duration::from_millis(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN), Duration::from_secs(30))
    }
}

pub struct WorkerPool<U, H: WorkerHandle> {
    pending: VecDeque<U>,
    running: Vec<H>,
    completed: Vec<H::Output>,
    settings: PoolSettings,
    started: usize,
    peak_running: usize,
}

impl<U, H: WorkerHandle> WorkerPool<U, H> {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            pending: VecDeque::new(),
            running: Vec::new(),
            completed: Vec::new(),
            settings,
            started: 0,
            peak_running: 0,
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Queue a unit; it is not started until [`drive`](Self::drive)
    pub fn submit(&mut self, unit: U) {
        self.pending.push_back(unit);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    /// Units started so far
    pub fn started(&self) -> usize {
        self.started
    }

    /// Largest running stack observed
    pub fn peak_running(&self) -> usize {
        self.peak_running
    }

    /// Join and drop every worker that reports not-alive. Alive workers stay.
    pub fn try_release(&mut self) -> usize {
        let timeout = self.settings.release_timeout;
        let mut released = 0;

        for idx in (0..self.running.len()).rev() {
            if self.running[idx].is_alive() {
                continue;
            }

            let mut handle = self.running.remove(idx);
            match handle.join(timeout) {
                Some(output) => self.completed.push(output),
                None => {
                    warn!(
                        "Worker reported done but was not joined within {:?}",
                        timeout
                    );
                    self.abandon(handle);
                }
            }
            released += 1;
        }

        if released > 0 {
            debug!(
                "Released {} workers, {} still running",
                released,
                self.running.len()
            );
        }
        released
    }

    pub fn has_capacity(&mut self) -> bool {
        self.try_release();
        self.running.len() < self.settings.max_concurrency.get()
    }

    /// Poll until a slot is free
    pub fn admit(&mut self) -> Result<(), EngineError> {
        let PoolSettings {
            release_timeout,
            poll_interval,
            ..
        } = self.settings;

        waiting_for(|| self.has_capacity(), poll_interval, release_timeout)
            .map_err(|_| EngineError::PoolReleaseTimeout {
                timeout: release_timeout,
            })
    }

    /// Async twin of [`admit`](Self::admit) for cooperative workers
    pub async fn admit_async(&mut self) -> Result<(), EngineError> {
        let PoolSettings {
            release_timeout,
            poll_interval,
            ..
        } = self.settings;

        waiting_for_async(|| self.has_capacity(), poll_interval, release_timeout)
            .await
            .map_err(|_| EngineError::PoolReleaseTimeout {
                timeout: release_timeout,
            })
    }

    fn start_next<S>(&mut self, start: &mut S) -> Result<(), EngineError>
    where
        S: FnMut(U) -> Result<H, EngineError>,
    {
        let Some(unit) = self.pending.pop_front() else {
            return Ok(());
        };

        let handle = start(unit)?;
        self.running.push(handle);
        self.started += 1;
        self.peak_running = self.peak_running.max(self.running.len());
        Ok(())
    }

    fn stop_requested(&mut self, stop: &StopFlag) -> bool {
        if !stop.is_set() {
            return false;
        }
        info!(
            "Stop requested, {} queued units will not be started",
            self.pending.len()
        );
        self.pending.clear();
        true
    }

    fn flush_completed<F>(&mut self, on_output: &mut F)
    where
        F: FnMut(H::Output),
    {
        for output in self.completed.drain(..) {
            on_output(output);
        }
    }

    /// Start every queued unit under admission control, then join the rest.
    ///
    /// `on_output` sees each joined worker's output as soon as it is released.
    /// On a fatal error the remaining workers are terminated before returning.
    pub fn drive<S, F>(&mut self, stop: &StopFlag, mut start: S, mut on_output: F) -> Result<(), EngineError>
    where
        S: FnMut(U) -> Result<H, EngineError>,
        F: FnMut(H::Output),
    {
        let mut result = Ok(());
        while !self.pending.is_empty() && !self.stop_requested(stop) {
            result = self
                .start_next(&mut start)
                .and_then(|()| self.admit());
            self.flush_completed(&mut on_output);
            if result.is_err() {
                break;
            }
        }

        match &result {
            Ok(()) => self.join_all(),
            Err(e) => {
                error!("Aborting worker pool: {}", e);
                self.terminate_all();
                self.join_all();
            }
        }
        self.flush_completed(&mut on_output);
        result
    }

    /// Async twin of [`drive`](Self::drive)
    pub async fn drive_async<S, F>(
        &mut self,
        stop: &StopFlag,
        mut start: S,
        mut on_output: F,
    ) -> Result<(), EngineError>
    where
        S: FnMut(U) -> Result<H, EngineError>,
        F: FnMut(H::Output),
    {
        let mut result = Ok(());
        while !self.pending.is_empty() && !self.stop_requested(stop) {
            result = self.start_next(&mut start);
            if result.is_ok() {
                result = self.admit_async().await;
            }
            self.flush_completed(&mut on_output);
            if result.is_err() {
                break;
            }
        }

        if let Err(e) = &result {
            error!("Aborting worker pool: {}", e);
            self.terminate_all();
        }
        self.join_all_async().await;
        self.flush_completed(&mut on_output);
        result
    }

    /// Terminate a worker that will not be joined and keep whatever it
    /// reports for the loss
    fn abandon(&mut self, mut handle: H) {
        handle.terminate();
        if let Some(output) = handle.abandoned() {
            self.completed.push(output);
        }
    }

    /// Join every running worker, each bounded by `release_timeout`.
    /// Workers that overrun are terminated and reported as abandoned.
    pub fn join_all(&mut self) {
        let timeout = self.settings.release_timeout;
        for mut handle in std::mem::take(&mut self.running) {
            match handle.join(timeout) {
                Some(output) => self.completed.push(output),
                None => {
                    warn!("Worker did not finish within {:?}, terminating", timeout);
                    self.abandon(handle);
                }
            }
        }
    }

    /// Async twin of [`join_all`](Self::join_all)
    pub async fn join_all_async(&mut self) {
        let PoolSettings {
            release_timeout,
            poll_interval,
            ..
        } = self.settings;

        for mut handle in std::mem::take(&mut self.running) {
            let finished = waiting_for_async(|| !handle.is_alive(), poll_interval, release_timeout)
                .await
                .is_ok();

            match finished.then(|| handle.join(Duration::ZERO)).flatten() {
                Some(output) => self.completed.push(output),
                None => {
                    warn!(
                        "Worker did not finish within {:?}, terminating",
                        release_timeout
                    );
                    self.abandon(handle);
                }
            }
        }
    }

    /// Forcibly stop every running worker. Their results may be lost.
    pub fn terminate_all(&mut self) {
        if !self.running.is_empty() {
            warn!("Terminating {} running workers", self.running.len());
        }
        for handle in &mut self.running {
            handle.terminate();
        }
    }
}

impl<U, H: WorkerHandle> Drop for WorkerPool<U, H> {
    fn drop(&mut self) {
        if !self.running.is_empty() {
            self.terminate_all();
        }
    }
}
