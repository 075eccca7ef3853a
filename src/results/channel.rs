//! Cross-boundary result channel
//!
//! Isolated workers serialize their per-suite outcome into a
//! [`PartialResultBundle`] and write it as one JSON line. The coordinator's
//! reader side wraps each line into an [`Envelope`] and publishes it on a
//! [`CrossBoundaryChannel`], which the aggregator drains once the pool is done.
//!
//! Line protocol on the worker's stdout:
//!
//! ```text
//! @seismograph:stop                 (optional, the worker requested a stop)
//! @seismograph:bundle {"suite":...} (exactly one per worker)
//! ```
//!
//! Any other line is ordinary output of the suite and is only logged.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use crate::models::{OutcomeDetail, TestStatus, UnitId};
use crate::results::{OutcomeSet, ResultState};

/// Marks the line carrying a serialized bundle
pub const BUNDLE_PREFIX: &str = "@seismograph:bundle ";

/// Marks a worker's request to stop the run
pub const STOP_MARKER: &str = "@seismograph:stop";

/// One serialized outcome: id plus detail, never the live unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEntry {
    pub id: UnitId,
    pub detail: OutcomeDetail,
}

/// Outcome of one suite as produced inside an isolated worker
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResultBundle {
    pub suite: String,
    pub successes: Vec<WireEntry>,
    pub skipped: Vec<WireEntry>,
    pub failures: Vec<WireEntry>,
    pub errors: Vec<WireEntry>,
    #[serde(default)]
    pub should_stop: bool,
}

impl PartialResultBundle {
    /// Pack a worker-local state
    pub fn from_state(suite: impl Into<String>, state: &ResultState) -> Self {
        Self {
            suite: suite.into(),
            successes: pack(state.successes()),
            skipped: pack(state.skipped()),
            failures: pack(state.failures()),
            errors: pack(state.errors()),
            should_stop: state.should_stop(),
        }
    }

    pub fn entries(&self, status: TestStatus) -> &[WireEntry] {
        match status {
            TestStatus::Pass => &self.successes,
            TestStatus::Skip => &self.skipped,
            TestStatus::Fail => &self.failures,
            TestStatus::Error => &self.errors,
        }
    }

    pub fn entry_count(&self) -> usize {
        TestStatus::all()
            .into_iter()
            .map(|status| self.entries(status).len())
            .sum()
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// Full protocol line, prefix included
    pub fn to_line(&self) -> serde_json::Result<String> {
        Ok(format!("{BUNDLE_PREFIX}{}", self.encode()?))
    }
}

fn pack(set: &OutcomeSet) -> Vec<WireEntry> {
    set.iter()
        .map(|(unit, detail)| WireEntry {
            id: unit.id.clone(),
            detail: detail.clone(),
        })
        .collect()
}

/// What the coordinator received for a dispatched suite
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Suite the coordinator dispatched, independent of the payload
    pub suite: String,
    /// Raw bundle, `None` if the worker exited without publishing one
    pub payload: Option<String>,
}

impl Envelope {
    pub fn bundle(suite: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            payload: Some(payload.into()),
        }
    }

    pub fn missing(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            payload: None,
        }
    }
}

/// Producer side, cloned into every reader
#[derive(Clone, Debug)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelPublisher {
    /// Hand an envelope over; never blocks
    pub fn publish(&self, envelope: Envelope) {
        if self.tx.send(envelope).is_err() {
            debug!("Result channel closed, dropping envelope");
        }
    }

    pub fn publish_bundle(&self, bundle: &PartialResultBundle) -> serde_json::Result<()> {
        self.publish(Envelope::bundle(bundle.suite.clone(), bundle.encode()?));
        Ok(())
    }
}

/// FIFO, multi-producer single-consumer queue of envelopes
#[derive(Debug)]
pub struct CrossBoundaryChannel {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl CrossBoundaryChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn publisher(&self) -> ChannelPublisher {
        ChannelPublisher {
            tx: self.tx.clone(),
        }
    }

    /// Take everything pending right now. Never blocks.
    pub fn drain_all(&mut self) -> Vec<Envelope> {
        let mut drained = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => drained.push(envelope),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        drained
    }
}

impl Default for CrossBoundaryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunnableUnit;
    use std::sync::Arc;

    #[test]
    fn test_drain_preserves_arrival_order() {
        let mut channel = CrossBoundaryChannel::new();
        let first = channel.publisher();
        let second = channel.publisher();

        second.publish(Envelope::bundle("b", "{}"));
        first.publish(Envelope::missing("a"));

        let drained = channel.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].suite, "b");
        assert_eq!(drained[1], Envelope::missing("a"));
        assert!(channel.drain_all().is_empty());
    }

    #[test]
    fn test_drain_on_empty_channel() {
        let mut channel = CrossBoundaryChannel::new();
        assert!(channel.drain_all().is_empty());
    }

    #[test]
    fn test_bundle_from_state() {
        let suite = RunnableUnit::suite("io");
        let mut state = ResultState::new();
        state.add_success(
            Arc::new(RunnableUnit::case(&suite.id, "read")),
            OutcomeDetail::new(3),
        );
        state.add_failure(
            Arc::new(RunnableUnit::case(&suite.id, "write")),
            OutcomeDetail::new(4).with_message("disk full"),
        );

        let bundle = PartialResultBundle::from_state("io", &state);
        assert_eq!(bundle.entry_count(), 2);
        assert_eq!(bundle.failures[0].id.as_str(), "io::write");

        let line = bundle.to_line().unwrap();
        let payload = line.strip_prefix(BUNDLE_PREFIX).unwrap();
        assert_eq!(PartialResultBundle::decode(payload).unwrap(), bundle);
    }

    #[test]
    fn test_missing_stop_field_defaults_to_false() {
        let payload = r#"{"suite":"s","successes":[],"skipped":[],"failures":[],"errors":[]}"#;
        let bundle = PartialResultBundle::decode(payload).unwrap();
        assert!(!bundle.should_stop);
    }
}
