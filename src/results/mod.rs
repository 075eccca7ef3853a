//! Result state, identity and aggregation
//!
//! Everything the backends mutate while a run is in flight, plus the run
//! summary and its on-disk storage.

mod aggregator;
mod channel;
mod registry;
mod report;
mod state;
pub mod storage;

pub use aggregator::ResultAggregator;
pub use channel::{
    ChannelPublisher, CrossBoundaryChannel, Envelope, PartialResultBundle, WireEntry,
    BUNDLE_PREFIX, STOP_MARKER,
};
pub use registry::IdentityRegistry;
pub use report::RunSummary;
pub use state::{OutcomeSet, ResultProxy, ResultState, StopFlag};
pub use storage::{generate_run_id, ResultsStorage, RunInfo};
