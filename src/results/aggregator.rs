//! Result aggregation
//!
//! Turns drained bundles back into per-suite proxies attached to the
//! coordinator's original units, and folds them into the run-wide state.

use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::models::{OutcomeDetail, TestStatus, UnitId};
use crate::results::{
    CrossBoundaryChannel, Envelope, IdentityRegistry, PartialResultBundle, ResultProxy,
    ResultState,
};

/// Single consumer of the result channel
pub struct ResultAggregator<'r> {
    registry: &'r IdentityRegistry,
}

impl<'r> ResultAggregator<'r> {
    pub fn new(registry: &'r IdentityRegistry) -> Self {
        Self { registry }
    }

    /// Merge one bundle. Every id is resolved before `state` is touched.
    ///
    /// Not idempotent: merging the same bundle twice duplicates its entries.
    pub fn merge(
        &self,
        state: &mut ResultState,
        bundle: &PartialResultBundle,
    ) -> Result<(), EngineError> {
        let mut proxy = state.proxy(bundle.suite.as_str());

        for status in TestStatus::all() {
            for entry in bundle.entries(status) {
                let unit = self.registry.resolve(&entry.id)?;
                proxy.state_mut().add(status, unit, entry.detail.clone());
            }
        }

        if bundle.should_stop {
            state.set_should_stop(true);
        }

        debug!(
            "Merged bundle for suite {} ({} entries)",
            bundle.suite,
            bundle.entry_count()
        );
        Self::attach(state, proxy);
        Ok(())
    }

    /// Merge a raw envelope; corruption is recorded against its suite
    pub fn merge_envelope(
        &self,
        state: &mut ResultState,
        envelope: Envelope,
    ) -> Result<(), EngineError> {
        let Some(payload) = envelope.payload else {
            return self.record_corruption(
                state,
                &envelope.suite,
                "worker exited without publishing a result bundle",
            );
        };

        match PartialResultBundle::decode(&payload) {
            Ok(bundle) => {
                if bundle.suite != envelope.suite {
                    warn!(
                        "Bundle names suite {} but was published for {}",
                        bundle.suite, envelope.suite
                    );
                }
                self.merge(state, &bundle)
            }
            Err(e) => self.record_corruption(
                state,
                &envelope.suite,
                &format!("malformed result bundle: {e}"),
            ),
        }
    }

    fn record_corruption(
        &self,
        state: &mut ResultState,
        suite: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        warn!("Suite {}: {}", suite, message);

        let unit = self.registry.resolve(&UnitId::suite(suite))?;
        let mut proxy = state.proxy(suite);
        proxy
            .state_mut()
            .add_error(unit, OutcomeDetail::default().with_message(message));

        Self::attach(state, proxy);
        Ok(())
    }

    /// Drain the channel and merge every envelope exactly once
    pub fn sync(
        &self,
        state: &mut ResultState,
        channel: &mut CrossBoundaryChannel,
    ) -> Result<usize, EngineError> {
        let envelopes = channel.drain_all();
        let count = envelopes.len();

        for envelope in envelopes {
            self.merge_envelope(state, envelope)?;
        }

        info!("Merged {} partial results", count);
        Ok(count)
    }

    /// In-process merge for backends that share memory: no proxy is kept
    pub fn merge_local(state: &mut ResultState, proxy: ResultProxy) {
        debug!("Folding in-process result of suite {}", proxy.name());
        state.extend(proxy.state());
    }

    fn attach(state: &mut ResultState, proxy: ResultProxy) {
        state.extend(proxy.state());
        state.push_proxy(proxy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Suite;
    use crate::results::WireEntry;
    use std::sync::Arc;

    fn suite(name: &str) -> Suite {
        Suite::new(name)
            .with_case("ok", |_| Ok(()))
            .with_case("bad", |_| Ok(()))
    }

    fn bundle(name: &str) -> PartialResultBundle {
        PartialResultBundle {
            suite: name.to_string(),
            successes: vec![WireEntry {
                id: UnitId::from(format!("{name}::ok").as_str()),
                detail: OutcomeDetail::new(1),
            }],
            failures: vec![WireEntry {
                id: UnitId::from(format!("{name}::bad").as_str()),
                detail: OutcomeDetail::new(2).with_message("assertion failed"),
            }],
            ..Default::default()
        }
    }

    fn registry_for(suites: &[Suite]) -> IdentityRegistry {
        let mut registry = IdentityRegistry::new();
        for suite in suites {
            registry.register(suite).unwrap();
        }
        registry
    }

    #[test]
    fn test_merge_reattaches_original_units() {
        let suites = [suite("alpha")];
        let registry = registry_for(&suites);
        let aggregator = ResultAggregator::new(&registry);
        let mut state = ResultState::new();

        aggregator.merge(&mut state, &bundle("alpha")).unwrap();

        assert_eq!(state.successes().len(), 1);
        assert_eq!(state.failures().len(), 1);
        assert_eq!(state.proxies().len(), 1);
        assert_eq!(state.proxies()[0].name(), "alpha");

        let (unit, _) = state.successes().iter().next().unwrap();
        assert!(Arc::ptr_eq(unit, suites[0].cases()[0].unit()));
    }

    #[test]
    fn test_double_merge_duplicates_entries() {
        let suites = [suite("alpha")];
        let registry = registry_for(&suites);
        let aggregator = ResultAggregator::new(&registry);
        let b = bundle("alpha");

        let mut once = ResultState::new();
        aggregator.merge(&mut once, &b).unwrap();

        let mut twice = ResultState::new();
        aggregator.merge(&mut twice, &b).unwrap();
        aggregator.merge(&mut twice, &b).unwrap();

        assert_eq!(once.total(), 2);
        assert_eq!(twice.total(), 4);
        assert_eq!(twice.proxies().len(), 2);
        assert!(once.check_exclusive().is_empty());
        assert_eq!(twice.check_exclusive().len(), 2);
    }

    #[test]
    fn test_unknown_identity_is_fatal_and_leaves_state_untouched() {
        let registry = registry_for(&[suite("alpha")]);
        let aggregator = ResultAggregator::new(&registry);
        let mut state = ResultState::new();

        let err = aggregator.merge(&mut state, &bundle("ghost")).unwrap_err();
        assert!(matches!(err, EngineError::UnknownIdentity(_)));
        assert_eq!(state.total(), 0);
        assert!(state.proxies().is_empty());
    }

    #[test]
    fn test_corrupted_bundle_becomes_suite_error() {
        let suites = [suite("alpha"), suite("beta")];
        let registry = registry_for(&suites);
        let aggregator = ResultAggregator::new(&registry);
        let mut channel = CrossBoundaryChannel::new();
        let publisher = channel.publisher();

        publisher.publish(Envelope::bundle("alpha", "{not json"));
        publisher.publish_bundle(&bundle("beta")).unwrap();
        publisher.publish(Envelope::missing("alpha"));

        let mut state = ResultState::new();
        let merged = aggregator.sync(&mut state, &mut channel).unwrap();

        assert_eq!(merged, 3);
        assert_eq!(state.successes().len(), 1);
        assert_eq!(state.failures().len(), 1);
        assert_eq!(state.errors().len(), 2);
        let (unit, detail) = state.errors().iter().next().unwrap();
        assert!(Arc::ptr_eq(unit, suites[0].unit()));
        assert!(detail
            .message
            .as_deref()
            .unwrap()
            .starts_with("malformed result bundle"));
    }

    #[test]
    fn test_stop_request_in_bundle_reaches_state() {
        let registry = registry_for(&[suite("alpha")]);
        let aggregator = ResultAggregator::new(&registry);
        let mut state = ResultState::new();

        let mut b = bundle("alpha");
        b.should_stop = true;
        aggregator.merge(&mut state, &b).unwrap();
        assert!(state.should_stop());
    }

    #[test]
    fn test_merge_local_keeps_no_proxy() {
        let mut state = ResultState::new();
        let s = suite("alpha");
        let mut proxy = state.proxy("alpha");
        proxy
            .state_mut()
            .add_success(s.cases()[0].unit().clone(), OutcomeDetail::default());

        ResultAggregator::merge_local(&mut state, proxy);
        assert_eq!(state.successes().len(), 1);
        assert!(state.proxies().is_empty());
    }
}
