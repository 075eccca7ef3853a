//! Run-wide result state
//!
//! [`ResultState`] holds the four outcome containers, the cooperative stop
//! flag and the per-suite proxies merged back from isolated workers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{OutcomeDetail, RunnableUnit, TestStatus, UnitId, UnitResult};

/// Cooperative stop request shared by every worker of a run
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self) {
        self.store(true);
    }

    pub fn store(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }

    /// Whether both flags point at the same shared value
    pub fn same_as(&self, other: &StopFlag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for StopFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StopFlag").field(&self.is_set()).finish()
    }
}

/// Ordered container of `(unit, detail)` pairs with unique membership on insert
#[derive(Clone, Debug, Default)]
pub struct OutcomeSet {
    entries: Vec<(Arc<RunnableUnit>, OutcomeDetail)>,
    members: HashSet<UnitId>,
}

impl OutcomeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the unit is already a member
    pub fn insert(&mut self, unit: Arc<RunnableUnit>, detail: OutcomeDetail) -> bool {
        if !self.members.insert(unit.id.clone()) {
            return false;
        }
        self.entries.push((unit, detail));
        true
    }

    /// Append entries verbatim. Merge path: duplicates are kept.
    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (Arc<RunnableUnit>, OutcomeDetail)>,
    {
        for (unit, detail) in entries {
            self.members.insert(unit.id.clone());
            self.entries.push((unit, detail));
        }
    }

    pub fn contains(&self, id: &UnitId) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Arc<RunnableUnit>, OutcomeDetail)> {
        self.entries.iter()
    }

    pub fn get(&self, id: &UnitId) -> Option<&(Arc<RunnableUnit>, OutcomeDetail)> {
        self.entries.iter().find(|(unit, _)| &unit.id == id)
    }
}

impl<'a> IntoIterator for &'a OutcomeSet {
    type Item = &'a (Arc<RunnableUnit>, OutcomeDetail);
    type IntoIter = std::slice::Iter<'a, (Arc<RunnableUnit>, OutcomeDetail)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Shared, incrementally built result of a run
#[derive(Debug, Default)]
pub struct ResultState {
    successes: OutcomeSet,
    skipped: OutcomeSet,
    failures: OutcomeSet,
    errors: OutcomeSet,
    stop: StopFlag,
    fail_fast: bool,
    proxies: Vec<ResultProxy>,
    fatal: Option<String>,
}

impl ResultState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the run at the first failure or error
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Share an externally owned stop flag
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Child state scoped to one suite; it shares this state's stop flag
    pub fn proxy(&self, name: impl Into<String>) -> ResultProxy {
        ResultProxy {
            name: name.into(),
            state: ResultState::new()
                .with_fail_fast(self.fail_fast)
                .with_stop_flag(self.stop.clone()),
        }
    }

    pub fn add_success(&mut self, unit: Arc<RunnableUnit>, detail: OutcomeDetail) -> bool {
        self.add(TestStatus::Pass, unit, detail)
    }

    pub fn add_skip(&mut self, unit: Arc<RunnableUnit>, detail: OutcomeDetail) -> bool {
        self.add(TestStatus::Skip, unit, detail)
    }

    pub fn add_failure(&mut self, unit: Arc<RunnableUnit>, detail: OutcomeDetail) -> bool {
        self.add(TestStatus::Fail, unit, detail)
    }

    pub fn add_error(&mut self, unit: Arc<RunnableUnit>, detail: OutcomeDetail) -> bool {
        self.add(TestStatus::Error, unit, detail)
    }

    /// Record an outcome; refused when the unit already has one
    pub fn add(&mut self, status: TestStatus, unit: Arc<RunnableUnit>, detail: OutcomeDetail) -> bool {
        if let Some(existing) = self.status_of(&unit.id) {
            warn!(
                "Ignoring {} outcome for {}: already recorded as {}",
                status, unit.id, existing
            );
            return false;
        }

        debug!("{} {}", status, unit.id);
        let inserted = self.container_mut(status).insert(unit, detail);

        if inserted && self.fail_fast && status.is_problem() {
            self.stop.set();
        }
        inserted
    }

    pub fn status_of(&self, id: &UnitId) -> Option<TestStatus> {
        TestStatus::all()
            .into_iter()
            .find(|status| self.container(*status).contains(id))
    }

    pub fn container(&self, status: TestStatus) -> &OutcomeSet {
        match status {
            TestStatus::Pass => &self.successes,
            TestStatus::Skip => &self.skipped,
            TestStatus::Fail => &self.failures,
            TestStatus::Error => &self.errors,
        }
    }

    fn container_mut(&mut self, status: TestStatus) -> &mut OutcomeSet {
        match status {
            TestStatus::Pass => &mut self.successes,
            TestStatus::Skip => &mut self.skipped,
            TestStatus::Fail => &mut self.failures,
            TestStatus::Error => &mut self.errors,
        }
    }

    pub fn successes(&self) -> &OutcomeSet {
        &self.successes
    }

    pub fn skipped(&self) -> &OutcomeSet {
        &self.skipped
    }

    pub fn failures(&self) -> &OutcomeSet {
        &self.failures
    }

    pub fn errors(&self) -> &OutcomeSet {
        &self.errors
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_set()
    }

    pub fn set_should_stop(&self, value: bool) {
        self.stop.store(value);
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn proxies(&self) -> &[ResultProxy] {
        &self.proxies
    }

    pub fn push_proxy(&mut self, proxy: ResultProxy) {
        self.proxies.push(proxy);
    }

    /// Fold another state's containers into this one, verbatim
    pub fn extend(&mut self, other: &ResultState) {
        for status in TestStatus::all() {
            let entries = other.container(status).iter().cloned();
            self.container_mut(status).extend(entries);
        }

        if self.fail_fast && !other.was_success() {
            self.stop.set();
        }
    }

    /// Mark the run as aborted by a coordination failure
    pub fn record_fatal(&mut self, message: impl Into<String>) {
        self.fatal = Some(message.into());
    }

    pub fn fatal(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    pub fn total(&self) -> usize {
        TestStatus::all()
            .into_iter()
            .map(|status| self.container(status).len())
            .sum()
    }

    /// No failures, no errors and no fatal coordination error
    pub fn was_success(&self) -> bool {
        self.failures.is_empty() && self.errors.is_empty() && self.fatal.is_none()
    }

    /// Ids that occur more than once across the four containers
    pub fn check_exclusive(&self) -> Vec<UnitId> {
        let mut seen: HashMap<&UnitId, usize> = HashMap::new();
        for status in TestStatus::all() {
            for (unit, _) in self.container(status) {
                *seen.entry(&unit.id).or_default() += 1;
            }
        }

        let mut violations: Vec<UnitId> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, _)| id.clone())
            .collect();
        violations.sort();
        violations
    }

    /// Every recorded outcome, flattened for reporting
    pub fn unit_results(&self) -> Vec<UnitResult> {
        TestStatus::all()
            .into_iter()
            .flat_map(|status| {
                self.container(status)
                    .iter()
                    .map(move |(unit, detail)| UnitResult::new(unit, status, detail))
            })
            .collect()
    }
}

/// Partial result of one suite that ran in an isolated worker
#[derive(Debug)]
pub struct ResultProxy {
    name: String,
    state: ResultState,
}

impl ResultProxy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &ResultState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ResultState {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str) -> Arc<RunnableUnit> {
        Arc::new(RunnableUnit::case(&UnitId::suite("s"), name))
    }

    #[test]
    fn test_unit_lands_in_one_container() {
        let mut state = ResultState::new();
        let a = unit("a");

        assert!(state.add_success(a.clone(), OutcomeDetail::new(1)));
        assert!(!state.add_failure(a.clone(), OutcomeDetail::new(1)));
        assert!(!state.add_success(a.clone(), OutcomeDetail::new(1)));

        assert_eq!(state.successes().len(), 1);
        assert!(state.failures().is_empty());
        assert_eq!(state.status_of(&a.id), Some(TestStatus::Pass));
        assert!(state.check_exclusive().is_empty());
    }

    #[test]
    fn test_was_success() {
        let mut state = ResultState::new();
        state.add_success(unit("a"), OutcomeDetail::default());
        state.add_skip(unit("b"), OutcomeDetail::default());
        assert!(state.was_success());

        state.add_error(unit("c"), OutcomeDetail::default());
        assert!(!state.was_success());
    }

    #[test]
    fn test_fatal_makes_run_unsuccessful() {
        let mut state = ResultState::new();
        state.record_fatal("pool stuck");
        assert!(!state.was_success());
        assert_eq!(state.fatal(), Some("pool stuck"));
    }

    #[test]
    fn test_fail_fast_sets_stop() {
        let mut state = ResultState::new().with_fail_fast(true);
        state.add_success(unit("a"), OutcomeDetail::default());
        assert!(!state.should_stop());
        state.add_failure(unit("b"), OutcomeDetail::default());
        assert!(state.should_stop());
    }

    #[test]
    fn test_proxy_shares_stop_flag() {
        let state = ResultState::new();
        let proxy = state.proxy("suite");
        assert!(proxy.state().stop_flag().same_as(state.stop_flag()));

        proxy.state().set_should_stop(true);
        assert!(state.should_stop());
    }

    #[test]
    fn test_extend_keeps_duplicates() {
        let mut child = ResultState::new();
        child.add_success(unit("a"), OutcomeDetail::default());

        let mut parent = ResultState::new();
        parent.extend(&child);
        parent.extend(&child);

        assert_eq!(parent.successes().len(), 2);
        assert_eq!(parent.check_exclusive(), vec![UnitId::from("s::a")]);
    }

    #[test]
    fn test_unit_results_cover_all_containers() {
        let mut state = ResultState::new();
        state.add_success(unit("a"), OutcomeDetail::default());
        state.add_failure(unit("b"), OutcomeDetail::default().with_message("bad"));
        state.add_skip(unit("c"), OutcomeDetail::default());

        let results = state.unit_results();
        assert_eq!(results.len(), 3);
        assert_eq!(state.total(), 3);
        assert!(results
            .iter()
            .any(|r| r.status == TestStatus::Fail && r.message.as_deref() == Some("bad")));
    }
}
