//! Suites and cases
//!
//! A [`Suite`] is an ordered collection of [`Case`]s. Cases are plain closures,
//! either blocking or async, so a suite can be cloned cheaply into worker
//! threads and rebuilt from the same source inside a worker process.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::extensions::{ExtensionError, ExtensionRegistry};
use crate::models::{RunnableUnit, UnitId};
use crate::results::StopFlag;

/// What a case body reports back when it does not pass
#[derive(Debug, Error)]
pub enum CaseError {
    #[error("{0}")]
    Failed(String),

    #[error("skipped: {0}")]
    Skipped(String),

    #[error(transparent)]
    Error(#[from] anyhow::Error),
}

impl CaseError {
    pub fn failed(message: impl Into<String>) -> Self {
        CaseError::Failed(message.into())
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        CaseError::Skipped(reason.into())
    }
}

impl From<ExtensionError> for CaseError {
    fn from(e: ExtensionError) -> Self {
        CaseError::Error(e.into())
    }
}

pub type CaseResult = Result<(), CaseError>;

type BlockingBody = dyn Fn(&CaseContext) -> CaseResult + Send + Sync;
type AsyncBody = dyn Fn(CaseContext) -> BoxFuture<'static, CaseResult> + Send + Sync;

/// Executable part of a case
#[derive(Clone)]
pub enum CaseBody {
    Blocking(Arc<BlockingBody>),
    Async(Arc<AsyncBody>),
}

impl CaseBody {
    pub fn is_async(&self) -> bool {
        matches!(self, CaseBody::Async(_))
    }
}

/// Handle a running case gets to the rest of the run
#[derive(Clone)]
pub struct CaseContext {
    unit: Arc<RunnableUnit>,
    stop: StopFlag,
    extensions: Arc<ExtensionRegistry>,
}

impl CaseContext {
    pub fn new(unit: Arc<RunnableUnit>, stop: StopFlag, extensions: Arc<ExtensionRegistry>) -> Self {
        Self {
            unit,
            stop,
            extensions,
        }
    }

    pub fn unit(&self) -> &Arc<RunnableUnit> {
        &self.unit
    }

    pub fn name(&self) -> &str {
        &self.unit.name
    }

    /// Ask every backend to stop starting new work
    pub fn request_stop(&self) {
        self.stop.set();
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_set()
    }

    /// Look up a shared extension by name
    pub fn ext<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ExtensionError> {
        self.extensions.get::<T>(name)
    }
}

impl fmt::Debug for CaseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseContext")
            .field("unit", &self.unit.id)
            .field("should_stop", &self.stop.is_set())
            .finish()
    }
}

/// Smallest executable test unit
#[derive(Clone)]
pub struct Case {
    unit: Arc<RunnableUnit>,
    body: CaseBody,
}

impl Case {
    pub fn unit(&self) -> &Arc<RunnableUnit> {
        &self.unit
    }

    pub fn id(&self) -> &UnitId {
        &self.unit.id
    }

    pub fn name(&self) -> &str {
        &self.unit.name
    }

    pub fn body(&self) -> &CaseBody {
        &self.body
    }
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("id", &self.unit.id)
            .field("async", &self.body.is_async())
            .finish()
    }
}

/// Ordered collection of cases
#[derive(Clone, Debug)]
pub struct Suite {
    unit: Arc<RunnableUnit>,
    cases: Vec<Case>,
    skip: Option<String>,
    requires: Vec<String>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            unit: Arc::new(RunnableUnit::suite(name)),
            cases: Vec::new(),
            skip: None,
            requires: Vec::new(),
        }
    }

    /// Append a blocking case
    pub fn with_case<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&CaseContext) -> CaseResult + Send + Sync + 'static,
    {
        self.push(name, CaseBody::Blocking(Arc::new(body)));
        self
    }

    /// Append an async case; it suspends only at its own await points
    pub fn with_async_case<F, Fut>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(CaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CaseResult> + Send + 'static,
    {
        let body = move |ctx: CaseContext| body(ctx).boxed();
        self.push(name, CaseBody::Async(Arc::new(body)));
        self
    }

    /// Mark the whole suite as skipped
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    /// Require a shared extension to be installed before the suite runs
    pub fn require(mut self, extension: impl Into<String>) -> Self {
        self.requires.push(extension.into());
        self
    }

    fn push(&mut self, name: impl Into<String>, body: CaseBody) {
        let unit = Arc::new(RunnableUnit::case(&self.unit.id, name));
        self.cases.push(Case { unit, body });
    }

    pub fn unit(&self) -> &Arc<RunnableUnit> {
        &self.unit
    }

    pub fn id(&self) -> &UnitId {
        &self.unit.id
    }

    pub fn name(&self) -> &str {
        &self.unit.name
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip.as_deref()
    }

    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl<'a> IntoIterator for &'a Suite {
    type Item = &'a Case;
    type IntoIter = std::slice::Iter<'a, Case>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_builder_keeps_case_order() {
        let suite = Suite::new("math")
            .with_case("add", |_| Ok(()))
            .with_async_case("slow_add", |_| async { Ok(()) })
            .with_case("sub", |_| Ok(()));

        let names: Vec<_> = suite.cases().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["add", "slow_add", "sub"]);
        assert!(suite.cases()[1].body().is_async());
        assert_eq!(suite.cases()[0].id().as_str(), "math::add");
    }

    #[test]
    fn test_cloned_suite_shares_units() {
        let suite = Suite::new("s").with_case("c", |_| Ok(()));
        let copy = suite.clone();
        assert!(Arc::ptr_eq(suite.unit(), copy.unit()));
        assert!(Arc::ptr_eq(suite.cases()[0].unit(), copy.cases()[0].unit()));
    }

    #[test]
    fn test_case_context_requests_stop() {
        let stop = StopFlag::default();
        let ctx = CaseContext::new(
            Arc::new(RunnableUnit::suite("s")),
            stop.clone(),
            Arc::new(ExtensionRegistry::new()),
        );
        assert!(!ctx.should_stop());
        ctx.request_stop();
        assert!(stop.is_set());
    }

    #[test]
    fn test_anyhow_errors_convert() {
        fn body() -> CaseResult {
            Err::<(), _>(anyhow::anyhow!("boom"))?;
            Ok(())
        }
        assert!(matches!(body(), Err(CaseError::Error(_))));
    }
}
