//! Identity registry
//!
//! Maps stable unit ids back to the coordinator's original [`RunnableUnit`]
//! instances. Populated before any worker starts, read during merge.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::EngineError;
use crate::models::{RunnableUnit, Suite, UnitId};

#[derive(Debug, Default)]
pub struct IdentityRegistry {
    units: HashMap<UnitId, Arc<RunnableUnit>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a suite and every case it owns, returning the suite's id
    pub fn register(&mut self, suite: &Suite) -> Result<UnitId, EngineError> {
        self.register_unit(suite.unit())?;
        for case in suite {
            self.register_unit(case.unit())?;
        }

        debug!("Registered suite {} with {} cases", suite.id(), suite.len());
        Ok(suite.id().clone())
    }

    /// Record a single unit. Registering the same instance twice is a no-op.
    pub fn register_unit(&mut self, unit: &Arc<RunnableUnit>) -> Result<(), EngineError> {
        match self.units.get(&unit.id) {
            Some(existing) if Arc::ptr_eq(existing, unit) => Ok(()),
            Some(_) => Err(EngineError::DuplicateIdentity(unit.id.clone())),
            None => {
                self.units.insert(unit.id.clone(), unit.clone());
                Ok(())
            }
        }
    }

    /// Resolve an id to the original unit
    pub fn resolve(&self, id: &UnitId) -> Result<Arc<RunnableUnit>, EngineError> {
        self.units
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownIdentity(id.clone()))
    }

    pub fn contains(&self, id: &UnitId) -> bool {
        self.units.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(name: &str) -> Suite {
        Suite::new(name)
            .with_case("one", |_| Ok(()))
            .with_case("two", |_| Ok(()))
    }

    #[test]
    fn test_register_records_nested_cases() {
        let suite = suite("alpha");
        let mut registry = IdentityRegistry::new();

        let id = registry.register(&suite).unwrap();
        assert_eq!(id, *suite.id());
        assert_eq!(registry.len(), 3);

        let resolved = registry.resolve(&UnitId::from("alpha::two")).unwrap();
        assert!(Arc::ptr_eq(&resolved, suite.cases()[1].unit()));
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = IdentityRegistry::new();
        let err = registry.resolve(&UnitId::from("nope")).unwrap_err();
        assert!(matches!(err, EngineError::UnknownIdentity(id) if id.as_str() == "nope"));
    }

    #[test]
    fn test_register_is_idempotent_for_same_instance() {
        let suite = suite("alpha");
        let mut registry = IdentityRegistry::new();
        registry.register(&suite).unwrap();
        registry.register(&suite.clone()).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_register_rejects_colliding_ids() {
        let mut registry = IdentityRegistry::new();
        registry.register(&suite("alpha")).unwrap();

        let err = registry.register(&suite("alpha")).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateIdentity(_)));
    }
}
