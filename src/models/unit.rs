//! Runnable unit identity
//!
//! Every suite and case carries a [`RunnableUnit`] with a stable [`UnitId`].
//! Ids are derived from names, so a suite rebuilt inside a worker process
//! produces the same ids as the coordinator's copy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the suite and case part of a case id
pub const ID_SEPARATOR: &str = "::";

/// Stable identifier of a suite or case
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Id of a top-level suite
    pub fn suite(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Id of a case owned by `suite`
    pub fn case(suite: &UnitId, name: &str) -> Self {
        Self(format!("{}{ID_SEPARATOR}{name}", suite.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id names a case rather than a suite
    pub fn is_case(&self) -> bool {
        self.0.contains(ID_SEPARATOR)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A suite or case the engine can dispatch
#[derive(Debug, PartialEq, Eq)]
pub struct RunnableUnit {
    pub id: UnitId,
    pub name: String,
    /// Owning suite, `None` for top-level suites
    pub owner: Option<UnitId>,
}

impl RunnableUnit {
    pub fn suite(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: UnitId::suite(&name),
            name,
            owner: None,
        }
    }

    pub fn case(owner: &UnitId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: UnitId::case(owner, &name),
            name,
            owner: Some(owner.clone()),
        }
    }

    pub fn is_suite(&self) -> bool {
        self.owner.is_none()
    }
}

impl fmt::Display for RunnableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_id_is_derived_from_suite() {
        let suite = RunnableUnit::suite("network");
        let case = RunnableUnit::case(&suite.id, "connect");

        assert_eq!(case.id.as_str(), "network::connect");
        assert_eq!(case.owner.as_ref(), Some(&suite.id));
        assert!(case.id.is_case());
        assert!(!suite.id.is_case());
    }

    #[test]
    fn test_ids_are_stable_across_constructions() {
        let a = RunnableUnit::case(&UnitId::suite("s"), "c");
        let b = RunnableUnit::case(&UnitId::suite("s"), "c");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_unit_id_serializes_as_string() {
        let id = UnitId::case(&UnitId::suite("s"), "c");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s::c\"");
    }
}
