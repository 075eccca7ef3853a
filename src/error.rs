//! Coordination errors
//!
//! Test failures never show up here; they are recorded into the result state.
//! These errors abort a run.

use std::time::Duration;
use thiserror::Error;

use crate::models::UnitId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("worker pool has not released a slot within {} sec", .timeout.as_secs_f64())]
    PoolReleaseTimeout { timeout: Duration },

    #[error("worker reported unknown unit identity: {0}")]
    UnknownIdentity(UnitId),

    #[error("identity {0} is already registered to a different unit")]
    DuplicateIdentity(UnitId),

    #[error("failed to start worker for suite {suite}: {source}")]
    Spawn {
        suite: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl EngineError {
    /// Whether the error indicates a coordination bug rather than a slow or broken host
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownIdentity(_) | EngineError::DuplicateIdentity(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = EngineError::PoolReleaseTimeout {
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "worker pool has not released a slot within 1.5 sec"
        );
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn test_unknown_identity_is_contract_violation() {
        let err = EngineError::UnknownIdentity(UnitId::suite("ghost"));
        assert!(err.is_contract_violation());
    }
}
