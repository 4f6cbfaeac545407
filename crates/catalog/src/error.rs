//! Error types for the catalog service.

use demandflow::FlowError;
use std::fmt;
use thiserror::Error;

/// Which entity a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Series,
    Episode,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Series => f.write_str("series"),
            Self::Episode => f.write_str("episode"),
        }
    }
}

/// Failures reported by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A save would break name uniqueness.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The backend does not know the owner of a secondary lookup.
    #[error("no entries owned by {0}")]
    OwnerNotFound(String),
    /// A snapshot file could not be read or parsed.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl StoreError {
    /// Returns the store error carried by a pipeline failure, if any.
    pub fn from_flow(error: &FlowError) -> Option<&StoreError> {
        match error {
            FlowError::Upstream(cause) => cause.downcast_ref::<StoreError>(),
            _ => None,
        }
    }
}

/// How an outer HTTP or CLI layer should present an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    NotFound,
    Failure,
}

/// Errors returned by catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No entity with this natural key exists.
    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A lookup pipeline failed (including aggregated deferred failures).
    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl CatalogError {
    pub(crate) fn not_found(kind: EntityKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Returns `true` for a missing entity.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// NotFound maps to a not-found response; everything else, aggregates
    /// included, maps to a generic failure.
    pub fn response_class(&self) -> ResponseClass {
        if self.is_not_found() {
            ResponseClass::NotFound
        } else {
            ResponseClass::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_and_class() {
        let err = CatalogError::not_found(EntityKind::Series, "Ghost");
        assert_eq!(err.to_string(), "series not found: Ghost");
        assert_eq!(err.response_class(), ResponseClass::NotFound);
    }

    #[test]
    fn test_aggregate_is_generic_failure() {
        let err = CatalogError::from(FlowError::Aggregate(vec![FlowError::upstream("x")]));
        assert!(!err.is_not_found());
        assert_eq!(err.response_class(), ResponseClass::Failure);
    }

    #[test]
    fn test_store_error_recovered_from_flow() {
        let flow = FlowError::upstream(StoreError::OwnerNotFound("Known".into()));
        assert_eq!(
            StoreError::from_flow(&flow),
            Some(&StoreError::OwnerNotFound("Known".into()))
        );
        assert_eq!(StoreError::from_flow(&FlowError::Cancelled), None);
    }
}
