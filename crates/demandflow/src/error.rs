//! Error types for demandflow pipelines.

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Shared, cloneable cause of an upstream failure.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors that can terminate a subscription.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// A source, operator or consumer callback failed.
    #[error("upstream failure: {0}")]
    Upstream(Cause),

    /// One or more failures captured by an error-deferring combinator,
    /// raised after every source reached a terminal state.
    #[error("{} deferred failure(s): [{}]", .0.len(), join_causes(.0))]
    Aggregate(Vec<FlowError>),

    /// A producer emitted beyond granted demand and watermark, or an
    /// adapter observed more items than it requested.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The subscription was cancelled by its consumer.
    ///
    /// Producers see this from `Emitter::emit`; it is never delivered to a
    /// subscriber's `on_error`.
    #[error("subscription cancelled")]
    Cancelled,
}

fn join_causes(errors: &[FlowError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl FlowError {
    /// Wraps any error (or message) as an upstream failure.
    pub fn upstream<E>(cause: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = cause.into();
        Self::Upstream(Arc::from(boxed))
    }

    /// Returns `true` if this is an aggregate of deferred failures.
    #[inline]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate(_))
    }

    /// Returns `true` if this signals cancellation rather than failure.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` for implementation bugs that are never recovered.
    #[inline]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }

    /// Returns the deferred causes of an aggregate, or `self` alone.
    pub fn causes(&self) -> &[FlowError] {
        match self {
            Self::Aggregate(causes) => causes,
            other => std::slice::from_ref(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_from_message() {
        let err = FlowError::upstream("index error");
        assert_eq!(err.to_string(), "upstream failure: index error");
        assert!(!err.is_aggregate());
        assert_eq!(err.causes().len(), 1);
    }

    #[test]
    fn test_aggregate_lists_causes() {
        let err = FlowError::Aggregate(vec![FlowError::upstream("a"), FlowError::upstream("b")]);
        assert!(err.is_aggregate());
        assert_eq!(err.causes().len(), 2);
        assert_eq!(
            err.to_string(),
            "2 deferred failure(s): [upstream failure: a; upstream failure: b]"
        );
    }
}
