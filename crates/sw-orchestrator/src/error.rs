//! Flow error taxonomy.

use thiserror::Error;

/// Ways a flow attempt can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// No connection is registered for the pair, or it is disabled.
    /// Never retried: the route will not appear between attempts.
    #[error("no enabled connection for this pair")]
    ConnectionUnavailable,

    /// A transformation rule rejected the payload.
    #[error("transformation failed: {0}")]
    Transformation(String),

    /// The target system is missing, disabled, or refused delivery.
    #[error("target unreachable: {0}")]
    TargetUnreachable(String),

    /// Delivery did not finish within the flow's timeout.
    #[error("flow timed out")]
    Timeout,
}

impl FlowError {
    /// Whether the flow should be retried (up to its retry budget).
    #[must_use]
    pub fn retryable(&self) -> bool {
        !matches!(self, Self::ConnectionUnavailable)
    }
}
