//! Domain error model.

use thiserror::Error;

/// Result type used across the kernel.
pub type DomainResult<T> = Result<T, DomainError>;

/// Kernel-level error.
///
/// Every variant is deterministic: the operation that produced it left the
/// aggregate untouched. Business-rule failures of concrete aggregates live in
/// their own crates and wrap this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The mutation target is not a valid aggregate for the event
    /// (foreign aggregate id, malformed history).
    #[error("not an aggregate: {0}")]
    NotAggregate(String),

    /// The event does not extend the target's current version by exactly one.
    #[error("version conflict: event version {actual}, expected {expected}")]
    Concurrency { actual: u64, expected: u64 },

    /// A topic could not be mapped to an aggregate type.
    #[error("cannot resolve topic `{topic}`: {reason}")]
    Resolution { topic: String, reason: String },

    /// An erased payload could not be converted to or from its concrete type.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn not_aggregate(msg: impl Into<String>) -> Self {
        Self::NotAggregate(msg.into())
    }

    pub fn concurrency(actual: u64, expected: u64) -> Self {
        Self::Concurrency { actual, expected }
    }

    pub fn resolution(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// True for optimistic concurrency conflicts (reload and retry).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Concurrency { .. })
    }
}
