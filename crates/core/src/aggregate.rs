//! Aggregate root read interface and the optimistic version check.

use chrono::{DateTime, Utc};

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal read interface.
///
/// Deliberately free of any mutation: state only changes by folding events,
/// which is the job of the event kernel (`keel-events`).
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of events applied so far.
    ///
    /// Starts at 1 (the creation event) and grows by exactly one per applied
    /// event; it never decreases and never skips.
    fn version(&self) -> u64;

    /// Timestamp of the most recently applied event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Optimistic concurrency expectation: the version an incoming event must carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExpectedVersion(u64);

impl ExpectedVersion {
    /// The first version of any aggregate (its creation event).
    pub const INITIAL: ExpectedVersion = ExpectedVersion(1);

    /// Expect the event that directly follows `current`.
    pub fn after(current: u64) -> Self {
        Self(current + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn matches(self, actual: u64) -> bool {
        self.0 == actual
    }

    /// Fails with [`DomainError::Concurrency`] carrying `(actual, expected)`.
    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::concurrency(actual, self.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn initial_is_one() {
        assert_eq!(ExpectedVersion::INITIAL.get(), 1);
        assert_eq!(ExpectedVersion::after(0), ExpectedVersion::INITIAL);
    }

    #[test]
    fn conflict_carries_actual_then_expected() {
        let err = ExpectedVersion::after(4).check(7).unwrap_err();
        assert_eq!(err, DomainError::Concurrency { actual: 7, expected: 5 });
        assert!(err.is_conflict());
    }

    proptest! {
        /// Only the immediate successor of the current version is accepted.
        #[test]
        fn accepts_exactly_the_next_version(current in 0u64..10_000, actual in 0u64..10_001) {
            let result = ExpectedVersion::after(current).check(actual);
            prop_assert_eq!(result.is_ok(), actual == current + 1);
        }
    }
}
