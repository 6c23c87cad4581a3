//! `keel-core`: kernel building blocks shared by every aggregate.
//!
//! Pure domain primitives: identifiers, the error model, the optimistic
//! version check and topic naming. No IO, no storage.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod topic;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
pub use topic::{Topic, TopicRegistry, Topical, topic_of};
pub use value_object::ValueObject;
