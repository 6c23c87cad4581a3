//! `keel-events`: the event/aggregate mutation kernel.
//!
//! Events, the histories they form, the aggregate protocol that folds them
//! (create, trigger, collect, replay) and the registry that turns a stored
//! history back into a concrete aggregate.

pub mod aggregate;
pub mod envelope;
pub mod event;
pub mod registry;

pub use aggregate::{Aggregate, HistoryOf, Lifecycle, LifecycleOf, Sequenced};
pub use envelope::{AggregateEvent, StoredEvent};
pub use event::{Created, DomainEvent, Event};
pub use registry::{AggregateRegistry, AggregateType, DynAggregate};
