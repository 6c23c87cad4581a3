//! Aggregate-type registry: topic → concrete aggregate type.
//!
//! Built once at process start by registering every aggregate type the
//! process may need to rebuild. Afterwards a store can turn a stored history
//! back into a live aggregate knowing nothing but the topic carried by its
//! creation event.

use std::any::{Any, TypeId};

use serde::de::DeserializeOwned;

use keel_core::{AggregateId, AggregateRoot, DomainError, DomainResult, TopicRegistry};

use crate::aggregate::Aggregate;
use crate::envelope::{AggregateEvent, StoredEvent};

type Rebuild = fn(&[StoredEvent]) -> DomainResult<Box<dyn DynAggregate>>;

/// A registered aggregate type.
#[derive(Debug, Clone, Copy)]
pub struct AggregateType {
    topic: &'static str,
    type_name: &'static str,
    type_id: TypeId,
    rebuild: Rebuild,
}

impl AggregateType {
    pub fn of<A>() -> Self
    where
        A: Aggregate,
        A::Created: DeserializeOwned,
        A::Event: DeserializeOwned,
    {
        Self {
            topic: A::TOPIC,
            type_name: std::any::type_name::<A>(),
            type_id: TypeId::of::<A>(),
            rebuild: rebuild::<A>,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.topic
    }

    /// Rust type name, for diagnostics only.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is<A: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<A>()
    }
}

fn rebuild<A>(history: &[StoredEvent]) -> DomainResult<Box<dyn DynAggregate>>
where
    A: Aggregate,
    A::Created: DeserializeOwned,
    A::Event: DeserializeOwned,
{
    let decoded = history
        .iter()
        .map(StoredEvent::decode::<A::Created, A::Event>)
        .collect::<DomainResult<Vec<_>>>()?;
    Ok(Box::new(A::replay(&decoded)?))
}

/// Type-erased aggregate, as returned by [`AggregateRegistry::reconstruct`].
pub trait DynAggregate: Any + core::fmt::Debug {
    fn aggregate_id(&self) -> AggregateId;

    fn aggregate_version(&self) -> u64;

    fn aggregate_topic(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<A: Aggregate> DynAggregate for A {
    fn aggregate_id(&self) -> AggregateId {
        *self.id()
    }

    fn aggregate_version(&self) -> u64 {
        self.version()
    }

    fn aggregate_topic(&self) -> &'static str {
        A::TOPIC
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl dyn DynAggregate {
    pub fn downcast_ref<A: Aggregate>(&self) -> Option<&A> {
        self.as_any().downcast_ref::<A>()
    }

    pub fn downcast<A: Aggregate>(self: Box<Self>) -> Option<A> {
        self.into_any().downcast::<A>().ok().map(|boxed| *boxed)
    }
}

/// Registry of the aggregate types a process can rebuild.
#[derive(Debug, Clone, Default)]
pub struct AggregateRegistry {
    types: TopicRegistry<AggregateType>,
}

impl AggregateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `A` under its topic. Registering the same type twice is a no-op.
    pub fn register<A>(&mut self) -> DomainResult<&mut Self>
    where
        A: Aggregate,
        A::Created: DeserializeOwned,
        A::Event: DeserializeOwned,
    {
        if let Ok(existing) = self.types.resolve(A::TOPIC) {
            if existing.is::<A>() {
                return Ok(self);
            }
            return Err(DomainError::resolution(
                A::TOPIC,
                format!("topic already bound to `{}`", existing.type_name()),
            ));
        }

        self.types.register(A::TOPIC, AggregateType::of::<A>())?;
        tracing::debug!(topic = A::TOPIC, "aggregate type registered");
        Ok(self)
    }

    /// Resolve a topic to its registered aggregate type.
    pub fn resolve(&self, topic: &str) -> DomainResult<&AggregateType> {
        self.types.resolve(topic)
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.types.topics()
    }

    /// Rebuild an aggregate from a stored history without knowing its type.
    ///
    /// The first event must be a creation event; its topic selects the type.
    pub fn reconstruct(&self, history: &[StoredEvent]) -> DomainResult<Box<dyn DynAggregate>> {
        let Some(AggregateEvent::Created(created)) = history.first() else {
            return Err(DomainError::not_aggregate(
                "history must begin with a creation event",
            ));
        };

        let aggregate_type = self.resolve(created.aggregate_topic()).inspect_err(|err| {
            tracing::warn!(
                aggregate_id = %created.aggregate_id(),
                error = %err,
                "cannot reconstruct aggregate"
            );
        })?;

        (aggregate_type.rebuild)(history)
    }
}
