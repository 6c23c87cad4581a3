use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keel_core::AggregateId;

/// Payload of a domain event.
///
/// Payloads are facts: plain data, cloned freely, never mutated after the
/// event carrying them is built.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "accounting.account.opened").
    fn event_type(&self) -> &'static str;
}

/// An event that extends an existing aggregate's history.
///
/// Fields are private and there are no setters, so a constructed event can
/// never be altered:
///
/// ```compile_fail
/// use chrono::Utc;
/// use keel_core::AggregateId;
/// use keel_events::DomainEvent;
///
/// let event = DomainEvent::new(AggregateId::new(), 2, Utc::now(), ());
/// event.aggregate_version = 3;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent<P> {
    aggregate_id: AggregateId,
    aggregate_version: u64,
    timestamp: DateTime<Utc>,
    payload: P,
}

impl<P> DomainEvent<P> {
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_version: u64,
        timestamp: DateTime<Utc>,
        payload: P,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_version,
            timestamp,
            payload,
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Position of this event in its aggregate's history (1-based).
    pub fn aggregate_version(&self) -> u64 {
        self.aggregate_version
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Rebuild the event around a converted payload, keeping the header.
    pub fn try_map<Q, E>(&self, f: impl FnOnce(&P) -> Result<Q, E>) -> Result<DomainEvent<Q>, E> {
        Ok(DomainEvent {
            aggregate_id: self.aggregate_id,
            aggregate_version: self.aggregate_version,
            timestamp: self.timestamp,
            payload: f(&self.payload)?,
        })
    }
}

/// The event that brings an aggregate into existence.
///
/// Always the first event of a history. Besides the usual header it carries
/// the topic of the aggregate type to instantiate, which makes a stored
/// history self-describing.
///
/// ```compile_fail
/// use chrono::Utc;
/// use keel_core::AggregateId;
/// use keel_events::Created;
///
/// let event = Created::new(AggregateId::new(), 1, Utc::now(), "bank#Account", ());
/// event.aggregate_topic = String::from("bank#Other");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created<P> {
    aggregate_id: AggregateId,
    aggregate_version: u64,
    timestamp: DateTime<Utc>,
    aggregate_topic: String,
    payload: P,
}

impl<P> Created<P> {
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_version: u64,
        timestamp: DateTime<Utc>,
        aggregate_topic: impl Into<String>,
        payload: P,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_version,
            timestamp,
            aggregate_topic: aggregate_topic.into(),
            payload,
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_version(&self) -> u64 {
        self.aggregate_version
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Topic of the concrete aggregate type this event creates.
    pub fn aggregate_topic(&self) -> &str {
        &self.aggregate_topic
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Rebuild the event around a converted payload, keeping header and topic.
    pub fn try_map<Q, E>(&self, f: impl FnOnce(&P) -> Result<Q, E>) -> Result<Created<Q>, E> {
        Ok(Created {
            aggregate_id: self.aggregate_id,
            aggregate_version: self.aggregate_version,
            timestamp: self.timestamp,
            aggregate_topic: self.aggregate_topic.clone(),
            payload: f(&self.payload)?,
        })
    }
}
