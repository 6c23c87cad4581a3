use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use keel_core::{AggregateId, DomainError, DomainResult};

use crate::event::{Created, DomainEvent, Event};

/// One item of an aggregate's history.
///
/// This is the unit staged in an aggregate's pending buffer, handed out by
/// `collect`, and fed back through `replay`.
///
/// - `C` is the aggregate's creation payload.
/// - `E` is its closed set of trigger payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateEvent<C, E> {
    Created(Created<C>),
    Triggered(DomainEvent<E>),
}

/// Type-erased history item: payloads held as JSON values.
///
/// Lets a store keep histories of different aggregate types side by side and
/// rebuild them through `AggregateRegistry::reconstruct`.
pub type StoredEvent = AggregateEvent<JsonValue, JsonValue>;

impl<C, E> AggregateEvent<C, E> {
    pub fn aggregate_id(&self) -> AggregateId {
        match self {
            AggregateEvent::Created(e) => e.aggregate_id(),
            AggregateEvent::Triggered(e) => e.aggregate_id(),
        }
    }

    pub fn aggregate_version(&self) -> u64 {
        match self {
            AggregateEvent::Created(e) => e.aggregate_version(),
            AggregateEvent::Triggered(e) => e.aggregate_version(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AggregateEvent::Created(e) => e.timestamp(),
            AggregateEvent::Triggered(e) => e.timestamp(),
        }
    }

    /// Topic of the created aggregate, for creation events only.
    pub fn aggregate_topic(&self) -> Option<&str> {
        match self {
            AggregateEvent::Created(e) => Some(e.aggregate_topic()),
            AggregateEvent::Triggered(_) => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, AggregateEvent::Created(_))
    }
}

impl<C: Event, E: Event> AggregateEvent<C, E> {
    pub fn event_type(&self) -> &'static str {
        match self {
            AggregateEvent::Created(e) => e.payload().event_type(),
            AggregateEvent::Triggered(e) => e.payload().event_type(),
        }
    }
}

impl<C: Serialize, E: Serialize> AggregateEvent<C, E> {
    /// Erase the payload types.
    pub fn to_stored(&self) -> DomainResult<StoredEvent> {
        Ok(match self {
            AggregateEvent::Created(e) => AggregateEvent::Created(e.try_map(encode)?),
            AggregateEvent::Triggered(e) => AggregateEvent::Triggered(e.try_map(encode)?),
        })
    }
}

impl StoredEvent {
    /// Recover concrete payload types.
    pub fn decode<C: DeserializeOwned, E: DeserializeOwned>(
        &self,
    ) -> DomainResult<AggregateEvent<C, E>> {
        Ok(match self {
            AggregateEvent::Created(e) => AggregateEvent::Created(e.try_map(decode)?),
            AggregateEvent::Triggered(e) => AggregateEvent::Triggered(e.try_map(decode)?),
        })
    }
}

fn encode<T: Serialize>(payload: &T) -> DomainResult<JsonValue> {
    serde_json::to_value(payload).map_err(|e| DomainError::invalid_payload(e.to_string()))
}

fn decode<T: DeserializeOwned>(payload: &JsonValue) -> DomainResult<T> {
    T::deserialize(payload).map_err(|e| DomainError::invalid_payload(e.to_string()))
}
