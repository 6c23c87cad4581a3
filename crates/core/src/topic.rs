//! Topics: stable string identifiers for concrete aggregate types.
//!
//! A topic has the form `<namespace-path>#<type-name>`, e.g.
//! `keel_accounting::account#Account`. Persisted creation events carry the
//! topic of the aggregate they create, so a store can rebuild the right type
//! without holding any in-memory type handle.
//!
//! Resolution goes through an explicit [`TopicRegistry`] populated at process
//! start; nothing is discovered by reflection.

use std::collections::BTreeMap;

use crate::error::{DomainError, DomainResult};

/// Separator between the namespace path and the type name.
pub const TOPIC_SEPARATOR: char = '#';

/// A type with a stable topic.
///
/// Implement with [`impl_topic!`](crate::impl_topic) so the topic follows the
/// defining module.
pub trait Topical {
    const TOPIC: &'static str;
}

/// The topic of `T`.
pub fn topic_of<T: Topical + ?Sized>() -> &'static str {
    T::TOPIC
}

/// Implements [`Topical`] for a type, using the module path of the call site
/// as namespace.
///
/// ```
/// pub struct Wallet;
/// keel_core::impl_topic!(Wallet);
///
/// assert!(keel_core::topic_of::<Wallet>().ends_with("#Wallet"));
/// ```
#[macro_export]
macro_rules! impl_topic {
    ($ty:ident) => {
        impl $crate::Topical for $ty {
            const TOPIC: &'static str = concat!(module_path!(), "#", stringify!($ty));
        }
    };
}

/// Borrowed view of a well-formed topic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Topic<'a> {
    namespace: &'a str,
    name: &'a str,
}

impl<'a> Topic<'a> {
    /// Split `raw` into namespace and type name.
    pub fn parse(raw: &'a str) -> DomainResult<Self> {
        let (namespace, name) = raw
            .split_once(TOPIC_SEPARATOR)
            .ok_or_else(|| DomainError::resolution(raw, "missing `#` separator"))?;

        if namespace.is_empty() {
            return Err(DomainError::resolution(raw, "empty namespace"));
        }
        if name.is_empty() {
            return Err(DomainError::resolution(raw, "empty type name"));
        }
        if name.contains(TOPIC_SEPARATOR) {
            return Err(DomainError::resolution(raw, "more than one `#` separator"));
        }

        Ok(Self { namespace, name })
    }

    pub fn namespace(&self) -> &'a str {
        self.namespace
    }

    pub fn name(&self) -> &'a str {
        self.name
    }
}

impl core::fmt::Display for Topic<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{}{}", self.namespace, TOPIC_SEPARATOR, self.name)
    }
}

/// Explicit topic → entry map.
///
/// Generic over the entry so the kernel can store whatever it needs to
/// rebuild a type (see `keel_events::AggregateRegistry`).
#[derive(Debug, Clone)]
pub struct TopicRegistry<T> {
    entries: BTreeMap<String, T>,
}

impl<T> Default for TopicRegistry<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> TopicRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `topic` to `entry`.
    ///
    /// Fails if the topic is malformed or already bound.
    pub fn register(&mut self, topic: &str, entry: T) -> DomainResult<()> {
        Topic::parse(topic)?;
        if self.entries.contains_key(topic) {
            return Err(DomainError::resolution(topic, "topic already registered"));
        }
        self.entries.insert(topic.to_string(), entry);
        Ok(())
    }

    /// Look up the entry bound to `topic`.
    pub fn resolve(&self, topic: &str) -> DomainResult<&T> {
        Topic::parse(topic)?;
        self.entries
            .get(topic)
            .ok_or_else(|| DomainError::resolution(topic, "unknown topic"))
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.entries.contains_key(topic)
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
