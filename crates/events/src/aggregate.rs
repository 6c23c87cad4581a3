//! Aggregate root protocol for event-sourced domain models.
//!
//! An aggregate's state is the fold of its ordered history:
//!
//! - **create** allocates an identity, builds the creation event at version 1
//!   and instantiates the concrete type from it;
//! - **trigger** builds the next event, runs it through the version-checked
//!   [`DomainEvent::mutate`] pipeline and stages it;
//! - **collect** drains the staged events for a persistence collaborator;
//! - **replay** rebuilds an aggregate from a collected history.
//!
//! Business fields change only inside [`Aggregate::apply`], which can only be
//! reached through `mutate`. `create` and `trigger` take the aggregate's own
//! [`Aggregate::Token`], so only the aggregate's operations can stage events.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use keel_core::{AggregateId, AggregateRoot, DomainError, DomainResult, ExpectedVersion, Topical};

use crate::envelope::AggregateEvent;
use crate::event::{Created, DomainEvent, Event};

/// Identity, version, timestamp and pending buffer of one aggregate.
///
/// Every concrete aggregate embeds one. Only the kernel can build or advance
/// it, so a concrete aggregate cannot forge its own version. Not `Clone`: a
/// lifecycle is never shared between two instantiations.
///
/// ```compile_fail
/// use keel_events::Lifecycle;
///
/// fn duplicate<C, E>(lifecycle: &Lifecycle<C, E>) -> Lifecycle<C, E> {
///     lifecycle.clone()
/// }
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct Lifecycle<C, E> {
    id: AggregateId,
    version: u64,
    timestamp: DateTime<Utc>,
    pending: VecDeque<AggregateEvent<C, E>>,
}

impl<C, E> Lifecycle<C, E> {
    fn new(id: AggregateId, version: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            version,
            timestamp,
            pending: VecDeque::new(),
        }
    }

    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Events staged since the last collection, oldest first.
    pub fn pending_events(&self) -> impl ExactSizeIterator<Item = &AggregateEvent<C, E>> {
        self.pending.iter()
    }

    fn advance(&mut self, version: u64, timestamp: DateTime<Utc>) {
        self.version = version;
        self.timestamp = timestamp;
    }

    fn stage(&mut self, event: AggregateEvent<C, E>) {
        self.pending.push_back(event);
    }

    fn drain(&mut self) -> Vec<AggregateEvent<C, E>> {
        self.pending.drain(..).collect()
    }
}

/// Witness that an event passed the kernel's checks.
///
/// Only the kernel can build one, which keeps [`Aggregate::instantiate`] and
/// [`Aggregate::apply`] out of reach for direct callers.
///
/// ```compile_fail
/// let forged = keel_events::Sequenced(());
/// ```
#[derive(Debug)]
pub struct Sequenced(());

/// The lifecycle type embedded by aggregate `A`.
pub type LifecycleOf<A> = Lifecycle<<A as Aggregate>::Created, <A as Aggregate>::Event>;

/// History item type of aggregate `A`.
pub type HistoryOf<A> = AggregateEvent<<A as Aggregate>::Created, <A as Aggregate>::Event>;

/// Event-sourced aggregate.
///
/// Implementors provide construction from the creation payload and one
/// exhaustive `apply` over their closed set of event kinds; the kernel
/// provides the rest.
pub trait Aggregate:
    AggregateRoot<Id = AggregateId> + Topical + Sized + core::fmt::Debug + 'static
{
    /// Payload of the creation event.
    type Created: Event;
    /// Closed set of payloads that extend an existing aggregate.
    type Event: Event;
    /// Capability required by [`create`](Aggregate::create) and
    /// [`trigger`](Aggregate::trigger).
    ///
    /// Implementors use a type only their own module can construct, so
    /// callers go through the aggregate's operations and its business rules.
    type Token;

    /// Build the aggregate from its creation payload.
    ///
    /// `lifecycle` already holds the new id, version 1 and the event's timestamp.
    fn instantiate(
        lifecycle: LifecycleOf<Self>,
        created: &Self::Created,
        sequenced: Sequenced,
    ) -> Self;

    /// Fold one event onto business state.
    ///
    /// Must not panic on any stored payload. An event the state cannot absorb
    /// (e.g. arithmetic overflow) is an error, and business state is left as
    /// it was.
    fn apply(&mut self, event: &Self::Event, sequenced: Sequenced) -> DomainResult<()>;

    fn lifecycle(&self) -> &LifecycleOf<Self>;

    /// Kernel-only: the witness keeps version and identity out of reach of
    /// callers.
    fn lifecycle_mut(&mut self, sequenced: Sequenced) -> &mut LifecycleOf<Self>;

    /// Create a new aggregate from its creation payload.
    ///
    /// Allocates the identity, fixes the version at 1, stamps the topic of
    /// `Self`, and stages the creation event.
    fn create(payload: Self::Created, _token: Self::Token) -> DomainResult<Self> {
        let event = Created::new(
            AggregateId::new(),
            ExpectedVersion::INITIAL.get(),
            Utc::now(),
            Self::TOPIC,
            payload,
        );

        let mut aggregate = event.mutate::<Self>()?;

        tracing::debug!(
            aggregate_id = %aggregate.id(),
            aggregate_topic = Self::TOPIC,
            event_type = event.payload().event_type(),
            "aggregate created"
        );

        aggregate.lifecycle_mut(Sequenced(())).stage(AggregateEvent::Created(event));
        Ok(aggregate)
    }

    /// Extend this aggregate with one event built from `payload`.
    ///
    /// On error the aggregate is untouched and nothing is staged.
    fn trigger(&mut self, payload: Self::Event, _token: Self::Token) -> DomainResult<()> {
        let next_version = ExpectedVersion::after(self.version()).get();
        let event = DomainEvent::new(*self.id(), next_version, Utc::now(), payload);

        event.mutate(&mut *self)?;

        tracing::debug!(
            aggregate_id = %self.id(),
            aggregate_version = next_version,
            event_type = event.payload().event_type(),
            "event triggered"
        );

        self.lifecycle_mut(Sequenced(())).stage(AggregateEvent::Triggered(event));
        Ok(())
    }

    /// Drain staged events, oldest first. Version and state are untouched.
    fn collect(&mut self) -> Vec<HistoryOf<Self>> {
        let collected = self.lifecycle_mut(Sequenced(())).drain();
        tracing::debug!(
            aggregate_id = %self.id(),
            collected = collected.len(),
            "pending events collected"
        );
        collected
    }

    /// Events staged since the last collection, oldest first.
    fn pending_events(&self) -> impl ExactSizeIterator<Item = &HistoryOf<Self>> {
        self.lifecycle().pending_events()
    }

    /// Rebuild an aggregate from its full history.
    ///
    /// The first item must be the creation event; every following item must
    /// extend the version by one. The result has nothing pending.
    fn replay(history: &[HistoryOf<Self>]) -> DomainResult<Self> {
        let (first, rest) = history
            .split_first()
            .ok_or_else(|| DomainError::not_aggregate("empty history"))?;

        let AggregateEvent::Created(created) = first else {
            return Err(DomainError::not_aggregate(
                "history must begin with a creation event",
            ));
        };

        let mut aggregate = created.mutate::<Self>()?;
        for item in rest {
            match item {
                AggregateEvent::Triggered(event) => {
                    event.mutate(&mut aggregate)?;
                }
                AggregateEvent::Created(_) => {
                    return Err(DomainError::not_aggregate(format!(
                        "unexpected creation event at version {}",
                        item.aggregate_version()
                    )));
                }
            }
        }

        tracing::debug!(
            aggregate_id = %aggregate.id(),
            aggregate_version = aggregate.version(),
            "aggregate replayed"
        );
        Ok(aggregate)
    }
}

impl<P: Event> Created<P> {
    /// Creation-path mutation: resolve the topic against `A` and instantiate it.
    pub fn mutate<A>(&self) -> DomainResult<A>
    where
        A: Aggregate<Created = P>,
    {
        if self.aggregate_topic() != A::TOPIC {
            return Err(DomainError::resolution(
                self.aggregate_topic(),
                format!("creation event does not create `{}`", A::TOPIC),
            ));
        }
        ExpectedVersion::INITIAL.check(self.aggregate_version())?;

        let lifecycle = Lifecycle::new(self.aggregate_id(), self.aggregate_version(), self.timestamp());
        Ok(A::instantiate(lifecycle, self.payload(), Sequenced(())))
    }
}

impl<P: Event> DomainEvent<P> {
    /// Trigger-path mutation: check, advance version and timestamp, apply.
    ///
    /// On error `target` is left exactly as it was, including when `apply`
    /// rejects the payload.
    pub fn mutate<'a, A>(&self, target: &'a mut A) -> DomainResult<&'a mut A>
    where
        A: Aggregate<Event = P>,
    {
        if self.aggregate_id() != *target.id() {
            return Err(DomainError::not_aggregate(format!(
                "event for aggregate {} applied to aggregate {}",
                self.aggregate_id(),
                target.id()
            )));
        }

        if let Err(err) = ExpectedVersion::after(target.version()).check(self.aggregate_version()) {
            tracing::warn!(
                aggregate_id = %target.id(),
                error = %err,
                "rejected out-of-sequence event"
            );
            return Err(err);
        }

        let (version, timestamp) = (target.version(), target.timestamp());
        target
            .lifecycle_mut(Sequenced(()))
            .advance(self.aggregate_version(), self.timestamp());

        if let Err(err) = target.apply(self.payload(), Sequenced(())) {
            target.lifecycle_mut(Sequenced(())).advance(version, timestamp);
            tracing::warn!(
                aggregate_id = %target.id(),
                aggregate_version = self.aggregate_version(),
                error = %err,
                "event rejected by apply"
            );
            return Err(err);
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Started {
        label: String,
    }

    impl Event for Started {
        fn event_type(&self) -> &'static str {
            "test.counter.started"
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    enum CounterEvent {
        Incremented(i64),
        Reset,
    }

    impl Event for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Incremented(_) => "test.counter.incremented",
                CounterEvent::Reset => "test.counter.reset",
            }
        }
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Counter {
        lifecycle: Lifecycle<Started, CounterEvent>,
        label: String,
        total: i64,
    }

    keel_core::impl_topic!(Counter);

    impl AggregateRoot for Counter {
        type Id = AggregateId;

        fn id(&self) -> &Self::Id {
            self.lifecycle.id()
        }

        fn version(&self) -> u64 {
            self.lifecycle.version()
        }

        fn timestamp(&self) -> DateTime<Utc> {
            self.lifecycle.timestamp()
        }
    }

    impl Aggregate for Counter {
        type Created = Started;
        type Event = CounterEvent;
        type Token = ();

        fn instantiate(lifecycle: LifecycleOf<Self>, created: &Started, _: Sequenced) -> Self {
            Self {
                lifecycle,
                label: created.label.clone(),
                total: 0,
            }
        }

        fn apply(&mut self, event: &CounterEvent, _: Sequenced) -> DomainResult<()> {
            match event {
                CounterEvent::Incremented(by) => {
                    self.total = self
                        .total
                        .checked_add(*by)
                        .ok_or_else(|| DomainError::validation("counter overflow"))?;
                }
                CounterEvent::Reset => self.total = 0,
            }
            Ok(())
        }

        fn lifecycle(&self) -> &LifecycleOf<Self> {
            &self.lifecycle
        }

        fn lifecycle_mut(&mut self, _: Sequenced) -> &mut LifecycleOf<Self> {
            &mut self.lifecycle
        }
    }

    fn started() -> Counter {
        Counter::create(
            Started {
                label: "c".to_string(),
            },
            (),
        )
        .unwrap()
    }

    /// Everything a rejected mutation must leave as it was.
    fn state(counter: &Counter) -> (AggregateId, u64, DateTime<Utc>, i64, usize) {
        (
            *counter.id(),
            counter.version(),
            counter.timestamp(),
            counter.total,
            counter.pending_events().len(),
        )
    }

    #[test]
    fn create_starts_at_version_one_with_one_pending_event() {
        let counter = started();

        assert_eq!(counter.version(), 1);
        assert_eq!(counter.label, "c");
        assert_eq!(counter.total, 0);

        let pending: Vec<_> = counter.pending_events().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].aggregate_id(), *counter.id());
        assert_eq!(pending[0].aggregate_version(), 1);
        assert_eq!(pending[0].aggregate_topic(), Some(Counter::TOPIC));
        assert_eq!(pending[0].timestamp(), counter.timestamp());
        assert_eq!(pending[0].event_type(), "test.counter.started");
    }

    #[test]
    fn create_allocates_fresh_ids() {
        assert_ne!(started().id(), started().id());
    }

    #[test]
    fn trigger_advances_version_and_applies() {
        let mut counter = started();
        counter.trigger(CounterEvent::Incremented(5), ()).unwrap();
        counter.trigger(CounterEvent::Incremented(-2), ()).unwrap();

        assert_eq!(counter.version(), 3);
        assert_eq!(counter.total, 3);

        let last = counter.pending_events().last().unwrap();
        assert_eq!(last.aggregate_version(), 3);
        assert_eq!(last.timestamp(), counter.timestamp());
    }

    #[test]
    fn mutate_accepts_exactly_the_next_version() {
        let mut counter = started();
        let event = DomainEvent::new(*counter.id(), 2, Utc::now(), CounterEvent::Incremented(4));

        let mutated = event.mutate(&mut counter).unwrap();
        assert_eq!(mutated.version(), 2);
        assert_eq!(mutated.total, 4);
        assert_eq!(mutated.timestamp(), event.timestamp());
        // mutate does not stage anything
        assert_eq!(counter.pending_events().len(), 1);
    }

    #[test]
    fn mutate_rejects_stale_and_future_versions() {
        let mut counter = started();
        let before = state(&counter);

        for version in [0, 1, 3, 10] {
            let event =
                DomainEvent::new(*counter.id(), version, Utc::now(), CounterEvent::Incremented(1));
            let err = event.mutate(&mut counter).unwrap_err();
            assert_eq!(err, DomainError::concurrency(version, 2));
        }
        assert_eq!(state(&counter), before);
    }

    #[test]
    fn mutate_rejects_events_of_another_aggregate() {
        let mut counter = started();
        let before = state(&counter);
        let event = DomainEvent::new(AggregateId::new(), 2, Utc::now(), CounterEvent::Reset);

        let err = event.mutate(&mut counter).unwrap_err();
        assert!(matches!(err, DomainError::NotAggregate(_)));
        assert_eq!(state(&counter), before);
    }

    #[test]
    fn apply_error_leaves_version_and_state_untouched() {
        let mut counter = started();
        counter.trigger(CounterEvent::Incremented(i64::MAX), ()).unwrap();
        let before = state(&counter);

        let err = counter
            .trigger(CounterEvent::Incremented(1), ())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(state(&counter), before);
        assert_eq!(counter.version(), 2);
    }

    #[test]
    fn replay_of_overflowing_history_is_an_error() {
        let mut live = started();
        live.trigger(CounterEvent::Incremented(i64::MAX), ()).unwrap();
        let mut history = live.collect();
        history.push(AggregateEvent::Triggered(DomainEvent::new(
            *live.id(),
            3,
            Utc::now(),
            CounterEvent::Incremented(i64::MAX),
        )));

        assert!(matches!(
            Counter::replay(&history).unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn creation_mutate_checks_topic_and_version() {
        let payload = Started {
            label: "x".to_string(),
        };

        let foreign = Created::new(AggregateId::new(), 1, Utc::now(), "other#Thing", payload.clone());
        let err = foreign.mutate::<Counter>().unwrap_err();
        assert!(matches!(err, DomainError::Resolution { ref topic, .. } if topic == "other#Thing"));

        let late = Created::new(AggregateId::new(), 2, Utc::now(), Counter::TOPIC, payload);
        assert_eq!(
            late.mutate::<Counter>().unwrap_err(),
            DomainError::concurrency(2, 1)
        );
    }

    #[test]
    fn collect_drains_in_order_and_second_collect_is_empty() {
        let mut counter = started();
        counter.trigger(CounterEvent::Incremented(1), ()).unwrap();
        counter.trigger(CounterEvent::Reset, ()).unwrap();

        let collected = counter.collect();
        let versions: Vec<u64> = collected.iter().map(|e| e.aggregate_version()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert!(collected[0].is_created());

        assert_eq!(counter.version(), 3);
        assert_eq!(counter.pending_events().len(), 0);
        assert!(counter.collect().is_empty());

        counter.trigger(CounterEvent::Incremented(9), ()).unwrap();
        let next = counter.collect();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].aggregate_version(), 4);
    }

    #[test]
    fn replay_reproduces_live_state() {
        let mut live = started();
        live.trigger(CounterEvent::Incremented(7), ()).unwrap();
        live.trigger(CounterEvent::Reset, ()).unwrap();
        live.trigger(CounterEvent::Incremented(2), ()).unwrap();
        let history = live.collect();

        let replayed = Counter::replay(&history).unwrap();
        assert_eq!(replayed, live);
        assert_eq!(replayed.pending_events().len(), 0);
    }

    #[test]
    fn replay_rejects_malformed_histories() {
        assert!(matches!(
            Counter::replay(&[]).unwrap_err(),
            DomainError::NotAggregate(_)
        ));

        let mut live = started();
        live.trigger(CounterEvent::Incremented(1), ()).unwrap();
        live.trigger(CounterEvent::Incremented(1), ()).unwrap();
        let history = live.collect();

        let headless = &history[1..];
        assert!(matches!(
            Counter::replay(headless).unwrap_err(),
            DomainError::NotAggregate(_)
        ));

        let doubled_creation = vec![history[0].clone(), history[0].clone()];
        assert!(matches!(
            Counter::replay(&doubled_creation).unwrap_err(),
            DomainError::NotAggregate(_)
        ));

        let gapped = vec![history[0].clone(), history[2].clone()];
        assert_eq!(
            Counter::replay(&gapped).unwrap_err(),
            DomainError::concurrency(3, 2)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// After a creation plus N triggers: version N+1, N+1 pending events in order.
        #[test]
        fn version_counts_applied_events(deltas in prop::collection::vec(-1_000i64..1_000, 0..32)) {
            let mut counter = started();
            for delta in &deltas {
                counter.trigger(CounterEvent::Incremented(*delta), ()).unwrap();
            }

            let n = deltas.len() as u64;
            prop_assert_eq!(counter.version(), n + 1);
            prop_assert_eq!(counter.total, deltas.iter().sum::<i64>());

            let versions: Vec<u64> = counter.pending_events().map(|e| e.aggregate_version()).collect();
            let expected: Vec<u64> = (1..=n + 1).collect();
            prop_assert_eq!(versions, expected);
        }

        /// mutate on version V succeeds only for V+1.
        #[test]
        fn mutate_is_gapless(triggers in 0usize..8, version in 0u64..16) {
            let mut counter = started();
            for _ in 0..triggers {
                counter.trigger(CounterEvent::Incremented(1), ()).unwrap();
            }
            let current = counter.version();
            let event = DomainEvent::new(*counter.id(), version, Utc::now(), CounterEvent::Incremented(1));

            let outcome = event.mutate(&mut counter).map(|mutated| mutated.version());
            match outcome {
                Ok(mutated_version) => {
                    prop_assert_eq!(version, current + 1);
                    prop_assert_eq!(mutated_version, current + 1);
                }
                Err(err) => {
                    prop_assert_ne!(version, current + 1);
                    prop_assert_eq!(err, DomainError::concurrency(version, current + 1));
                    prop_assert_eq!(counter.version(), current);
                }
            }
        }
    }
}
