//! `EventStore`: log append-only en memoria con pub/sub (§4.4).
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::mpsc;

use super::aggregate::AggregateId;
use super::kind::EventKind;
use super::pubsub::{Filter, SubscriberHandle, SubscriberMsg, Subscription, SUBSCRIBER_QUEUE_CAPACITY};
use super::types::FlowEvent;

pub trait EventStore: Send + Sync {
    fn append(&self, aggregate_id: AggregateId, kind: EventKind) -> FlowEvent;
    fn list(&self, prefix: &[String]) -> Vec<FlowEvent>;
    fn subscribe(&self, filter: Filter) -> Subscription;
}

struct Inner {
    events: Vec<FlowEvent>,
    next_sequence: u64,
    next_subscriber_id: u64,
    subscribers: Vec<SubscriberHandle>,
}

/// Log de eventos en memoria. Un `Mutex` basta: `append` y `subscribe`
/// son operaciones breves y no mantienen el lock a través de un `.await`.
pub struct InMemoryEventStore {
    inner: Mutex<Inner>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: Vec::new(),
                next_sequence: 1,
                next_subscriber_id: 1,
                subscribers: Vec::new(),
            }),
        }
    }
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, aggregate_id: AggregateId, kind: EventKind) -> FlowEvent {
        let mut inner = self.inner.lock().expect("event store mutex poisoned");
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        let event = FlowEvent { sequence, aggregate_id, kind, ts: Utc::now() };
        inner.events.push(event.clone());

        let mut lagged = Vec::new();
        for sub in inner.subscribers.iter() {
            if !sub.filter.matches(&event) {
                continue;
            }
            if sub.tx.try_send(SubscriberMsg::Event(event.clone())).is_err() {
                let _ = sub.tx.try_send(SubscriberMsg::Lagged);
                lagged.push(sub.id);
            }
        }
        if !lagged.is_empty() {
            inner.subscribers.retain(|s| !lagged.contains(&s.id));
        }
        event
    }

    fn list(&self, prefix: &[String]) -> Vec<FlowEvent> {
        let inner = self.inner.lock().expect("event store mutex poisoned");
        inner.events.iter().filter(|e| e.aggregate_id.under_prefix(prefix)).cloned().collect()
    }

    fn subscribe(&self, filter: Filter) -> Subscription {
        let mut inner = self.inner.lock().expect("event store mutex poisoned");
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);

        // El backlog se reproduce bajo el mismo lock que registra al
        // suscriptor, así ningún evento publicado entre ambos pasos se pierde.
        for event in inner.events.iter().filter(|e| filter.matches(e)) {
            if tx.try_send(SubscriberMsg::Event(event.clone())).is_err() {
                let _ = tx.try_send(SubscriberMsg::Lagged);
                return Subscription { rx };
            }
        }

        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.push(SubscriberHandle { id, filter, tx });
        Subscription { rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StepId;

    #[test]
    fn append_assigns_monotonic_sequence() {
        let store = InMemoryEventStore::new();
        let e1 = store.append(AggregateId::Engine, EventKind::FlowActivated);
        let e2 = store.append(AggregateId::Engine, EventKind::FlowCompleted);
        assert_eq!(e1.sequence, 1);
        assert_eq!(e2.sequence, 2);
    }

    #[test]
    fn list_filters_by_prefix() {
        let store = InMemoryEventStore::new();
        store.append(AggregateId::Engine, EventKind::FlowActivated);
        store.append(
            AggregateId::Step(crate::ids::FlowId::sanitize("f1").unwrap(), StepId::new("s1")),
            EventKind::StepStarted { step_id: StepId::new("s1") },
        );
        let engine_events = store.list(&["engine".to_string()]);
        assert_eq!(engine_events.len(), 1);
    }

    #[tokio::test]
    async fn subscriber_receives_matching_events() {
        let store = InMemoryEventStore::new();
        let mut sub = store.subscribe(Filter { aggregate_prefix: vec!["engine".to_string()], ..Default::default() });
        store.append(AggregateId::Engine, EventKind::FlowActivated);
        let ev = sub.recv().await.unwrap().unwrap();
        assert_eq!(ev.kind.type_name(), "flow_activated");
    }
}
