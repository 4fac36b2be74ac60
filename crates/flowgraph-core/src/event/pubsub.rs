//! Suscripciones con cola acotada por suscriptor (§4.4, §7 concurrencia).
use std::fmt;

use tokio::sync::mpsc;

use super::aggregate::AggregateId;
use super::types::FlowEvent;

/// Capacidad de la cola de cada suscriptor. Un suscriptor lento se
/// termina con `SubscriberLagged` en vez de frenar al publicador.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub aggregate_prefix: Vec<String>,
    pub event_types: Option<Vec<String>>,
    pub from_sequence: u64,
}

impl Filter {
    pub fn matches(&self, event: &FlowEvent) -> bool {
        if event.sequence < self.from_sequence {
            return false;
        }
        if !self.aggregate_prefix.is_empty() && !event.aggregate_id.under_prefix(&self.aggregate_prefix) {
            return false;
        }
        if let Some(types) = &self.event_types {
            if !types.iter().any(|t| t == event.kind.type_name()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug)]
pub struct SubscriberLagged;

impl fmt::Display for SubscriberLagged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber lagged behind the event log and was terminated")
    }
}

impl std::error::Error for SubscriberLagged {}

pub(super) enum SubscriberMsg {
    Event(FlowEvent),
    Lagged,
}

pub(super) struct SubscriberHandle {
    pub id: u64,
    pub filter: Filter,
    pub tx: mpsc::Sender<SubscriberMsg>,
}

pub struct Subscription {
    pub(super) rx: mpsc::Receiver<SubscriberMsg>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<Option<FlowEvent>, SubscriberLagged> {
        match self.rx.recv().await {
            None => Ok(None),
            Some(SubscriberMsg::Event(ev)) => Ok(Some(ev)),
            Some(SubscriberMsg::Lagged) => Err(SubscriberLagged),
        }
    }
}
