//! `FlowEvent` y su forma serializada para consumidores externos.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::AggregateId;
use super::kind::EventKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub sequence: u64,
    pub aggregate_id: AggregateId,
    pub kind: EventKind,
    pub ts: DateTime<Utc>,
}

/// Forma sobre el alambre descrita en §6: `id` es la ruta del aggregate
/// unida por `/`, `type` y `data` vienen de `EventKind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: u64,
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub ts: DateTime<Utc>,
}

impl From<&FlowEvent> for EventEnvelope {
    fn from(ev: &FlowEvent) -> Self {
        let data = serde_json::to_value(&ev.kind).unwrap_or(serde_json::Value::Null);
        let data = data.get("data").cloned().unwrap_or(data);
        EventEnvelope {
            sequence: ev.sequence,
            id: ev.aggregate_id.as_path().join("/"),
            event_type: ev.kind.type_name().to_string(),
            data,
            ts: ev.ts,
        }
    }
}
