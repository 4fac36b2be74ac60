//! Variantes de evento del motor (tabla de §4.4).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{StepId, Token};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventKind {
    StepRegistered { step_id: StepId, content_hash: String },
    StepUnregistered { step_id: StepId },
    StepHealthChanged { step_id: StepId, healthy: bool, detail: Option<String> },

    FlowStarted { goals: Vec<StepId> },
    FlowActivated,
    FlowDeactivated { reason: String },
    FlowCompleted,
    FlowFailed { error: String },

    StepStarted { step_id: StepId },
    StepCompleted { step_id: StepId },
    StepFailed { step_id: StepId, error: String },
    StepSkipped { step_id: StepId, reason: String },

    AttributeSet { name: String, value: Value, produced_by: StepId },

    WorkStarted { step_id: StepId, token: Token, inputs: Value },
    WorkCompleted { step_id: StepId, token: Token, outputs: Value },
    WorkFailed { step_id: StepId, token: Token, error: String, retryable: bool },
    RetryScheduled { step_id: StepId, token: Token, attempt: u32, next_attempt_at: DateTime<Utc> },
}

impl EventKind {
    /// Nombre corto estable usado para el filtrado de suscripciones y para
    /// el campo `type` del payload de stream (§6).
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::StepRegistered { .. } => "step_registered",
            EventKind::StepUnregistered { .. } => "step_unregistered",
            EventKind::StepHealthChanged { .. } => "step_health_changed",
            EventKind::FlowStarted { .. } => "flow_started",
            EventKind::FlowActivated => "flow_activated",
            EventKind::FlowDeactivated { .. } => "flow_deactivated",
            EventKind::FlowCompleted => "flow_completed",
            EventKind::FlowFailed { .. } => "flow_failed",
            EventKind::StepStarted { .. } => "step_started",
            EventKind::StepCompleted { .. } => "step_completed",
            EventKind::StepFailed { .. } => "step_failed",
            EventKind::StepSkipped { .. } => "step_skipped",
            EventKind::AttributeSet { .. } => "attribute_set",
            EventKind::WorkStarted { .. } => "work_started",
            EventKind::WorkCompleted { .. } => "work_completed",
            EventKind::WorkFailed { .. } => "work_failed",
            EventKind::RetryScheduled { .. } => "retry_scheduled",
        }
    }
}
