//! `FlowState`: proyección raíz de un flujo (§3, §4.5).
//!
//! Reductor puro `(Arc<FlowState>, &FlowEvent) -> Arc<FlowState>` con
//! semántica copy-on-write: cada evento produce un nuevo `Arc`; valores
//! históricos (retenidos por cualquier lector previo) siguen siendo válidos.
//! El match es exhaustivo sobre `EventKind` — las variantes que no aplican a
//! un `FlowState` (p.ej. eventos de catálogo) tienen un brazo explícito que
//! no hace nada, nunca un comodín `_`.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{EventKind, FlowEvent};
use crate::ids::{FlowId, StepId};
use crate::model::AttributeValue;
use crate::planner::ExecutionPlan;

use super::execution_state::{ExecutionState, ExecutionStatus};
use super::work_state::{WorkState, WorkStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    pub id: FlowId,
    pub status: FlowStatus,
    pub goals: Vec<StepId>,
    pub attributes: IndexMap<String, AttributeValue>,
    pub executions: IndexMap<StepId, ExecutionState>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub error: Option<String>,
    pub labels: HashMap<String, String>,
}

impl FlowState {
    /// Estado inicial de un flujo recién planificado, antes de que se emita
    /// ningún evento de ejecución: atributos iniciales ya escritos (con
    /// `produced_by = None`), una ejecución `Pending` por cada step incluido
    /// en el plan.
    pub fn initial(
        id: FlowId,
        plan: &ExecutionPlan,
        initial_args: &IndexMap<String, Value>,
        labels: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut attributes = IndexMap::new();
        for (name, value) in initial_args {
            attributes.insert(name.clone(), AttributeValue { value: value.clone(), produced_by: None });
        }
        let executions = plan.steps.keys().cloned().map(|id| (id, ExecutionState::pending())).collect();
        Self {
            id,
            status: FlowStatus::Pending,
            goals: plan.goals.clone(),
            attributes,
            executions,
            created_at: now,
            completed_at: None,
            last_updated: now,
            error: None,
            labels,
        }
    }

    /// Aplica un evento y devuelve el nuevo estado envuelto en un `Arc`
    /// fresco; `self` permanece válido (§4.5, §9 "cyclic projection
    /// updates").
    pub fn apply(self: &Arc<Self>, event: &FlowEvent) -> Arc<Self> {
        let mut next = (**self).clone();
        next.last_updated = event.ts;

        match &event.kind {
            EventKind::FlowStarted { .. } => {
                next.status = FlowStatus::Pending;
            }
            EventKind::FlowActivated => {
                next.status = FlowStatus::Active;
            }
            EventKind::FlowDeactivated { reason } => {
                next.error = Some(reason.clone());
            }
            EventKind::FlowCompleted => {
                next.status = FlowStatus::Completed;
                next.completed_at = Some(event.ts);
            }
            EventKind::FlowFailed { error } => {
                next.status = FlowStatus::Failed;
                next.completed_at = Some(event.ts);
                next.error = Some(error.clone());
            }
            EventKind::AttributeSet { name, value, produced_by } => {
                // First-writer-wins (§3, §9): `entry().or_insert_with` is a
                // no-op if the name was already written.
                next.attributes
                    .entry(name.clone())
                    .or_insert_with(|| AttributeValue { value: value.clone(), produced_by: Some(produced_by.clone()) });
            }
            EventKind::StepStarted { step_id } => {
                let ex = next.executions.entry(step_id.clone()).or_insert_with(ExecutionState::pending);
                ex.status = ExecutionStatus::Active;
                ex.started_at = Some(event.ts);
            }
            EventKind::StepCompleted { step_id } => {
                if let Some(ex) = next.executions.get_mut(step_id) {
                    ex.status = ExecutionStatus::Completed;
                    ex.completed_at = Some(event.ts);
                    ex.duration_ms = ex.started_at.map(|s| (event.ts - s).num_milliseconds());
                    let merged: serde_json::Map<String, Value> = ex
                        .work_items
                        .values()
                        .filter_map(|w| w.outputs.as_object().cloned())
                        .flatten()
                        .collect();
                    ex.outputs = Value::Object(merged);
                }
            }
            EventKind::StepFailed { step_id, error } => {
                if let Some(ex) = next.executions.get_mut(step_id) {
                    ex.status = ExecutionStatus::Failed;
                    ex.completed_at = Some(event.ts);
                    ex.duration_ms = ex.started_at.map(|s| (event.ts - s).num_milliseconds());
                    ex.error = Some(error.clone());
                }
            }
            EventKind::StepSkipped { step_id, reason } => {
                if let Some(ex) = next.executions.get_mut(step_id) {
                    ex.status = ExecutionStatus::Skipped;
                    ex.completed_at = Some(event.ts);
                    ex.error = Some(reason.clone());
                }
            }
            EventKind::WorkStarted { step_id, token, inputs } => {
                let ex = next.executions.entry(step_id.clone()).or_insert_with(ExecutionState::pending);
                let w = ex.work_items.entry(token.clone()).or_insert_with(WorkState::pending);
                w.status = WorkStatus::Active;
                w.started_at = Some(event.ts);
                w.inputs = inputs.clone();
            }
            EventKind::WorkCompleted { step_id, token, outputs } => {
                if let Some(ex) = next.executions.get_mut(step_id) {
                    if let Some(w) = ex.work_items.get_mut(token) {
                        w.status = WorkStatus::Succeeded;
                        w.completed_at = Some(event.ts);
                        w.outputs = outputs.clone();
                    }
                }
            }
            EventKind::WorkFailed { step_id, token, error, retryable: _ } => {
                if let Some(ex) = next.executions.get_mut(step_id) {
                    if let Some(w) = ex.work_items.get_mut(token) {
                        w.status = WorkStatus::Failed;
                        w.completed_at = Some(event.ts);
                        w.error = Some(error.clone());
                    }
                }
            }
            EventKind::RetryScheduled { step_id, token, attempt, next_attempt_at } => {
                if let Some(ex) = next.executions.get_mut(step_id) {
                    if let Some(w) = ex.work_items.get_mut(token) {
                        w.status = WorkStatus::Pending;
                        w.retry_count = *attempt;
                        w.next_retry_at = Some(*next_attempt_at);
                    }
                }
            }
            EventKind::StepRegistered { .. }
            | EventKind::StepUnregistered { .. }
            | EventKind::StepHealthChanged { .. } => {
                // Eventos del catálogo; no afectan la proyección de un flujo.
            }
        }

        Arc::new(next)
    }
}
