//! `EngineState`: proyección proceso-wide sobre eventos del catálogo (§4.5).
//!
//! Separado de `StepCatalog`: el catálogo es la fuente mutable autoritativa
//! usada por el planner; `EngineState` es su espejo derivado del event log,
//! consumido por observadores externos (UI) vía suscripción, incluyendo el
//! campo `HealthState` alimentado por `step_health_changed` (§9 "ambient
//! stack additions" — no hay prober activo, sólo la proyección).
use std::sync::Arc;

use indexmap::IndexMap;

use crate::event::{EventKind, FlowEvent};
use crate::ids::StepId;

#[derive(Debug, Clone, PartialEq)]
pub struct HealthState {
    pub healthy: bool,
    pub detail: Option<String>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self { healthy: true, detail: None }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub registered: IndexMap<StepId, String>,
    pub health: IndexMap<StepId, HealthState>,
}

impl EngineState {
    pub fn apply(self: &Arc<Self>, event: &FlowEvent) -> Arc<Self> {
        let mut next = (**self).clone();
        match &event.kind {
            EventKind::StepRegistered { step_id, content_hash } => {
                next.registered.insert(step_id.clone(), content_hash.clone());
            }
            EventKind::StepUnregistered { step_id } => {
                next.registered.shift_remove(step_id);
                next.health.shift_remove(step_id);
            }
            EventKind::StepHealthChanged { step_id, healthy, detail } => {
                next.health.insert(step_id.clone(), HealthState { healthy: *healthy, detail: detail.clone() });
            }
            EventKind::FlowStarted { .. }
            | EventKind::FlowActivated
            | EventKind::FlowDeactivated { .. }
            | EventKind::FlowCompleted
            | EventKind::FlowFailed { .. }
            | EventKind::StepStarted { .. }
            | EventKind::StepCompleted { .. }
            | EventKind::StepFailed { .. }
            | EventKind::StepSkipped { .. }
            | EventKind::AttributeSet { .. }
            | EventKind::WorkStarted { .. }
            | EventKind::WorkCompleted { .. }
            | EventKind::WorkFailed { .. }
            | EventKind::RetryScheduled { .. } => {
                // Eventos por-flujo; no afectan la proyección de catálogo.
            }
        }
        Arc::new(next)
    }
}
