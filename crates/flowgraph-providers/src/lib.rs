//! flowgraph-providers: resuelve `StepType -> Handler` (§9 "Polymorphism
//! over step types").
//!
//! El dispatcher y el flow runtime de `flowgraph-core` sólo conocen el
//! trait `HandlerResolver`; `HandlerRegistry` es la implementación de
//! producción, poblada una vez al arrancar el proceso con los handlers
//! concretos de `flowgraph-handlers`. El mismo patrón de indirección que
//! `chem-providers` aplica para sus proveedores externos de propiedades.
use std::sync::Arc;

use dashmap::DashMap;
use flowgraph_core::{Handler, HandlerResolver, Step, StepType};

/// Registro de handlers por `StepType`. Un `StepType` sin handler
/// registrado hace que `resolve` devuelva `None`; el flow runtime traduce
/// eso en un `DispatchError::ScriptError` terminal para ese work item,
/// nunca en un panic.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<StepType, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, step_type: StepType, handler: Arc<dyn Handler>) {
        self.handlers.insert(step_type, handler);
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, step: &Step) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&step.step_type).map(|h| h.clone())
    }
}
