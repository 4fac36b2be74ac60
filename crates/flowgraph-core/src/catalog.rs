//! Catálogo de steps del motor (§4.2).
//!
//! `StepCatalog` es un registro copy-on-write: lectores (`lookup`,
//! `producers_of`, `snapshot`) nunca bloquean a los escritores y viceversa
//! (`DashMap` resuelve esto por bucket). El catálogo mantiene además un
//! *attribute graph* incremental (productores/consumidores por nombre) para
//! la UI y para depuración; el planner (`crate::planner`) nunca lo consulta
//! directamente — cada plan se recalcula desde cero por determinismo (§4.2).
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};

use flowgraph_attributes::validate::validate_attribute_set;

use crate::errors::CatalogError;
use crate::event::{AggregateId, EventKind, EventStore};
use crate::ids::StepId;
use crate::model::{Step, StepType};

/// Productores/consumidores de un nombre de atributo, en orden de
/// inserción (para que la UI muestre un orden estable).
#[derive(Debug, Clone, Default)]
pub struct AttributeEdges {
    pub producers: IndexSet<StepId>,
    pub consumers: IndexSet<StepId>,
}

/// Grafo de atributos mantenido incrementalmente por el catálogo. No es
/// autoritativo para el planning (ver `crate::planner`); sirve a
/// consumidores de UI/depuración que quieren ver "quién produce X" sin
/// recompilar un plan completo.
#[derive(Default)]
pub struct AttributeGraph {
    edges: DashMap<String, AttributeEdges>,
}

impl AttributeGraph {
    fn add_step(&self, step: &Step) {
        for attr in step.outputs() {
            self.edges.entry(attr.name.clone()).or_default().producers.insert(step.id.clone());
        }
        for attr in step.required_and_optional_inputs() {
            self.edges.entry(attr.name.clone()).or_default().consumers.insert(step.id.clone());
        }
    }

    fn remove_step(&self, step: &Step) {
        for attr in step.outputs() {
            if let Some(mut edges) = self.edges.get_mut(&attr.name) {
                edges.producers.shift_remove(&step.id);
            }
        }
        for attr in step.required_and_optional_inputs() {
            if let Some(mut edges) = self.edges.get_mut(&attr.name) {
                edges.consumers.shift_remove(&step.id);
            }
        }
    }

    pub fn producers_of(&self, name: &str) -> Vec<StepId> {
        self.edges.get(name).map(|e| e.producers.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn consumers_of(&self, name: &str) -> Vec<StepId> {
        self.edges.get(name).map(|e| e.consumers.iter().cloned().collect()).unwrap_or_default()
    }
}

/// Valida las reglas de §4.2 adicionales a la validación de atributos de
/// §4.1: exactamente uno de http/script/flow presente y coherente con
/// `step_type`, endpoint/goals/script body requeridos, y backoff coherente.
pub fn validate_step(step: &Step) -> Result<(), CatalogError> {
    validate_attribute_set(&step.attributes).map_err(|source| CatalogError::InvalidAttribute {
        name: step.id.to_string(),
        source,
    })?;

    let present = [step.http.is_some(), step.script.is_some(), step.flow.is_some()];
    if present.iter().filter(|p| **p).count() != 1 {
        return Err(CatalogError::ConflictingStepKind);
    }
    match step.step_type {
        StepType::Sync | StepType::Async => {
            if step.http.is_none() {
                return Err(CatalogError::MissingHttpEndpoint);
            }
        }
        StepType::Script => {
            if step.script.as_ref().map(|s| s.body.trim().is_empty()).unwrap_or(true) {
                return Err(CatalogError::MissingScriptBody);
            }
        }
        StepType::Flow => {
            if step.flow.as_ref().map(|f| f.goals.is_empty()).unwrap_or(true) {
                return Err(CatalogError::MissingFlowGoals);
            }
        }
    }
    let kind_matches = match step.step_type {
        StepType::Sync | StepType::Async => step.http.is_some(),
        StepType::Script => step.script.is_some(),
        StepType::Flow => step.flow.is_some(),
    };
    if !kind_matches {
        return Err(CatalogError::ConflictingStepKind);
    }

    let wc = &step.work_config;
    if wc.max_backoff.map(|mb| mb < wc.backoff).unwrap_or(false) {
        return Err(CatalogError::MaxBackoffTooSmall);
    }
    Ok(())
}

/// Registro de steps del motor. Propiedad única proceso-wide junto al
/// `EventStore` que se le inyecta (§3 Ownership & lifecycle).
pub struct StepCatalog<E: EventStore> {
    steps: DashMap<StepId, Step>,
    graph: AttributeGraph,
    event_store: Arc<E>,
}

impl<E: EventStore> StepCatalog<E> {
    pub fn new(event_store: Arc<E>) -> Self {
        Self { steps: DashMap::new(), graph: AttributeGraph::default(), event_store }
    }

    /// Registra un step. Re-registrar el mismo `id` con un content hash
    /// distinto reemplaza el step (`step_unregistered` + `step_registered`);
    /// re-registrar con contenido idéntico es un no-op.
    pub fn register(&self, step: Step) -> Result<(), CatalogError> {
        validate_step(&step)?;
        let new_hash = step.content_hash();

        if let Some(existing) = self.steps.get(&step.id) {
            if existing.content_hash() == new_hash {
                return Ok(());
            }
        } else {
            self.insert_and_emit(step);
            return Ok(());
        }

        self.deregister(&step.id);
        self.insert_and_emit(step);
        Ok(())
    }

    fn insert_and_emit(&self, step: Step) {
        self.graph.add_step(&step);
        let hash = step.content_hash();
        let id = step.id.clone();
        self.steps.insert(id.clone(), step);
        self.event_store.append(AggregateId::Engine, EventKind::StepRegistered { step_id: id, content_hash: hash });
    }

    /// Desregistra un step. No afecta flujos en curso: cada flujo
    /// congela el subconjunto de steps que necesita al compilar su plan.
    pub fn deregister(&self, id: &StepId) {
        if let Some((_, step)) = self.steps.remove(id) {
            self.graph.remove_step(&step);
            self.event_store.append(AggregateId::Engine, EventKind::StepUnregistered { step_id: id.clone() });
        }
    }

    pub fn lookup(&self, id: &StepId) -> Option<Step> {
        self.steps.get(id).map(|s| s.clone())
    }

    pub fn producers_of(&self, name: &str) -> Vec<StepId> {
        self.graph.producers_of(name)
    }

    pub fn consumers_of(&self, name: &str) -> Vec<StepId> {
        self.graph.consumers_of(name)
    }

    /// Hash de contenido del catálogo completo: usado como componente de la
    /// clave de cache del planner (§4.3). Determinista: los IDs se ordenan
    /// antes de hashear.
    pub fn content_hash(&self) -> String {
        let mut pairs: Vec<(String, String)> =
            self.steps.iter().map(|e| (e.key().to_string(), e.value().content_hash())).collect();
        pairs.sort();
        crate::hashing::hash_value(&serde_json::to_value(&pairs).expect("pairs serialize"))
    }

    /// Instantánea de todos los IDs de step actualmente registrados, en
    /// orden ordenado (para iteración determinista en el planner).
    pub fn all_ids_sorted(&self) -> Vec<StepId> {
        let mut ids: Vec<StepId> = self.steps.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn snapshot_all(&self) -> IndexMap<StepId, Step> {
        let mut ids = self.all_ids_sorted();
        ids.sort();
        ids.into_iter().filter_map(|id| self.lookup(&id).map(|s| (id, s))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_attributes::{AttrType, AttributeSpec, Role};
    use crate::event::InMemoryEventStore;
    use crate::model::{HttpConfig, WorkConfig};

    fn http_step(id: &str) -> Step {
        Step {
            id: StepId::new(id),
            name: id.to_string(),
            step_type: StepType::Sync,
            attributes: vec![AttributeSpec::new("x", Role::Required, AttrType::Number)],
            http: Some(HttpConfig { endpoint: "http://x".into(), timeout_ms: 1000, webhook_url: None }),
            script: None,
            flow: None,
            predicate: None,
            work_config: WorkConfig::default(),
            labels: Default::default(),
            memoizable: false,
        }
    }

    #[test]
    fn identical_reregistration_is_noop() {
        let store = Arc::new(InMemoryEventStore::new());
        let catalog = StepCatalog::new(store.clone());
        catalog.register(http_step("a")).unwrap();
        catalog.register(http_step("a")).unwrap();
        let events = store.list(&["engine".to_string()]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn reregistration_with_new_hash_replaces() {
        let store = Arc::new(InMemoryEventStore::new());
        let catalog = StepCatalog::new(store.clone());
        catalog.register(http_step("a")).unwrap();
        let mut changed = http_step("a");
        changed.work_config.max_retries = 5;
        catalog.register(changed).unwrap();
        let events = store.list(&["engine".to_string()]);
        assert_eq!(events.len(), 3); // registered, unregistered, registered
    }

    #[test]
    fn register_deregister_register_same_hash_yields_identical_entry() {
        let store = Arc::new(InMemoryEventStore::new());
        let catalog = StepCatalog::new(store);
        let step = http_step("a");
        catalog.register(step.clone()).unwrap();
        catalog.deregister(&step.id);
        catalog.register(step.clone()).unwrap();
        assert_eq!(catalog.lookup(&step.id).unwrap().content_hash(), step.content_hash());
    }

    #[test]
    fn rejects_conflicting_step_kind() {
        let store = Arc::new(InMemoryEventStore::new());
        let catalog = StepCatalog::new(store);
        let mut step = http_step("a");
        step.script = Some(crate::model::ScriptConfig { body: "true".into() });
        assert_eq!(catalog.register(step), Err(CatalogError::ConflictingStepKind));
    }
}
