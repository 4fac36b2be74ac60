//! Compilador `(goals, initial_args, catalog) -> ExecutionPlan` (§4.3).
//!
//! Determinista: toda iteración que afecta al plan resultante ocurre sobre
//! una lista de claves pre-ordenada. El resultado se cachea por
//! `(sorted goals, sorted supplied input names, catalog content hash)` —
//! ver `PlanCache`.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PlanningError;
use crate::event::EventStore;
use crate::hashing::hash_value;
use crate::ids::StepId;
use crate::model::Step;
use crate::catalog::StepCatalog;

pub const MAX_GOALS: usize = 64;
pub const MAX_INITIAL_ARGS: usize = 128;

/// Productores/consumidores de un nombre de atributo dentro de un plan ya
/// compilado (a diferencia de `catalog::AttributeGraph`, restringido a los
/// steps incluidos en este plan).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeProviders {
    pub producers: Vec<StepId>,
    pub consumers: Vec<StepId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Excluded {
    /// Steps cuyos outputs ya estaban completamente en `initial_args`.
    pub satisfied: Vec<StepId>,
    /// Steps descartados porque al menos un input requerido no tenía
    /// productor y no fue suministrado.
    pub missing: Vec<StepId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub goals: Vec<StepId>,
    pub required: Vec<String>,
    pub steps: IndexMap<StepId, Step>,
    pub attributes: IndexMap<String, AttributeProviders>,
    pub excluded: Excluded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Included,
    Satisfied,
    Missing,
}

/// Compila un `ExecutionPlan` (sin cache). Ver `plan_cached` para la
/// variante memoizada usada por el runtime.
pub fn plan<E: EventStore>(
    goals: &[StepId],
    initial_args: &IndexMap<String, Value>,
    catalog: &StepCatalog<E>,
) -> Result<ExecutionPlan, PlanningError> {
    if goals.is_empty() {
        return Err(PlanningError::NoGoals);
    }
    if goals.len() > MAX_GOALS {
        return Err(PlanningError::TooManyGoals);
    }
    if initial_args.len() > MAX_INITIAL_ARGS {
        return Err(PlanningError::TooManyInitialArgs);
    }

    let mut sorted_goals: Vec<StepId> = goals.to_vec();
    sorted_goals.sort();
    sorted_goals.dedup();

    let unknown: Vec<StepId> =
        sorted_goals.iter().filter(|g| catalog.lookup(g).is_none()).cloned().collect();
    if !unknown.is_empty() {
        return Err(PlanningError::UnknownGoals(unknown));
    }

    let mut decisions: HashMap<StepId, Decision> = HashMap::new();
    let mut visiting: HashSet<StepId> = HashSet::new();
    let mut steps_cache: HashMap<StepId, Step> = HashMap::new();

    for goal in &sorted_goals {
        resolve(goal, catalog, initial_args, &mut decisions, &mut visiting, &mut steps_cache);
    }

    let mut included: Vec<StepId> =
        decisions.iter().filter(|(_, d)| **d == Decision::Included).map(|(id, _)| id.clone()).collect();
    included.sort();

    let mut satisfied: Vec<StepId> =
        decisions.iter().filter(|(_, d)| **d == Decision::Satisfied).map(|(id, _)| id.clone()).collect();
    satisfied.sort();

    let mut missing: Vec<StepId> =
        decisions.iter().filter(|(_, d)| **d == Decision::Missing).map(|(id, _)| id.clone()).collect();
    missing.sort();

    // Cualquier meta que haya terminado `Missing` es un goal irresoluble:
    // reportamos los nombres de input que lo bloquearon.
    let unsatisfiable: Vec<String> = sorted_goals
        .iter()
        .filter(|g| decisions.get(*g) == Some(&Decision::Missing))
        .flat_map(|g| {
            let step = steps_cache.get(g).expect("resolved step cached");
            step.required_and_optional_inputs()
                .filter(|a| a.role == flowgraph_attributes::Role::Required)
                .filter(|a| {
                    !initial_args.contains_key(&a.name)
                        && catalog.producers_of(&a.name).is_empty()
                })
                .map(|a| a.name.clone())
        })
        .collect();
    if !unsatisfiable.is_empty() {
        return Err(PlanningError::UnsatisfiableGoal(unsatisfiable));
    }

    let steps: IndexMap<StepId, Step> =
        included.iter().map(|id| (id.clone(), steps_cache.get(id).expect("included step cached").clone())).collect();

    check_acyclic(&steps)?;

    let attributes = build_attribute_graph(&steps);

    let mut required: Vec<String> = attributes
        .iter()
        .filter(|(name, edges)| edges.producers.is_empty() && !initial_args.contains_key(*name))
        .map(|(name, _)| name.clone())
        .collect();
    required.sort();
    required.dedup();

    Ok(ExecutionPlan {
        goals: sorted_goals,
        required,
        steps,
        attributes,
        excluded: Excluded { satisfied, missing },
    })
}

/// Resuelve recursivamente si un step debe incluirse, excluirse por estar
/// satisfecho externamente, o excluirse por tener un input requerido sin
/// productor (y cascada transitivamente a sus consumidores vía la propia
/// recursión: si un productor resuelve `Missing`, el consumidor que
/// dependía de él también lo hace).
fn resolve<E: EventStore>(
    id: &StepId,
    catalog: &StepCatalog<E>,
    initial_args: &IndexMap<String, Value>,
    decisions: &mut HashMap<StepId, Decision>,
    visiting: &mut HashSet<StepId>,
    steps_cache: &mut HashMap<StepId, Step>,
) -> Decision {
    if let Some(d) = decisions.get(id) {
        return *d;
    }
    // Una definición mutuamente recursiva se trataría aquí como "missing"
    // para terminar la recursión; el paso 4 (chequeo de ciclos) rechaza el
    // plan de todas formas si el ciclo sobrevive entre steps incluidos.
    if visiting.contains(id) {
        return Decision::Missing;
    }
    let step = match catalog.lookup(id) {
        Some(s) => s,
        None => {
            decisions.insert(id.clone(), Decision::Missing);
            return Decision::Missing;
        }
    };
    steps_cache.insert(id.clone(), step.clone());
    visiting.insert(id.clone());

    let outputs: Vec<_> = step.outputs().collect();
    if !outputs.is_empty() && outputs.iter().all(|o| initial_args.contains_key(&o.name)) {
        visiting.remove(id);
        decisions.insert(id.clone(), Decision::Satisfied);
        return Decision::Satisfied;
    }

    let mut inputs: Vec<_> = step.required_and_optional_inputs().cloned().collect();
    inputs.sort_by(|a, b| a.name.cmp(&b.name));

    let mut missing = false;
    for input in &inputs {
        if initial_args.contains_key(&input.name) {
            continue;
        }
        let mut producers = catalog.producers_of(&input.name);
        producers.sort();

        match input.role {
            flowgraph_attributes::Role::Required => {
                if producers.is_empty() {
                    missing = true;
                    continue;
                }
                for p in &producers {
                    if resolve(p, catalog, initial_args, decisions, visiting, steps_cache) == Decision::Missing {
                        missing = true;
                    }
                }
            }
            flowgraph_attributes::Role::Optional => {
                for p in &producers {
                    if !visiting.contains(p) {
                        resolve(p, catalog, initial_args, decisions, visiting, steps_cache);
                    }
                }
            }
            flowgraph_attributes::Role::Const => {}
            flowgraph_attributes::Role::Output => {}
        }
    }

    visiting.remove(id);
    let decision = if missing { Decision::Missing } else { Decision::Included };
    decisions.insert(id.clone(), decision);
    decision
}

/// Grafo de precedencia a nivel de step: `A -> B` si `B` consume un output
/// de `A`, restringido a los steps incluidos en el plan. Rechaza el plan si
/// contiene un ciclo (§4.3 paso 4).
fn check_acyclic(steps: &IndexMap<StepId, Step>) -> Result<(), PlanningError> {
    let mut producers_by_attr: HashMap<&str, Vec<&StepId>> = HashMap::new();
    for (id, step) in steps {
        for out in step.outputs() {
            producers_by_attr.entry(out.name.as_str()).or_default().push(id);
        }
    }

    let mut edges: HashMap<&StepId, Vec<&StepId>> = HashMap::new();
    for (id, step) in steps {
        for input in step.required_and_optional_inputs() {
            if let Some(producers) = producers_by_attr.get(input.name.as_str()) {
                for p in producers {
                    edges.entry(p).or_default().push(id);
                }
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&StepId, Mark> = HashMap::new();
    let mut stack: Vec<&StepId> = Vec::new();

    fn visit<'a>(
        node: &'a StepId,
        edges: &HashMap<&'a StepId, Vec<&'a StepId>>,
        marks: &mut HashMap<&'a StepId, Mark>,
        stack: &mut Vec<&'a StepId>,
    ) -> Option<Vec<StepId>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let pos = stack.iter().position(|s| *s == node).unwrap_or(0);
                return Some(stack[pos..].iter().map(|s| (*s).clone()).collect());
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        if let Some(next) = edges.get(node) {
            let mut next_sorted = next.clone();
            next_sorted.sort();
            for n in next_sorted {
                if let Some(cycle) = visit(n, edges, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut ids: Vec<&StepId> = steps.keys().collect();
    ids.sort();
    for id in ids {
        if let Some(cycle) = visit(id, &edges, &mut marks, &mut stack) {
            return Err(PlanningError::CycleDetected(cycle));
        }
    }
    Ok(())
}

fn build_attribute_graph(steps: &IndexMap<StepId, Step>) -> IndexMap<String, AttributeProviders> {
    let mut names: HashSet<String> = HashSet::new();
    for step in steps.values() {
        for a in &step.attributes {
            names.insert(a.name.clone());
        }
    }
    let mut sorted_names: Vec<String> = names.into_iter().collect();
    sorted_names.sort();

    let mut out = IndexMap::new();
    for name in sorted_names {
        let mut producers = Vec::new();
        let mut consumers = Vec::new();
        for (id, step) in steps {
            if step.outputs().any(|o| o.name == name) {
                producers.push(id.clone());
            }
            if step.required_and_optional_inputs().any(|i| i.name == name) {
                consumers.push(id.clone());
            }
        }
        producers.sort();
        consumers.sort();
        out.insert(name, AttributeProviders { producers, consumers });
    }
    out
}

/// Clave de cache del plan: `(goals ordenados, nombres de input suministrados
/// ordenados, hash de contenido del catálogo)`.
fn cache_key(goals: &[StepId], initial_args: &IndexMap<String, Value>, catalog_hash: &str) -> String {
    let mut sorted_goals: Vec<String> = goals.iter().map(|g| g.to_string()).collect();
    sorted_goals.sort();
    let mut names: Vec<String> = initial_args.keys().cloned().collect();
    names.sort();
    hash_value(&serde_json::json!({
        "goals": sorted_goals,
        "supplied": names,
        "catalog_hash": catalog_hash,
    }))
}

/// Cache del planner keyed por `(goals, nombres de input, hash de catálogo)`
/// (§4.3: "planner output is cached per (sorted goals, sorted supplied input
/// names, catalog content hash)").
#[derive(Default)]
pub struct PlanCache {
    entries: DashMap<String, Arc<Result<ExecutionPlan, PlanningError>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan_cached<E: EventStore>(
        &self,
        goals: &[StepId],
        initial_args: &IndexMap<String, Value>,
        catalog: &StepCatalog<E>,
    ) -> Arc<Result<ExecutionPlan, PlanningError>> {
        let key = cache_key(goals, initial_args, &catalog.content_hash());
        if let Some(hit) = self.entries.get(&key) {
            return hit.clone();
        }
        let computed = Arc::new(plan(goals, initial_args, catalog));
        self.entries.insert(key, computed.clone());
        computed
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_attributes::{AttrType, AttributeSpec, Role};
    use crate::event::InMemoryEventStore;
    use crate::model::{HttpConfig, ScriptConfig, Step, StepType, WorkConfig};

    fn step_producing(id: &str, output: &str, inputs: Vec<AttributeSpec>) -> Step {
        let mut attrs = inputs;
        attrs.push(AttributeSpec::new(output, Role::Output, AttrType::Number));
        Step {
            id: StepId::new(id),
            name: id.to_string(),
            step_type: StepType::Sync,
            attributes: attrs,
            http: Some(HttpConfig { endpoint: "http://x".into(), timeout_ms: 1000, webhook_url: None }),
            script: None,
            flow: None,
            predicate: None,
            work_config: WorkConfig::default(),
            labels: Default::default(),
            memoizable: false,
        }
    }

    fn catalog_with(steps: Vec<Step>) -> StepCatalog<InMemoryEventStore> {
        let catalog = StepCatalog::new(Arc::new(InMemoryEventStore::new()));
        for s in steps {
            catalog.register(s).unwrap();
        }
        catalog
    }

    #[test]
    fn linear_pipeline_without_initial_args_requires_upstream_input() {
        let a = step_producing("a", "x", vec![AttributeSpec::new("raw", Role::Required, AttrType::Number)]);
        let b = step_producing("b", "y", vec![AttributeSpec::new("x", Role::Required, AttrType::Number)]);
        let catalog = catalog_with(vec![a, b]);
        let plan = plan(&[StepId::new("b")], &IndexMap::new(), &catalog).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.required, vec!["raw".to_string()]);
    }

    #[test]
    fn satisfied_pruning_excludes_producer_whose_output_is_supplied() {
        let a = step_producing("a", "x", vec![]);
        let b = step_producing("b", "y", vec![AttributeSpec::new("x", Role::Required, AttrType::Number)]);
        let catalog = catalog_with(vec![a, b]);
        let mut init = IndexMap::new();
        init.insert("x".to_string(), serde_json::json!(42));
        let plan = plan(&[StepId::new("b")], &init, &catalog).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert!(plan.steps.contains_key(&StepId::new("b")));
        assert_eq!(plan.excluded.satisfied, vec![StepId::new("a")]);
        assert!(plan.required.is_empty());
    }

    #[test]
    fn unsatisfiable_required_input_is_reported() {
        let b = step_producing("b", "y", vec![AttributeSpec::new("missing", Role::Required, AttrType::Number)]);
        let catalog = catalog_with(vec![b]);
        let err = plan(&[StepId::new("b")], &IndexMap::new(), &catalog).unwrap_err();
        assert_eq!(err, PlanningError::UnsatisfiableGoal(vec!["missing".to_string()]));
    }

    #[test]
    fn zero_goals_is_rejected() {
        let catalog = catalog_with(vec![]);
        assert_eq!(plan(&[], &IndexMap::new(), &catalog).unwrap_err(), PlanningError::NoGoals);
    }

    #[test]
    fn plan_is_deterministic_across_runs() {
        let a = step_producing("a", "x", vec![AttributeSpec::new("raw", Role::Required, AttrType::Number)]);
        let b = step_producing("b", "y", vec![AttributeSpec::new("x", Role::Required, AttrType::Number)]);
        let catalog = catalog_with(vec![a, b]);
        let p1 = plan(&[StepId::new("b")], &IndexMap::new(), &catalog).unwrap();
        let p2 = plan(&[StepId::new("b")], &IndexMap::new(), &catalog).unwrap();
        assert_eq!(serde_json::to_value(&p1).unwrap(), serde_json::to_value(&p2).unwrap());
    }

    #[test]
    fn cycle_between_two_steps_is_rejected() {
        // a produces "u" consuming "v"; b produces "v" consuming "u" -> cycle.
        let a = step_producing("a", "u", vec![AttributeSpec::new("v", Role::Required, AttrType::Number)]);
        let b = step_producing("b", "v", vec![AttributeSpec::new("u", Role::Required, AttrType::Number)]);
        let catalog = catalog_with(vec![a, b]);
        let err = plan(&[StepId::new("a")], &IndexMap::new(), &catalog).unwrap_err();
        assert!(matches!(err, PlanningError::CycleDetected(_) | PlanningError::UnsatisfiableGoal(_)));
    }

    #[test]
    fn unknown_goal_is_rejected() {
        let catalog = catalog_with(vec![]);
        let err = plan(&[StepId::new("ghost")], &IndexMap::new(), &catalog).unwrap_err();
        assert_eq!(err, PlanningError::UnknownGoals(vec![StepId::new("ghost")]));
    }

    #[test]
    fn too_many_goals_is_rejected() {
        let catalog = catalog_with(vec![]);
        let goals: Vec<StepId> = (0..(MAX_GOALS + 1)).map(|i| StepId::new(format!("g{i}"))).collect();
        assert_eq!(plan(&goals, &IndexMap::new(), &catalog).unwrap_err(), PlanningError::TooManyGoals);
    }

    #[test]
    fn plan_cache_hits_on_identical_key() {
        let a = step_producing("a", "x", vec![]);
        let catalog = catalog_with(vec![a]);
        let cache = PlanCache::new();
        let p1 = cache.plan_cached(&[StepId::new("a")], &IndexMap::new(), &catalog);
        let p2 = cache.plan_cached(&[StepId::new("a")], &IndexMap::new(), &catalog);
        assert!(Arc::ptr_eq(&p1, &p2));
    }
}
