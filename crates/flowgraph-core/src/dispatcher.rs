//! El dispatcher: traduce un step listo en invocaciones de handler (§4.6).
//!
//! Contrato de polimorfismo (§9 "Polymorphism over step types"): el
//! `Handler` expone una única capacidad (`invoke`) sobre la terna
//! materialize/invoke/interpret descrita en la especificación — materializar
//! argumentos y traducir el resultado son responsabilidad neutral de este
//! módulo (no varían por tipo de step), sólo la *invocación* varía, y por eso
//! es lo único que el trait expone; las cuatro variantes (`HttpSync`,
//! `HttpAsync`, `Script`, `SubFlow`) viven en `flowgraph-handlers`.
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use flowgraph_attributes::Role;

use crate::errors::DispatchError;
use crate::ids::{FlowId, StepId, Token};
use crate::model::Step;
use crate::state::FlowState;

/// Metadatos que acompañan cada invocación de handler (§6 "metadata").
#[derive(Debug, Clone)]
pub struct DispatchMetadata {
    pub flow_id: FlowId,
    pub step_id: StepId,
    pub work_token: Token,
    pub receipt_token: Option<String>,
    pub webhook_url: Option<String>,
    pub parent_flow_id: Option<FlowId>,
    pub parent_step_id: Option<StepId>,
    pub parent_work_item_token: Option<Token>,
}

/// Resultado neutral de una invocación, previo a traducirse en eventos
/// (§4.6 paso 5/6).
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub success: bool,
    pub outputs: Value,
    pub error: Option<String>,
}

/// La única operación que varía por tipo de step: invocar el colaborador
/// externo (HTTP, script runtime, o motor anidado) con los argumentos ya
/// materializados.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(&self, step: &Step, args: Value, meta: DispatchMetadata) -> Result<HandlerOutcome, DispatchError>;
}

/// Evalúa scripts de predicado y de mapeo (§4.1, §4.6). Colaborador externo
/// fuera de alcance (Ale/Lua/JPath, spec.md §1) — el dispatcher sólo conoce
/// este contrato mínimo.
pub trait ScriptRunner: Send + Sync {
    fn eval_predicate(&self, script: &str, args: &Value) -> Result<bool, DispatchError>;
    fn eval_mapping(&self, script: &str, value: &Value) -> Result<Value, DispatchError>;
}

/// Runner por defecto para flujos sin scripts de mapeo/predicado: el
/// predicado siempre es verdadero, el mapeo es la identidad.
pub struct NoopScriptRunner;

impl ScriptRunner for NoopScriptRunner {
    fn eval_predicate(&self, _script: &str, _args: &Value) -> Result<bool, DispatchError> {
        Ok(true)
    }
    fn eval_mapping(&self, _script: &str, value: &Value) -> Result<Value, DispatchError> {
        Ok(value.clone())
    }
}

/// Un step está listo cuando (§4.6):
/// - todo input `required` tiene valor en `FlowState.attributes`;
/// - no existe ya una ejecución terminal para (flow, step).
///
/// La condición sobre inputs `for_each` totalmente materializados se
/// satisface trivialmente aquí: los valores de `FlowState.attributes` nunca
/// son futuros, sólo JSON ya resuelto.
pub fn is_ready(step: &Step, flow: &FlowState) -> bool {
    if flow.executions.get(&step.id).map(|e| e.status.is_terminal()).unwrap_or(false) {
        return false;
    }
    step.required_and_optional_inputs()
        .filter(|a| a.role == Role::Required)
        .all(|a| flow.attributes.contains_key(&a.name))
}

/// Materializa los argumentos de entrada de un step: resuelve cada atributo
/// a su valor (flujo, default `const`, o default `optional`), y aplica el
/// script de mapeo si existe. Usa nombres externos (`Mapping.name`) como
/// claves del payload saliente (§4.6 "Argument mapping contract").
pub fn materialize_args(
    step: &Step,
    flow: &FlowState,
    runner: &dyn ScriptRunner,
) -> Result<IndexMap<String, Value>, DispatchError> {
    let mut out = IndexMap::new();
    for attr in step.required_and_optional_inputs() {
        let resolved = match attr.role {
            Role::Const => attr.default.clone(),
            _ => flow.attributes.get(&attr.name).map(|a| a.value.clone()).or_else(|| attr.default.clone()),
        };
        let Some(value) = resolved else { continue };
        let value = match attr.mapping.as_ref().and_then(|m| m.script.as_deref()) {
            Some(script) => runner.eval_mapping(script, &value)?,
            None => value,
        };
        out.insert(attr.external_name().to_string(), value);
    }
    Ok(out)
}

pub fn evaluate_predicate(step: &Step, args: &Value, runner: &dyn ScriptRunner) -> Result<bool, DispatchError> {
    match &step.predicate {
        Some(p) => runner.eval_predicate(&p.body, args),
        None => Ok(true),
    }
}

/// Un work item por combinación del producto cartesiano de los inputs
/// `for_each` (ordenados por nombre, §4.6 paso 3).
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub token: Token,
    pub args: Value,
    pub indices: Vec<(String, usize)>,
}

/// Calcula los work items de un step ya materializado. Un step sin
/// `for_each` produce exactamente un work item con `Token::singleton()`.
/// `for_each` sobre un array vacío produce cero work items (§8 boundary).
pub fn fan_out(step: &Step, materialized: &IndexMap<String, Value>) -> Vec<WorkItem> {
    let mut names: Vec<String> = step.for_each_inputs().map(|a| a.external_name().to_string()).collect();
    names.sort();

    let args_value = Value::Object(materialized.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

    if names.is_empty() {
        return vec![WorkItem { token: Token::singleton(), args: args_value, indices: vec![] }];
    }

    let arrays: Vec<(String, Vec<Value>)> = names
        .iter()
        .map(|n| (n.clone(), materialized.get(n).and_then(|v| v.as_array()).cloned().unwrap_or_default()))
        .collect();

    if arrays.iter().any(|(_, a)| a.is_empty()) {
        return vec![];
    }

    let mut combos: Vec<Vec<(String, usize)>> = vec![vec![]];
    for (name, arr) in &arrays {
        let mut next = Vec::with_capacity(combos.len() * arr.len());
        for combo in &combos {
            for idx in 0..arr.len() {
                let mut extended = combo.clone();
                extended.push((name.clone(), idx));
                next.push(extended);
            }
        }
        combos = next;
    }

    combos
        .into_iter()
        .map(|indices| {
            let mut args = materialized.clone();
            for (name, idx) in &indices {
                if let Some(arr) = materialized.get(name).and_then(|v| v.as_array()) {
                    args.insert(name.clone(), arr[*idx].clone());
                }
            }
            let token = Token::for_combination(&step.id, &indices);
            let args_value = Value::Object(args.into_iter().collect());
            WorkItem { token, args: args_value, indices }
        })
        .collect()
}

/// Resuelve el `Handler` correspondiente a un step (`StepType -> Handler`,
/// §9 "Polymorphism over step types"). Implementado por
/// `flowgraph-providers::HandlerRegistry`; el dispatcher y el flow runtime
/// sólo dependen de este contrato, nunca de los handlers concretos.
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, step: &Step) -> Option<std::sync::Arc<dyn Handler>>;
}

/// Traduce outputs crudos recibidos del handler (en nombres externos) a
/// nombres internos de atributo, aplicando el script de mapeo inverso si
/// corresponde (§4.6 "Argument mapping contract").
pub fn translate_outputs(
    step: &Step,
    raw_outputs: &Value,
    runner: &dyn ScriptRunner,
) -> Result<IndexMap<String, Value>, DispatchError> {
    let obj = raw_outputs.as_object();
    let mut out = IndexMap::new();
    for attr in step.outputs() {
        let external = attr.external_name();
        let Some(value) = obj.and_then(|o| o.get(external)) else { continue };
        let value = match attr.mapping.as_ref().and_then(|m| m.script.as_deref()) {
            Some(script) => runner.eval_mapping(script, value)?,
            None => value.clone(),
        };
        out.insert(attr.name.clone(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_attributes::{AttrType, AttributeSpec};
    use serde_json::json;

    use crate::model::{HttpConfig, StepType, WorkConfig};

    fn step_with_for_each(name: &str) -> Step {
        Step {
            id: StepId::new("fanout"),
            name: name.to_string(),
            step_type: StepType::Sync,
            attributes: vec![
                AttributeSpec::new("items", Role::Required, AttrType::Array).with_for_each(true),
                AttributeSpec::new("out", Role::Output, AttrType::Number),
            ],
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
    fn fan_out_produces_one_item_per_array_element() {
        let step = step_with_for_each("fanout");
        let mut args = IndexMap::new();
        args.insert("items".to_string(), json!([1, 2, 3]));
        let items = fan_out(&step, &args);
        assert_eq!(items.len(), 3);
        let tokens: std::collections::HashSet<_> = items.iter().map(|i| i.token.clone()).collect();
        assert_eq!(tokens.len(), 3, "tokens must be distinct per combination");
    }

    #[test]
    fn fan_out_over_empty_array_yields_zero_work_items() {
        let step = step_with_for_each("fanout");
        let mut args = IndexMap::new();
        args.insert("items".to_string(), json!([]));
        assert!(fan_out(&step, &args).is_empty());
    }

    #[test]
    fn step_without_for_each_yields_single_implicit_work_item() {
        let step = Step {
            id: StepId::new("s"),
            name: "s".into(),
            step_type: StepType::Sync,
            attributes: vec![AttributeSpec::new("x", Role::Required, AttrType::Number)],
            http: Some(HttpConfig { endpoint: "http://x".into(), timeout_ms: 1000, webhook_url: None }),
            script: None,
            flow: None,
            predicate: None,
            work_config: WorkConfig::default(),
            labels: Default::default(),
            memoizable: false,
        };
        let mut args = IndexMap::new();
        args.insert("x".to_string(), json!(1));
        let items = fan_out(&step, &args);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].token, Token::singleton());
    }

    #[test]
    fn fan_out_token_is_deterministic_across_calls() {
        let step = step_with_for_each("fanout");
        let mut args = IndexMap::new();
        args.insert("items".to_string(), json!([10, 20]));
        let first = fan_out(&step, &args);
        let second = fan_out(&step, &args);
        assert_eq!(first.iter().map(|i| i.token.clone()).collect::<Vec<_>>(),
                   second.iter().map(|i| i.token.clone()).collect::<Vec<_>>());
    }
}
