//! Definición neutral de un `Step` (§3).
//!
//! Exactamente uno de `http`/`script`/`flow` está presente, elegido por
//! `step_type`. El *content hash* cubre `(type, attributes, http, script,
//! flow, predicate, work_config, memoizable)` — `id`/`name`/`labels` quedan
//! fuera a propósito: renombrar o etiquetar un step no debe invalidar planes
//! ni fingerprints que dependan de su identidad de contenido.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use flowgraph_attributes::AttributeSpec;

use crate::hashing::hash_value;
use crate::ids::StepId;
use crate::model::work_config::WorkConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Sync,
    Async,
    Script,
    Flow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub endpoint: String,
    /// Timeout por llamada en milisegundos; mapea a `HTTPConfig.Timeout`.
    pub timeout_ms: u64,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubFlowConfig {
    pub goals: Vec<StepId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    pub step_type: StepType,
    pub attributes: Vec<AttributeSpec>,
    pub http: Option<HttpConfig>,
    pub script: Option<ScriptConfig>,
    pub flow: Option<SubFlowConfig>,
    /// Script booleano opcional evaluado antes del dispatch (§4.6 paso 2).
    pub predicate: Option<ScriptConfig>,
    pub work_config: WorkConfig,
    pub labels: HashMap<String, String>,
    pub memoizable: bool,
}

impl Step {
    /// Hash de contenido estable, excluyendo `id`, `name` y `labels`.
    pub fn content_hash(&self) -> String {
        let value = serde_json::json!({
            "step_type": self.step_type,
            "attributes": self.attributes,
            "http": self.http,
            "script": self.script,
            "flow": self.flow,
            "predicate": self.predicate,
            "work_config": self.work_config,
            "memoizable": self.memoizable,
        });
        hash_value(&value)
    }

    pub fn required_and_optional_inputs(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attributes.iter().filter(|a| a.role.is_input())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attributes.iter().filter(|a| a.role.is_output())
    }

    pub fn for_each_inputs(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attributes.iter().filter(|a| a.role.is_input() && a.for_each)
    }
}
