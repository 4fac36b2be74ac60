//! `AttributeSpec`: la declaración de un atributo dentro de un `Step`.
//!
//! Neutral respecto al dominio del step: sólo conoce rol, tipo, default,
//! for_each y mapping. El motor (`flowgraph-core`) resuelve los valores en
//! tiempo de ejecución; este crate sólo valida la forma estática.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attr_type::AttrType;
use crate::mapping::Mapping;
use crate::role::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub attr_type: AttrType,
    pub default: Option<Value>,
    #[serde(default)]
    pub for_each: bool,
    pub mapping: Option<Mapping>,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, role: Role, attr_type: AttrType) -> Self {
        Self { name: name.into(), role, attr_type, default: None, for_each: false, mapping: None }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_for_each(mut self, for_each: bool) -> Self {
        self.for_each = for_each;
        self
    }

    pub fn with_mapping(mut self, mapping: Mapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Nombre visible para el handler externo (ver `Mapping::external_name`).
    pub fn external_name(&self) -> &str {
        Mapping::external_name(self.mapping.as_ref(), &self.name)
    }
}
