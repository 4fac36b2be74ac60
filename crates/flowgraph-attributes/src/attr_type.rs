//! Tipo declarado de un atributo y su compatibilidad con valores JSON.
//!
//! Un tipo vacío (`""` en la forma serializada, o ausente) es equivalente a
//! `Any` y acepta cualquier JSON válido.
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Null,
    Any,
}

impl AttrType {
    /// Interpreta una cadena de tipo tal como llegaría desde una definición
    /// de step serializada; una cadena vacía es `Any`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "" => Some(AttrType::Any),
            "string" => Some(AttrType::String),
            "number" => Some(AttrType::Number),
            "boolean" => Some(AttrType::Boolean),
            "object" => Some(AttrType::Object),
            "array" => Some(AttrType::Array),
            "null" => Some(AttrType::Null),
            "any" => Some(AttrType::Any),
            _ => None,
        }
    }

    /// Compatibilidad de un valor JSON concreto con este tipo.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            AttrType::Any => true,
            AttrType::String => value.is_string(),
            AttrType::Number => value.is_number(),
            AttrType::Boolean => value.is_boolean(),
            AttrType::Object => value.is_object(),
            AttrType::Array => value.is_array(),
            AttrType::Null => value.is_null(),
        }
    }

    /// Tipos compatibles con `for_each`: el valor fanned-out debe ser
    /// iterable, es decir un array, o `any` (verificado en runtime).
    pub fn supports_for_each(self) -> bool {
        matches!(self, AttrType::Array | AttrType::Any)
    }
}
