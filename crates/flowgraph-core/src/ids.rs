//! Identificadores opacos del motor: `StepId`, `FlowId`, `Token`.
//!
//! Todos son strings de propósito general; `FlowId` exige sanitización
//! (minúsculas, `[a-z0-9-]`, longitud <= 256) porque aparece en rutas de
//! aggregate del event log y en endpoints externos.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hashing::hash_str;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        StepId(s.to_string())
    }
}

/// Máxima longitud permitida para un `FlowId` sanitizado.
pub const FLOW_ID_MAX_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub String);

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum FlowIdError {
    #[error("flow id exceeds {FLOW_ID_MAX_LEN} characters")]
    TooLong,
    #[error("flow id is empty after sanitization")]
    Empty,
}

impl FlowId {
    /// Sanitiza un id crudo: minúsculas, y sólo conserva `[a-z0-9-]`.
    /// Rechaza resultados vacíos o demasiado largos.
    pub fn sanitize(raw: &str) -> Result<Self, FlowIdError> {
        let lowered = raw.to_lowercase();
        let filtered: String = lowered.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect();
        if filtered.is_empty() {
            return Err(FlowIdError::Empty);
        }
        if filtered.len() > FLOW_ID_MAX_LEN {
            return Err(FlowIdError::TooLong);
        }
        Ok(FlowId(filtered))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identificador de un work item dentro de una ejecución de step.
///
/// Determinista: hash de `(step_id, índices ordenados de fan-out)`. Un step
/// sin inputs `for_each` tiene un único work item implícito con
/// `Token = "∅"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token(pub String);

impl Token {
    pub const EMPTY: &'static str = "\u{2205}";

    /// Work item único para steps sin fan-out.
    pub fn singleton() -> Self {
        Token(Self::EMPTY.to_string())
    }

    /// Token determinista para una combinación de índices de fan-out.
    pub fn for_combination(step_id: &StepId, indices: &[(String, usize)]) -> Self {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let payload = serde_json::json!({
            "step_id": step_id.as_str(),
            "indices": sorted,
        });
        Token(hash_str(&crate::hashing::to_canonical_json(&payload)))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_lowercase_and_strips_invalid_chars() {
        let id = FlowId::sanitize("My Flow_42!").unwrap();
        assert_eq!(id.as_str(), "myflow42");
    }

    #[test]
    fn rejects_empty_after_sanitization() {
        assert_eq!(FlowId::sanitize("!!!"), Err(FlowIdError::Empty));
    }

    #[test]
    fn rejects_too_long() {
        let raw = "a".repeat(300);
        assert_eq!(FlowId::sanitize(&raw), Err(FlowIdError::TooLong));
    }

    #[test]
    fn token_is_deterministic() {
        let step = StepId::new("fanout-step");
        let idx = vec![("items".to_string(), 1usize)];
        let a = Token::for_combination(&step, &idx);
        let b = Token::for_combination(&step, &idx);
        assert_eq!(a, b);
    }
}
