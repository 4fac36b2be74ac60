//! Errores de validación del modelo de atributos.
//!
//! Cada modo de fallo descrito en la especificación (§4.1) tiene su propia
//! variante nombrada; la validación es pura y nunca realiza I/O.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AttributeError {
    #[error("unrecognized role")]
    InvalidRole,
    #[error("unrecognized type")]
    InvalidType,
    #[error("default value is not allowed for this role")]
    DefaultNotAllowed,
    #[error("a default value is required for this role")]
    DefaultRequired,
    #[error("for_each requires an array or any type")]
    ForEachRequiresArray,
    #[error("for_each is not allowed on output attributes")]
    ForEachNotAllowedOutput,
    #[error("mapping is not allowed for const attributes")]
    MappingNotAllowed,
    #[error("default value does not parse as valid json for its declared type")]
    InvalidDefaultValue,
    #[error("mapped external name '{0}' is used by more than one attribute in the same namespace")]
    DuplicateInnerName(String),
}
