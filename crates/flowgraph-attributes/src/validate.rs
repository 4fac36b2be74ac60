//! Validador puro de especificaciones de atributos (§4.1).
//!
//! `validate_attribute` valida un único atributo en aislamiento;
//! `validate_attribute_set` además aplica la regla de unicidad de nombres
//! mapeados dentro de un mismo step, por separado para inputs y outputs (los
//! espacios de nombres de input y output son disjuntos entre sí).
use std::collections::HashSet;

use crate::attr_type::AttrType;
use crate::error::AttributeError;
use crate::role::Role;
use crate::spec::AttributeSpec;

pub fn validate_attribute(spec: &AttributeSpec) -> Result<(), AttributeError> {
    match spec.role {
        Role::Const => {
            if spec.default.is_none() {
                return Err(AttributeError::DefaultRequired);
            }
        }
        Role::Required | Role::Output => {
            if spec.default.is_some() {
                return Err(AttributeError::DefaultNotAllowed);
            }
        }
        Role::Optional => {}
    }

    if let Some(default) = &spec.default {
        if !matches!(spec.role, Role::Optional | Role::Const) {
            return Err(AttributeError::DefaultNotAllowed);
        }
        if !spec.attr_type.accepts(default) {
            return Err(AttributeError::InvalidDefaultValue);
        }
    }

    if spec.for_each {
        if spec.role.is_output() {
            return Err(AttributeError::ForEachNotAllowedOutput);
        }
        if !spec.attr_type.supports_for_each() {
            return Err(AttributeError::ForEachRequiresArray);
        }
    }

    if spec.mapping.is_some() && matches!(spec.role, Role::Const) {
        return Err(AttributeError::MappingNotAllowed);
    }

    Ok(())
}

/// Valida un conjunto completo de atributos de un step: cada atributo en
/// aislamiento, más la unicidad de nombres externos dentro de cada
/// namespace (inputs vs outputs).
pub fn validate_attribute_set(specs: &[AttributeSpec]) -> Result<(), AttributeError> {
    for spec in specs {
        validate_attribute(spec)?;
    }

    let mut seen_inputs: HashSet<&str> = HashSet::new();
    let mut seen_outputs: HashSet<&str> = HashSet::new();
    for spec in specs {
        let external = spec.external_name();
        let bucket = if spec.role.is_output() { &mut seen_outputs } else { &mut seen_inputs };
        if !bucket.insert(external) {
            return Err(AttributeError::DuplicateInnerName(external.to_string()));
        }
    }
    Ok(())
}

/// `AttrType::parse` falla con `InvalidType`; útil cuando la especificación
/// llega serializada desde una fuente externa sin validar previamente.
pub fn parse_type(raw: &str) -> Result<AttrType, AttributeError> {
    AttrType::parse(raw).ok_or(AttributeError::InvalidType)
}
