//! Mapeo de nombres/transformación externa de un atributo.
//!
//! `Mapping.name` renombra el nombre visible para el handler externo;
//! `Mapping.script` es el identificador de un script de transformación que se
//! aplica antes del envío (inputs) o después de la recepción (outputs). El
//! cuerpo del script no se interpreta aquí: es responsabilidad del runtime de
//! scripts externo (colaborador fuera de alcance, ver spec.md §1).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub name: Option<String>,
    pub script: Option<String>,
}

impl Mapping {
    /// Nombre externo efectivo de un atributo: el mapeado si existe, si no el
    /// propio nombre interno.
    pub fn external_name<'a>(mapping: Option<&'a Mapping>, internal_name: &'a str) -> &'a str {
        mapping.and_then(|m| m.name.as_deref()).unwrap_or(internal_name)
    }
}
