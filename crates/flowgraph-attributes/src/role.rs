//! Rol de un atributo dentro de un step.
//!
//! `Const` es un input ligado en tiempo de definición: el step lo provee vía
//! su propio `Default`, nunca el llamador. Se mantiene como un cuarto rol en
//! lugar de plegarlo en `Optional + default obligatorio`, siguiendo la
//! revisión de la especificación que lo trata como load-bearing (ver
//! DESIGN.md, decisión de Open Question #1).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Required,
    Optional,
    Const,
    Output,
}

impl Role {
    pub fn is_input(self) -> bool {
        matches!(self, Role::Required | Role::Optional | Role::Const)
    }

    pub fn is_output(self) -> bool {
        matches!(self, Role::Output)
    }
}
