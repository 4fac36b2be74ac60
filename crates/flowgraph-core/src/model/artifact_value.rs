//! Valor de atributo materializado: un JSON con su nombre de origen.
//!
//! A diferencia del `Artifact` opaco del motor lineal del que este crate
//! desciende, aquí los valores son simplemente `serde_json::Value`
//! etiquetados por el nombre del atributo y el step que los produjo — el
//! motor no necesita envolverlos en un tipo artifact separado porque cada
//! valor ya vive en `FlowState.attributes` indexado por nombre.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::StepId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub value: Value,
    pub produced_by: Option<StepId>,
}
