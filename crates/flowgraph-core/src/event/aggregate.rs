//! `AggregateId`: ruta jerárquica que direcciona un evento (§4.4).
use serde::{Deserialize, Serialize};

use crate::ids::{FlowId, StepId, Token};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateId {
    Engine,
    Flow(FlowId),
    Step(FlowId, StepId),
    Work(FlowId, StepId, Token),
}

impl AggregateId {
    /// Representación como lista de segmentos, tal como la describe §6 para
    /// el payload `id` del stream de eventos.
    pub fn as_path(&self) -> Vec<String> {
        match self {
            AggregateId::Engine => vec!["engine".to_string()],
            AggregateId::Flow(flow_id) => vec!["flow".to_string(), flow_id.to_string()],
            AggregateId::Step(flow_id, step_id) => {
                vec!["flow".to_string(), flow_id.to_string(), "step".to_string(), step_id.to_string()]
            }
            AggregateId::Work(flow_id, step_id, token) => vec![
                "flow".to_string(),
                flow_id.to_string(),
                "step".to_string(),
                step_id.to_string(),
                "work".to_string(),
                token.to_string(),
            ],
        }
    }

    /// Verdadero si este aggregate cae bajo el prefijo dado (coincidencia
    /// segmento a segmento).
    pub fn under_prefix(&self, prefix: &[String]) -> bool {
        let path = self.as_path();
        if prefix.len() > path.len() {
            return false;
        }
        path.iter().zip(prefix.iter()).all(|(a, b)| a == b)
    }

    pub fn flow_id(&self) -> Option<&FlowId> {
        match self {
            AggregateId::Engine => None,
            AggregateId::Flow(f) | AggregateId::Step(f, _) | AggregateId::Work(f, _, _) => Some(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_aggregate_is_under_flow_prefix() {
        let flow = FlowId::sanitize("f1").unwrap();
        let step = StepId::new("s1");
        let token = Token::singleton();
        let agg = AggregateId::Work(flow.clone(), step, token);
        assert!(agg.under_prefix(&["flow".to_string(), flow.to_string()]));
        assert!(!agg.under_prefix(&["flow".to_string(), "other".to_string()]));
    }
}
