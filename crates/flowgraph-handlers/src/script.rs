//! `ScriptHandler`: steps `StepType::Script` (§4.6).
//!
//! El cuerpo del script (Ale/Lua/JPath, spec.md §1) es un colaborador
//! externo fuera de alcance; este handler sólo conoce el contrato mínimo
//! de ejecutarlo con los argumentos ya materializados y recibir de vuelta
//! un JSON de outputs.
use async_trait::async_trait;
use flowgraph_core::{DispatchError, DispatchMetadata, Handler, HandlerOutcome, Step};
use serde_json::Value;

/// Ejecuta el cuerpo de un step de tipo `Script`. Implementado por el
/// runtime de scripts real (fuera de alcance); ver `flowgraph_core::dispatcher::ScriptRunner`
/// para el contrato, más restringido, de predicados y mapeos.
pub trait ScriptExecutor: Send + Sync {
    fn execute(&self, body: &str, args: &Value) -> Result<Value, DispatchError>;
}

pub struct ScriptHandler {
    executor: std::sync::Arc<dyn ScriptExecutor>,
}

impl ScriptHandler {
    pub fn new(executor: std::sync::Arc<dyn ScriptExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Handler for ScriptHandler {
    async fn invoke(&self, step: &Step, args: Value, _meta: DispatchMetadata) -> Result<HandlerOutcome, DispatchError> {
        let body = step
            .script
            .as_ref()
            .ok_or_else(|| DispatchError::ScriptError("missing script body".to_string()))?;
        let outputs = self.executor.execute(&body.body, &args)?;
        Ok(HandlerOutcome { success: true, outputs, error: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_core::{FlowId, StepId, StepType, Token};
    use serde_json::json;
    use std::sync::Arc;

    struct Identity;
    impl ScriptExecutor for Identity {
        fn execute(&self, _body: &str, args: &Value) -> Result<Value, DispatchError> {
            Ok(args.clone())
        }
    }

    #[tokio::test]
    async fn script_handler_returns_executor_outputs() {
        let step = Step {
            id: StepId::new("s"),
            name: "s".into(),
            step_type: StepType::Script,
            attributes: vec![],
            http: None,
            script: Some(flowgraph_core::ScriptConfig { body: "args".into() }),
            flow: None,
            predicate: None,
            work_config: Default::default(),
            labels: Default::default(),
            memoizable: false,
        };
        let handler = ScriptHandler::new(Arc::new(Identity));
        let meta = DispatchMetadata {
            flow_id: FlowId::sanitize("f1").unwrap(),
            step_id: step.id.clone(),
            work_token: Token::singleton(),
            receipt_token: None,
            webhook_url: None,
            parent_flow_id: None,
            parent_step_id: None,
            parent_work_item_token: None,
        };
        let outcome = handler.invoke(&step, json!({"x": 1}), meta).await.unwrap();
        assert_eq!(outcome.outputs, json!({"x": 1}));
    }
}
