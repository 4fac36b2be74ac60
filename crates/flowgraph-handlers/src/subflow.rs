//! `SubFlowHandler`: steps `StepType::Flow` (§4.8 composición de flujos).
//!
//! Ejecuta un flujo anidado hasta su término y traduce sus atributos de
//! salida en los outputs del step contenedor. El flujo hijo es indistinguible
//! de uno de nivel superior: mismo catálogo, mismo event log, mismo
//! `FlowRuntime` — sólo su `FlowId` lo marca como anidado.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flowgraph_core::{
    plan, DispatchError, DispatchMetadata, EventStore, FlowId, FlowRuntime, FlowStatus, Handler, HandlerOutcome,
    PlanCache, Step, StepCatalog,
};
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::watch;

pub struct SubFlowHandler<E: EventStore + 'static> {
    runtime: Arc<FlowRuntime<E>>,
    catalog: Arc<StepCatalog<E>>,
    plan_cache: Arc<PlanCache>,
}

impl<E: EventStore + 'static> SubFlowHandler<E> {
    pub fn new(runtime: Arc<FlowRuntime<E>>, catalog: Arc<StepCatalog<E>>, plan_cache: Arc<PlanCache>) -> Self {
        Self { runtime, catalog, plan_cache }
    }
}

#[async_trait]
impl<E: EventStore + 'static> Handler for SubFlowHandler<E> {
    async fn invoke(&self, step: &Step, args: Value, meta: DispatchMetadata) -> Result<HandlerOutcome, DispatchError> {
        let flow_cfg = step.flow.as_ref().ok_or_else(|| DispatchError::ScriptError("missing flow config".to_string()))?;

        let child_flow_id = FlowId::sanitize(&format!("{}-{}-sub", meta.flow_id, meta.step_id))
            .map_err(|e| DispatchError::SubFlowFailed(e.to_string()))?;

        let initial_args: IndexMap<String, Value> = args
            .as_object()
            .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let plan_result = self.plan_cache.plan_cached(&flow_cfg.goals, &initial_args, &self.catalog);
        let sub_plan = match plan_result.as_ref() {
            Ok(p) => p.clone(),
            Err(e) => return Err(DispatchError::SubFlowFailed(e.to_string())),
        };

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let final_state = self
            .runtime
            .clone()
            .run(child_flow_id, sub_plan, initial_args, HashMap::new(), cancel_rx)
            .await;

        if final_state.status != FlowStatus::Completed {
            let reason = final_state.error.clone().unwrap_or_else(|| "sub-flow did not complete".to_string());
            return Err(DispatchError::SubFlowFailed(reason));
        }

        let outputs: serde_json::Map<String, Value> = step
            .outputs()
            .filter_map(|out| final_state.attributes.get(&out.name).map(|a| (out.name.clone(), a.value.clone())))
            .collect();
        Ok(HandlerOutcome { success: true, outputs: Value::Object(outputs), error: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_attributes::{AttrType, AttributeSpec, Role};
    use flowgraph_core::{
        DispatchError as CoreDispatchError, FlowId as CoreFlowId, HandlerOutcome as CoreHandlerOutcome,
        HttpConfig, InMemoryEventStore, NoopScriptRunner, StepId, StepType, Token, WorkConfig,
    };
    use serde_json::json;

    struct Answers;
    #[async_trait]
    impl Handler for Answers {
        async fn invoke(
            &self,
            _step: &Step,
            args: Value,
            _meta: DispatchMetadata,
        ) -> Result<HandlerOutcome, CoreDispatchError> {
            let raw = args.get("raw").and_then(Value::as_i64).unwrap_or(0);
            Ok(CoreHandlerOutcome { success: true, outputs: json!({ "answer": raw * 2 }), error: None })
        }
    }

    struct FixedResolver(Arc<dyn Handler>);
    impl flowgraph_core::HandlerResolver for FixedResolver {
        fn resolve(&self, _step: &Step) -> Option<Arc<dyn Handler>> {
            Some(self.0.clone())
        }
    }

    fn inner_step() -> Step {
        Step {
            id: StepId::new("inner"),
            name: "inner".into(),
            step_type: StepType::Sync,
            attributes: vec![
                AttributeSpec::new("raw", Role::Required, AttrType::Number),
                AttributeSpec::new("answer", Role::Output, AttrType::Number),
            ],
            http: Some(HttpConfig { endpoint: "http://x".into(), timeout_ms: 1000, webhook_url: None }),
            script: None,
            flow: None,
            predicate: None,
            work_config: WorkConfig::default(),
            labels: Default::default(),
            memoizable: false,
        }
    }

    fn outer_step() -> Step {
        Step {
            id: StepId::new("subflow_step"),
            name: "subflow_step".into(),
            step_type: StepType::Flow,
            attributes: vec![
                AttributeSpec::new("raw", Role::Required, AttrType::Number),
                AttributeSpec::new("answer", Role::Output, AttrType::Number),
            ],
            http: None,
            script: None,
            flow: Some(flowgraph_core::SubFlowConfig { goals: vec![StepId::new("inner")] }),
            predicate: None,
            work_config: WorkConfig::default(),
            labels: Default::default(),
            memoizable: false,
        }
    }

    #[tokio::test]
    async fn sub_flow_runs_to_completion_and_exposes_outputs() {
        let store = Arc::new(InMemoryEventStore::new());
        let catalog = Arc::new(StepCatalog::new(store.clone()));
        catalog.register(inner_step()).unwrap();

        let handlers: Arc<dyn flowgraph_core::HandlerResolver> = Arc::new(FixedResolver(Arc::new(Answers)));
        let runtime = Arc::new(FlowRuntime::new(
            store,
            handlers,
            Arc::new(NoopScriptRunner),
            Arc::new(flowgraph_retry::RetryScheduler),
        ));
        let plan_cache = Arc::new(PlanCache::new());
        let handler = SubFlowHandler::new(runtime, catalog, plan_cache);

        let meta = DispatchMetadata {
            flow_id: CoreFlowId::sanitize("parent").unwrap(),
            step_id: StepId::new("subflow_step"),
            work_token: Token::singleton(),
            receipt_token: None,
            webhook_url: None,
            parent_flow_id: None,
            parent_step_id: None,
            parent_work_item_token: None,
        };

        let outcome = handler.invoke(&outer_step(), json!({"raw": 21}), meta).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.outputs, json!({"answer": 42}));
    }

    #[tokio::test]
    async fn sub_flow_failure_surfaces_as_sub_flow_failed() {
        let store = Arc::new(InMemoryEventStore::new());
        let catalog = Arc::new(StepCatalog::new(store.clone()));
        catalog.register(inner_step()).unwrap();

        struct AlwaysFails;
        #[async_trait]
        impl Handler for AlwaysFails {
            async fn invoke(
                &self,
                _step: &Step,
                _args: Value,
                _meta: DispatchMetadata,
            ) -> Result<HandlerOutcome, CoreDispatchError> {
                Err(CoreDispatchError::HandlerReportedFailure(Some("boom".to_string())))
            }
        }

        let handlers: Arc<dyn flowgraph_core::HandlerResolver> = Arc::new(FixedResolver(Arc::new(AlwaysFails)));
        let runtime = Arc::new(FlowRuntime::new(
            store,
            handlers,
            Arc::new(NoopScriptRunner),
            Arc::new(flowgraph_retry::RetryScheduler),
        ));
        let plan_cache = Arc::new(PlanCache::new());
        let handler = SubFlowHandler::new(runtime, catalog, plan_cache);

        let meta = DispatchMetadata {
            flow_id: CoreFlowId::sanitize("parent").unwrap(),
            step_id: StepId::new("subflow_step"),
            work_token: Token::singleton(),
            receipt_token: None,
            webhook_url: None,
            parent_flow_id: None,
            parent_step_id: None,
            parent_work_item_token: None,
        };

        let err = handler.invoke(&outer_step(), json!({"raw": 21}), meta).await.unwrap_err();
        assert!(matches!(err, CoreDispatchError::SubFlowFailed(_)));
    }
}
