//! Binario de demostración: cablea catálogo, registro de handlers, política
//! de reintentos y runtime para correr un flujo lineal de principio a fin
//! (análogo al flujo `demo_chars` que construye el binario del que este
//! crate heredó su forma, sólo que aquí los steps son genéricos en vez de
//! typed_step! específicos de un dominio).
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};
use tokio::sync::watch;

use flowgraph_attributes::{AttrType, AttributeSpec, Role};
use flowgraph_core::{
    plan, DispatchError, DispatchMetadata, FlowId, FlowRuntime, FlowStatus, Handler, HandlerOutcome, HandlerResolver,
    InMemoryEventStore, NoopScriptRunner, ScriptConfig, Step, StepCatalog, StepId, StepType, WorkConfig,
};
use flowgraph_providers::HandlerRegistry;
use flowgraph_retry::RetryScheduler;

/// Step `Script` de ejemplo: duplica el número de entrada. Un handler real
/// de producción delegaría en `flowgraph_handlers::ScriptHandler` con un
/// `ScriptExecutor` de verdad; aquí alcanza con una operación fija para que
/// el flujo demo corra sin colaboradores externos.
struct Doubler;

#[async_trait]
impl Handler for Doubler {
    async fn invoke(&self, _step: &Step, args: Value, _meta: DispatchMetadata) -> Result<HandlerOutcome, DispatchError> {
        let n = args.get("n").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(HandlerOutcome { success: true, outputs: json!({ "doubled": n * 2.0 }), error: None })
    }
}

fn seed_step() -> Step {
    Step {
        id: StepId::new("seed"),
        name: "seed".into(),
        step_type: StepType::Script,
        attributes: vec![
            AttributeSpec::new("raw", Role::Required, AttrType::Number),
            AttributeSpec::new("n", Role::Output, AttrType::Number),
        ],
        http: None,
        script: Some(ScriptConfig { body: "identity".into() }),
        flow: None,
        predicate: None,
        work_config: WorkConfig::default(),
        labels: HashMap::new(),
        memoizable: false,
    }
}

fn double_step() -> Step {
    Step {
        id: StepId::new("double"),
        name: "double".into(),
        step_type: StepType::Script,
        attributes: vec![
            AttributeSpec::new("n", Role::Required, AttrType::Number),
            AttributeSpec::new("doubled", Role::Output, AttrType::Number),
        ],
        http: None,
        script: Some(ScriptConfig { body: "double".into() }),
        flow: None,
        predicate: None,
        work_config: WorkConfig::default(),
        labels: HashMap::new(),
        memoizable: false,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    #[cfg(feature = "pg_demo")]
    flowgraph_persistence::init_dotenv();

    let event_store = Arc::new(InMemoryEventStore::new());
    let catalog = StepCatalog::new(event_store.clone());
    catalog.register(seed_step()).expect("seed step valid");
    catalog.register(double_step()).expect("double step valid");

    let registry = HandlerRegistry::new();
    registry.register(StepType::Script, Arc::new(Doubler));
    let handlers: Arc<dyn HandlerResolver> = Arc::new(registry);

    let mut initial_args = IndexMap::new();
    initial_args.insert("raw".to_string(), json!(21));

    let compiled_plan = plan(&[StepId::new("double")], &initial_args, &catalog).expect("plan compiles");
    tracing::info!(steps = compiled_plan.steps.len(), "compiled execution plan");

    let runtime = Arc::new(FlowRuntime::new(
        event_store.clone(),
        handlers,
        Arc::new(NoopScriptRunner),
        Arc::new(RetryScheduler),
    ));

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let flow_id = FlowId::sanitize("demo-flow").expect("valid flow id");
    let final_state = runtime.run(flow_id, compiled_plan, initial_args, HashMap::new(), cancel_rx).await;

    match final_state.status {
        FlowStatus::Completed => {
            let doubled = final_state.attributes.get("doubled").map(|a| a.value.clone()).unwrap_or(Value::Null);
            println!("flow completed, doubled = {doubled}");
        }
        other => println!("flow ended in {other:?}: {:?}", final_state.error),
    }

    let events = event_store.list(&[]);
    println!("events emitted: {}", events.len());
}
