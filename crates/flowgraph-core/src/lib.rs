//! flowgraph-core: el motor de orquestación reactiva (F3→Flowgraph).
//!
//! Propósito:
//! - Proveer los contratos neutrales (sin semántica de dominio) y la
//!   orquestación necesaria para ejecutar un grafo de Steps conectados por
//!   atributos, con fan-out/fan-in, reintentos y cancelación.
//! - Generar una secuencia de eventos (Event Sourcing) reproducible y capaz de
//!   reconstruir cualquier proyección (replay) sin mutar el historial.
//!
//! Componentes principales:
//! - `ids`: identificadores opacos (`StepId`, `FlowId`, `Token`).
//! - `model`: `Step` y su configuración neutral (`WorkConfig`, `HttpConfig`,
//!   `ScriptConfig`, `SubFlowConfig`).
//! - `event`: tipos de evento del motor, `EventStore` (in-memory + backends)
//!   y pub/sub con colas acotadas por suscriptor.
//! - `state`: proyecciones puras reconstruidas por replay (`FlowState`,
//!   `ExecutionState`, `WorkState`, `EngineState`).
//! - `catalog`: registro de steps y su grafo de atributos.
//! - `planner`: compila `(goals, initial_args, catalog)` en un
//!   `ExecutionPlan` determinista y cacheable.
//! - `dispatcher`: traduce un step listo en invocaciones de handler
//!   (materialize/invoke/interpret) y calcula el fan-out.
//! - `retry_policy`: contrato de backoff, implementado en `flowgraph-retry`.
//! - `runtime`: el bucle reactivo que conduce un flujo a término.
//! - `hashing`: canonicalización JSON y helpers de hash para fingerprints.
//! - `errors`: taxonomía de errores del motor.
//!
//! Re-exports: se exponen los símbolos de uso más frecuente para binarios y
//! crates dependientes (`flowgraph-retry`, `flowgraph-providers`,
//! `flowgraph-handlers`, `flowgraph-persistence`).

pub mod catalog;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod ids;
pub mod model;
pub mod planner;
pub mod retry_policy;
pub mod runtime;
pub mod state;

pub use catalog::{validate_step, AttributeGraph, StepCatalog};
pub use dispatcher::{
    evaluate_predicate, fan_out, is_ready, materialize_args, translate_outputs, DispatchMetadata, Handler,
    HandlerOutcome, HandlerResolver, NoopScriptRunner, ScriptRunner, WorkItem,
};
pub use errors::{CatalogError, CoreEngineError, DispatchError, FlowgraphError, PlanningError};
pub use event::{AggregateId, EventEnvelope, EventKind, EventStore, Filter, FlowEvent, InMemoryEventStore, Subscription};
pub use ids::{FlowId, FlowIdError, StepId, Token};
pub use model::{AttributeValue, BackoffType, HttpConfig, ScriptConfig, Step, StepType, SubFlowConfig, WorkConfig};
pub use planner::{plan, AttributeProviders, ExecutionPlan, Excluded, PlanCache};
pub use retry_policy::RetryPolicy;
pub use runtime::{spawn_flow, FlowRuntime};
pub use state::{EngineState, ExecutionState, ExecutionStatus, FlowState, FlowStatus, HealthState, WorkState, WorkStatus};
