//! flowgraph-handlers: las cuatro implementaciones concretas de `Handler`
//! (§4.6, §9 "Polymorphism over step types").
//!
//! `HttpSyncHandler`/`HttpAsyncHandler` llaman al endpoint externo vía
//! `reqwest`; `ScriptHandler` delega en un `ScriptRunner` externo a través
//! del wire contract de §6; `SubFlowHandler` recursa en un `FlowRuntime`
//! anidado (composición de flujos, spec.md §4.8).
pub mod http;
pub mod script;
pub mod subflow;

pub use http::{HttpAsyncHandler, HttpSyncHandler, StepRequest, StepResponse};
pub use script::ScriptHandler;
pub use subflow::SubFlowHandler;
