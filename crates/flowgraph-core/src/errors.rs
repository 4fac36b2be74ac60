//! Taxonomía de errores del motor (§7).
//!
//! Cinco familias, no cinco tipos planos: `Validation` y `Planning` son
//! culpa del llamador y se devuelven sincrónicamente sin tocar el event log;
//! `Dispatch` es culpa del step externo y siempre pasa por el event log antes
//! de llegar a cualquier observador; `Invariant` es un bug del motor, fatal
//! para el flujo; `Cancellation` es una acción del operador, no un error a
//! reintentar.
use thiserror::Error;

use flowgraph_attributes::AttributeError;

use crate::ids::StepId;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CatalogError {
    #[error("invalid attribute '{name}': {source}")]
    InvalidAttribute { name: String, source: AttributeError },
    #[error("step must declare exactly one of http, script, or flow matching its type")]
    ConflictingStepKind,
    #[error("sync/async step requires an http endpoint")]
    MissingHttpEndpoint,
    #[error("script step requires a non-empty script body")]
    MissingScriptBody,
    #[error("flow step requires at least one goal")]
    MissingFlowGoals,
    #[error("unrecognized backoff type")]
    InvalidBackoffType,
    #[error("backoff must be >= 0")]
    NegativeBackoff,
    #[error("max_backoff must be >= backoff")]
    MaxBackoffTooSmall,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PlanningError {
    #[error("no goals were supplied")]
    NoGoals,
    #[error("unknown goal step id(s): {0:?}")]
    UnknownGoals(Vec<StepId>),
    #[error("unsatisfiable goal(s): required inputs have no producer and were not supplied: {0:?}")]
    UnsatisfiableGoal(Vec<String>),
    #[error("cycle detected among steps: {0:?}")]
    CycleDetected(Vec<StepId>),
    #[error("too many goals (max 64)")]
    TooManyGoals,
    #[error("too many initial attributes (max 128)")]
    TooManyInitialArgs,
    #[error("too many labels (max 32)")]
    TooManyLabels,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DispatchError {
    #[error("http call failed with non-2xx status {0}")]
    HttpStatus(u16),
    #[error("http call timed out")]
    Timeout,
    #[error("script runtime error: {0}")]
    ScriptError(String),
    #[error("sub-flow failed: {0}")]
    SubFlowFailed(String),
    #[error("handler returned success=false: {0:?}")]
    HandlerReportedFailure(Option<String>),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CoreEngineError {
    #[error("flow already completed")]
    FlowCompleted,
    #[error("unknown step id: {0}")]
    UnknownStep(StepId),
    #[error("duplicate attribute write attempted for '{0}'")]
    DuplicateAttributeWrite(String),
    #[error("illegal state transition")]
    IllegalTransition,
    #[error("flow was cancelled")]
    Cancelled,
    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Debug, Error, Clone)]
pub enum FlowgraphError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Planning(#[from] PlanningError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Core(#[from] CoreEngineError),
}
