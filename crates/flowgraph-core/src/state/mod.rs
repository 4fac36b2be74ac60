//! Proyecciones: cuatro familias de reductores puros `(S, &FlowEvent) -> S`
//! con semántica copy-on-write (§4.5, §9).
pub mod engine_state;
pub mod execution_state;
pub mod flow_state;
pub mod work_state;

pub use engine_state::{EngineState, HealthState};
pub use execution_state::{ExecutionState, ExecutionStatus};
pub use flow_state::{FlowState, FlowStatus};
pub use work_state::{WorkState, WorkStatus};
