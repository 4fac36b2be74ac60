pub mod artifact_value;
pub mod step;
pub mod work_config;

pub use artifact_value::AttributeValue;
pub use step::{HttpConfig, ScriptConfig, Step, StepType, SubFlowConfig};
pub use work_config::{BackoffType, WorkConfig};
