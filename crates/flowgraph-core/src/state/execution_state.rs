//! `ExecutionState`: proyección por (flow, step) (§3, §4.5).
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::Token;
use super::work_state::WorkState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Active,
    Completed,
    Skipped,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Skipped | ExecutionStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub inputs: Value,
    pub outputs: Value,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    /// Vacío salvo que el step tenga fan-out `for_each`.
    pub work_items: IndexMap<Token, WorkState>,
}

impl ExecutionState {
    pub fn pending() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            inputs: Value::Null,
            outputs: Value::Null,
            duration_ms: None,
            error: None,
            work_items: IndexMap::new(),
        }
    }
}
