//! `WorkState`: proyección por work item (§3, §4.5).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Active,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkState {
    pub status: WorkStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub inputs: Value,
    pub outputs: Value,
    pub error: Option<String>,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl WorkState {
    pub fn pending() -> Self {
        Self {
            status: WorkStatus::Pending,
            started_at: None,
            completed_at: None,
            inputs: Value::Null,
            outputs: Value::Null,
            error: None,
            retry_count: 0,
            next_retry_at: None,
        }
    }
}
