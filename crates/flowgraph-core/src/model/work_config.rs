//! Configuración de paralelismo y reintento por step (`WorkConfig`, §3, §4.7).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    Fixed,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkConfig {
    /// Tope de work items concurrentes para este step (semáforo por step).
    pub parallelism: usize,
    pub max_retries: u32,
    pub backoff_type: BackoffType,
    /// Milisegundos.
    pub backoff: u64,
    pub max_backoff: Option<u64>,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self { parallelism: 1, max_retries: 0, backoff_type: BackoffType::Fixed, backoff: 0, max_backoff: None }
    }
}
