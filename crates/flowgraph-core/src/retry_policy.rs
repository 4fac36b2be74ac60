//! Contrato del calculador de backoff (§4.7). La implementación concreta
//! (`compute_delay`, `RetryScheduler`) vive en `flowgraph-retry`; el flow
//! runtime sólo depende de este trait para permanecer independiente de esa
//! política.
use std::time::Duration;

use crate::model::WorkConfig;

pub trait RetryPolicy: Send + Sync {
    /// `None` cuando `retry_count` ya alcanzó `work_config.max_retries`
    /// (el work item debe transicionar a `failed` terminal). `Some(delay)`
    /// en caso contrario.
    fn next_delay(&self, work_config: &WorkConfig, retry_count: u32) -> Option<Duration>;
}
