//! `RetryScheduler`: la única implementación de producción de
//! `RetryPolicy` (§4.7).
use flowgraph_core::{RetryPolicy, WorkConfig};

use crate::backoff::compute_delay;

/// Implementa `RetryPolicy` sobre `compute_delay`. No mantiene estado por
/// work item: `flow runtime` es el único dueño de `retry_count` (lo lee de
/// la proyección `WorkState` y lo pasa de vuelta en cada llamada), así que
/// este tipo puede compartirse libremente entre flujos vía `Arc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryScheduler;

impl RetryScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl RetryPolicy for RetryScheduler {
    fn next_delay(&self, work_config: &WorkConfig, retry_count: u32) -> Option<std::time::Duration> {
        if retry_count >= work_config.max_retries {
            return None;
        }
        Some(compute_delay(work_config.backoff_type, work_config.backoff, work_config.max_backoff, retry_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_core::BackoffType;

    fn wc(max_retries: u32) -> WorkConfig {
        WorkConfig { parallelism: 1, max_retries, backoff_type: BackoffType::Fixed, backoff: 10, max_backoff: None }
    }

    #[test]
    fn stops_once_max_retries_reached() {
        let s = RetryScheduler::new();
        assert!(s.next_delay(&wc(2), 0).is_some());
        assert!(s.next_delay(&wc(2), 1).is_some());
        assert!(s.next_delay(&wc(2), 2).is_none());
    }

    #[test]
    fn zero_max_retries_never_retries() {
        let s = RetryScheduler::new();
        assert!(s.next_delay(&wc(0), 0).is_none());
    }
}
