//! `compute_delay`: backoff puro, sin estado (§4.7).
use std::time::Duration;

use flowgraph_core::BackoffType;

/// Calcula el delay antes del próximo intento. `retry_count` es el número
/// de intentos ya realizados (0 antes del primer reintento).
///
/// - `Fixed`: siempre `backoff`.
/// - `Linear`: `backoff * (retry_count + 1)`.
/// - `Exponential`: `backoff * 2^retry_count`.
///
/// El resultado se recorta a `max_backoff` cuando está presente.
pub fn compute_delay(backoff_type: BackoffType, backoff_ms: u64, max_backoff_ms: Option<u64>, retry_count: u32) -> Duration {
    let raw_ms: u64 = match backoff_type {
        BackoffType::Fixed => backoff_ms,
        BackoffType::Linear => backoff_ms.saturating_mul(u64::from(retry_count) + 1),
        BackoffType::Exponential => backoff_ms.saturating_mul(1u64.checked_shl(retry_count).unwrap_or(u64::MAX)),
    };
    let capped = match max_backoff_ms {
        Some(max) => raw_ms.min(max),
        None => raw_ms,
    };
    Duration::from_millis(capped)
}
