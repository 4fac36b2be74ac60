//! flowgraph-retry: calculador de backoff y el `RetryPolicy` concreto del
//! motor (§4.7).
//!
//! `flowgraph-core` sólo conoce el trait `RetryPolicy`; este crate provee
//! la única implementación de producción, igual que `chem-policies`
//! concentra las políticas de selección concretas detrás de un trait del
//! motor.
pub mod backoff;
pub mod scheduler;

pub use backoff::compute_delay;
pub use scheduler::RetryScheduler;
