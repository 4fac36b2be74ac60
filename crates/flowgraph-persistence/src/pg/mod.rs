//! Implementación Postgres (Diesel) de `flowgraph_core::EventStore`.
//!
//! `PgEventStore` delega el estado vivo del proceso (replay, pub/sub) a un
//! `InMemoryEventStore` interno — la misma garantía de orden y determinismo
//! que el resto del motor ya asume — y además escribe cada evento, de forma
//! durable, en `event_log` dentro de la misma llamada a `append`, con
//! reintento acotado sobre errores transitorios. Al arrancar, `rehydrate`
//! repone el estado en memoria leyendo la tabla en orden de `seq`.
#![cfg(feature = "postgres")]

use std::sync::Arc;
use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use flowgraph_core::{AggregateId, EventKind, EventStore, Filter, FlowEvent, InMemoryEventStore, Subscription};
use tracing::warn;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::event_log;

pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Indirección sobre cómo obtener una conexión, para poder sustituirla en
/// tests sin depender de un pool r2d2 real.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

#[derive(Queryable, Debug)]
struct EventRow {
    seq: i64,
    aggregate_path: String,
    aggregate_id: serde_json::Value,
    event_type: String,
    payload: serde_json::Value,
    ts: chrono::DateTime<chrono::Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = event_log)]
struct NewEventRow<'a> {
    aggregate_path: &'a str,
    aggregate_id: &'a serde_json::Value,
    event_type: &'a str,
    payload: &'a serde_json::Value,
}

fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
where
    F: FnMut() -> Result<T, PersistenceError>,
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempts < 3 => {
                let delay_ms = 15 * (attempts + 1);
                warn!("retryable persistence error (attempt {}): {e} -> sleeping {delay_ms}ms", attempts + 1);
                std::thread::sleep(Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// `EventStore` durable respaldado por Postgres, con paridad de
/// comportamiento frente a `InMemoryEventStore` para el proceso que lo hospeda.
pub struct PgEventStore<P: ConnectionProvider> {
    provider: P,
    inner: InMemoryEventStore,
}

impl<P: ConnectionProvider> PgEventStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider, inner: InMemoryEventStore::new() }
    }

    /// Repone el `InMemoryEventStore` interno leyendo `event_log` completo en
    /// orden de `seq`. Debe llamarse una sola vez, antes de aceptar tráfico,
    /// ya que reasigna secuencias desde 1 al reproducir los eventos.
    pub fn rehydrate(&self) -> Result<usize, PersistenceError> {
        let rows: Vec<EventRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            event_log::table.order(event_log::seq.asc()).load(&mut conn).map_err(PersistenceError::from)
        })?;
        let mut restored = 0;
        for row in rows {
            let aggregate_id: AggregateId = match serde_json::from_value(row.aggregate_id) {
                Ok(a) => a,
                Err(e) => {
                    warn!("skipping unreadable aggregate_id at seq={}: {e}", row.seq);
                    continue;
                }
            };
            let kind: EventKind = match serde_json::from_value(row.payload) {
                Ok(k) => k,
                Err(e) => {
                    warn!("skipping unreadable payload at seq={}: {e}", row.seq);
                    continue;
                }
            };
            self.inner.append(aggregate_id, kind);
            restored += 1;
        }
        Ok(restored)
    }
}

impl<P: ConnectionProvider> EventStore for PgEventStore<P> {
    fn append(&self, aggregate_id: AggregateId, kind: EventKind) -> FlowEvent {
        let event = self.inner.append(aggregate_id.clone(), kind.clone());

        let aggregate_path = aggregate_id.as_path().join("/");
        let aggregate_id_json = serde_json::to_value(&aggregate_id).unwrap_or(serde_json::Value::Null);
        let payload = serde_json::to_value(&kind).unwrap_or(serde_json::Value::Null);
        let event_type = kind.type_name();

        let persisted = with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(event_log::table)
                .values(NewEventRow {
                    aggregate_path: &aggregate_path,
                    aggregate_id: &aggregate_id_json,
                    event_type,
                    payload: &payload,
                })
                .execute(&mut conn)
                .map_err(PersistenceError::from)
        });
        if let Err(e) = persisted {
            warn!("event seq={} kept in memory but failed to persist durably: {e}", event.sequence);
        }
        event
    }

    fn list(&self, prefix: &[String]) -> Vec<FlowEvent> {
        self.inner.list(prefix)
    }

    fn subscribe(&self, filter: Filter) -> Subscription {
        self.inner.subscribe(filter)
    }
}

pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1).max(validated_min);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .min_idle(Some(validated_min))
        .max_size(validated_max)
        .build(manager)
        .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    let cfg = crate::config::EngineConfig::from_env();
    let url = cfg.database_url.ok_or_else(|| PersistenceError::Unknown("DATABASE_URL not set".to_string()))?;
    build_pool(&url, cfg.min_connections, cfg.max_connections)
}

pub fn pg_event_store_from_env() -> Result<Arc<PgEventStore<PoolProvider>>, PersistenceError> {
    let pool = build_dev_pool_from_env()?;
    let store = PgEventStore::new(PoolProvider { pool });
    store.rehydrate()?;
    Ok(Arc::new(store))
}
