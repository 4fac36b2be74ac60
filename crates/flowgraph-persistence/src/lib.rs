//! `flowgraph-persistence`: backend Postgres opcional de `EventStore`
//! (el colaborador "estado persistido" de la arquitectura), detrás del
//! feature `postgres`. Sin ese feature, el crate sólo expone `config` y
//! `error`, de modo que depender de él sin la característica activada no
//! arrastra Diesel.
pub mod config;
pub mod error;

#[cfg(feature = "postgres")]
pub mod migrations;
#[cfg(feature = "postgres")]
pub mod pg;
#[cfg(feature = "postgres")]
pub mod schema;

pub use config::{init_dotenv, EngineConfig};
pub use error::PersistenceError;

#[cfg(feature = "postgres")]
pub use pg::{build_dev_pool_from_env, build_pool, pg_event_store_from_env, ConnectionProvider, PgEventStore, PgPool, PoolProvider};
