//! Carga de configuración desde `.env`/entorno (§9 de la especificación
//! ampliada): `DATABASE_URL`, tamaño de pool, y los valores por defecto de
//! timeout/reintentos que el resto del motor usa cuando un step no los fija
//! explícitamente.
use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: Option<String>,
    pub min_connections: u32,
    pub max_connections: u32,
    pub default_http_timeout_ms: u64,
    pub default_max_retries: u32,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        Self {
            database_url: env::var("DATABASE_URL").ok(),
            min_connections: env_parse("FLOWGRAPH_DB_MIN_CONNECTIONS", 2),
            max_connections: env_parse("FLOWGRAPH_DB_MAX_CONNECTIONS", 16),
            default_http_timeout_ms: env_parse("FLOWGRAPH_DEFAULT_HTTP_TIMEOUT_MS", 30_000),
            default_max_retries: env_parse("FLOWGRAPH_DEFAULT_MAX_RETRIES", 3),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_unset() {
        std::env::remove_var("FLOWGRAPH_DEFAULT_MAX_RETRIES");
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.default_max_retries, 3);
    }
}
