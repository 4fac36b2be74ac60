//! Errores de persistencia. Mapea errores de Diesel/conexión a variantes
//! semánticas, con distinción entre transitorio (reintentable) y permanente.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient io/connection pool error: {0}")]
    TransientIo(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

#[cfg(feature = "postgres")]
impl From<diesel::result::Error> for PersistenceError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::UniqueViolation(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => Self::SerializationConflict,
            DieselError::DatabaseError(kind, info) => {
                Self::Unknown(format!("db error kind {kind:?}: {}", info.message()))
            }
            other => Self::Unknown(format!("diesel error: {other:?}")),
        }
    }
}

impl PersistenceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SerializationConflict | Self::TransientIo(_) => true,
            Self::Unknown(msg) => {
                let m = msg.to_lowercase();
                m.contains("deadlock detected")
                    || m.contains("could not serialize access due to concurrent update")
                    || m.contains("connection closed")
                    || m.contains("connection refused")
                    || m.contains("timeout")
            }
            _ => false,
        }
    }
}
