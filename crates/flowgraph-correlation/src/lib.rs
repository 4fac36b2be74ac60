//! flowgraph-correlation: tabla de correlación de tokens de recibo para
//! steps HTTP asíncronos (§4.6 "HttpAsync", §6 webhook de finalización).
//!
//! Un step `HttpAsync` recibe un `202 Accepted` con un `receipt_token` y el
//! motor debe esperar a que un callback externo (el webhook) entregue el
//! resultado asociado a ese token. Esta tabla es el punto de encuentro
//! proceso-wide entre el `Handler` que emitió la llamada (esperando en un
//! `oneshot::Receiver`) y el endpoint de webhook (fuera de alcance de este
//! crate) que resuelve la promesa cuando llega la respuesta.
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use flowgraph_core::{FlowId, StepId, Token};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::warn;

/// Identifica de forma única a qué (flow, step, work item) corresponde un
/// `receipt_token` entregado a un colaborador externo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub flow_id: FlowId,
    pub step_id: StepId,
    pub token: Token,
}

#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    #[error("receipt token already registered")]
    AlreadyRegistered,
    #[error("receipt token not found (expired or never registered)")]
    NotFound,
    #[error("wait for receipt token timed out")]
    TimedOut,
    #[error("resolver channel closed before delivering a response")]
    SenderDropped,
}

/// Tabla proceso-wide de correlación, TTL-acotada por el timeout del step
/// (§4.6, `HttpConfig.timeout_ms`): ninguna entrada sobrevive más que la
/// espera del handler que la registró, porque `wait` siempre limpia su
/// propia entrada al retornar, éxito o timeout.
#[derive(Default)]
pub struct CorrelationTable {
    pending: DashMap<String, (CorrelationKey, oneshot::Sender<serde_json::Value>)>,
}

impl CorrelationTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registra un nuevo `receipt_token` junto con el `(flowID, stepID,
    /// workToken)` al que corresponde (§9 "Token → (flowID, stepID,
    /// workToken)") y devuelve el receiver a esperar. El llamador es
    /// responsable de generar un token con suficiente entropía (p.ej. un
    /// `Uuid::new_v4`) antes de invocar esto.
    pub fn register(
        &self,
        receipt_token: &str,
        key: CorrelationKey,
    ) -> Result<oneshot::Receiver<serde_json::Value>, CorrelationError> {
        if self.pending.contains_key(receipt_token) {
            return Err(CorrelationError::AlreadyRegistered);
        }
        let (tx, rx) = oneshot::channel();
        self.pending.insert(receipt_token.to_string(), (key, tx));
        Ok(rx)
    }

    /// A qué `(flow, step, work item)` corresponde un `receipt_token` aún
    /// pendiente — `None` si ya se resolvió, expiró o nunca existió.
    pub fn key_for(&self, receipt_token: &str) -> Option<CorrelationKey> {
        self.pending.get(receipt_token).map(|entry| entry.value().0.clone())
    }

    /// Invocado por el endpoint de webhook (fuera de alcance) cuando llega
    /// la respuesta del colaborador externo. `Err(NotFound)` si el token ya
    /// expiró o nunca existió — el webhook debería responder 404 en ese
    /// caso, no reintentar.
    pub fn resolve(&self, receipt_token: &str, response: serde_json::Value) -> Result<(), CorrelationError> {
        match self.pending.remove(receipt_token) {
            Some((_, (_, tx))) => tx.send(response).map_err(|_| CorrelationError::SenderDropped),
            None => Err(CorrelationError::NotFound),
        }
    }

    /// Espera la resolución de `receipt_token` hasta `timeout`, limpiando
    /// la entrada de la tabla en cualquier desenlace.
    pub async fn wait(
        &self,
        receipt_token: &str,
        rx: oneshot::Receiver<serde_json::Value>,
        step_timeout: Duration,
    ) -> Result<serde_json::Value, CorrelationError> {
        match timeout(step_timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(CorrelationError::SenderDropped),
            Err(_) => {
                self.pending.remove(receipt_token);
                warn!(receipt_token, "async step receipt token timed out");
                Err(CorrelationError::TimedOut)
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
