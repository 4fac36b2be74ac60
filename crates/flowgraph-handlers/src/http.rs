//! `HttpSyncHandler`/`HttpAsyncHandler`: invocan el endpoint HTTP externo de
//! un step (§4.6, §6).
//!
//! El payload saliente y entrante son los tipos de alambre `StepRequest`/
//! `StepResponse` de §6 — el único contrato que este crate necesita del
//! lado del endpoint externo, sea cual sea su implementación.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowgraph_core::{DispatchError, DispatchMetadata, Handler, HandlerOutcome, Step};
use flowgraph_correlation::{CorrelationKey, CorrelationTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload enviado al endpoint de un step, en nombres externos de atributo
/// ya materializados por `flowgraph_core::dispatcher::materialize_args`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRequest {
    pub flow_id: String,
    pub step_id: String,
    pub token: String,
    pub args: Value,
    pub metadata: RequestMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub webhook_url: Option<String>,
}

/// Respuesta de un step síncrono, o la resolución final de uno asíncrono
/// entregada por el webhook (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResponse {
    pub success: bool,
    #[serde(default)]
    pub outputs: Value,
    pub error: Option<String>,
}

/// Aceptación `202` de un step asíncrono: el endpoint promete invocar el
/// `webhook_url` con un `StepResponse` una vez termine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncAccepted {
    pub receipt_token: String,
}

fn build_request(step: &Step, args: &Value, meta: &DispatchMetadata) -> StepRequest {
    StepRequest {
        flow_id: meta.flow_id.to_string(),
        step_id: meta.step_id.to_string(),
        token: meta.receipt_token.clone().unwrap_or_default(),
        args: args.clone(),
        metadata: RequestMetadata { webhook_url: meta.webhook_url.clone() },
    }
}

/// Step HTTP síncrono: espera la respuesta en la misma conexión, acotada
/// por `HttpConfig.timeout_ms`.
pub struct HttpSyncHandler {
    client: reqwest::Client,
}

impl HttpSyncHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpSyncHandler {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Handler for HttpSyncHandler {
    async fn invoke(&self, step: &Step, args: Value, meta: DispatchMetadata) -> Result<HandlerOutcome, DispatchError> {
        let http = step.http.as_ref().ok_or_else(|| DispatchError::ScriptError("missing http config".to_string()))?;
        let request = build_request(step, &args, &meta);

        let response = self
            .client
            .post(&http.endpoint)
            .json(&request)
            .timeout(Duration::from_millis(http.timeout_ms))
            .send()
            .await
            .map_err(|e| if e.is_timeout() { DispatchError::Timeout } else { DispatchError::HttpStatus(0) })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::HttpStatus(status.as_u16()));
        }
        let body: StepResponse =
            response.json().await.map_err(|e| DispatchError::ScriptError(format!("invalid response body: {e}")))?;
        Ok(HandlerOutcome { success: body.success, outputs: body.outputs, error: body.error })
    }
}

/// Step HTTP asíncrono: el POST inicial sólo confirma recepción
/// (`AsyncAccepted`); el resultado real llega más tarde al `webhook_url`
/// suministrado, resuelto contra la `CorrelationTable` compartida.
pub struct HttpAsyncHandler {
    client: reqwest::Client,
    correlation: Arc<CorrelationTable>,
    webhook_base: String,
}

impl HttpAsyncHandler {
    pub fn new(client: reqwest::Client, correlation: Arc<CorrelationTable>, webhook_base: impl Into<String>) -> Self {
        Self { client, correlation, webhook_base: webhook_base.into() }
    }
}

#[async_trait]
impl Handler for HttpAsyncHandler {
    async fn invoke(&self, step: &Step, args: Value, mut meta: DispatchMetadata) -> Result<HandlerOutcome, DispatchError> {
        let http = step.http.as_ref().ok_or_else(|| DispatchError::ScriptError("missing http config".to_string()))?;

        let receipt_token = uuid::Uuid::new_v4().to_string();
        meta.receipt_token = Some(receipt_token.clone());
        meta.webhook_url = Some(format!("{}/{}", self.webhook_base.trim_end_matches('/'), receipt_token));

        let key = CorrelationKey { flow_id: meta.flow_id.clone(), step_id: meta.step_id.clone(), token: meta.work_token.clone() };
        let rx = self
            .correlation
            .register(&receipt_token, key)
            .map_err(|e| DispatchError::ScriptError(e.to_string()))?;

        let request = build_request(step, &args, &meta);
        let response = self
            .client
            .post(&http.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { DispatchError::Timeout } else { DispatchError::HttpStatus(0) })?;

        if response.status().as_u16() != 202 {
            return Err(DispatchError::HttpStatus(response.status().as_u16()));
        }

        let resolved = self
            .correlation
            .wait(&receipt_token, rx, Duration::from_millis(http.timeout_ms))
            .await
            .map_err(|e| DispatchError::ScriptError(e.to_string()))?;
        let body: StepResponse =
            serde_json::from_value(resolved).map_err(|e| DispatchError::ScriptError(format!("invalid webhook body: {e}")))?;
        Ok(HandlerOutcome { success: body.success, outputs: body.outputs, error: body.error })
    }
}
