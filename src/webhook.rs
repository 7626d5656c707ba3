//! Inbound HTTP surface: webhook verification, message delivery and health.
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::handlers::Engine;
use crate::whatsapp::model::WebhookPayload;

#[derive(Clone)]
pub struct WebhookState {
    pub engine: Arc<Engine>,
    pub verify_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// The challenge to echo back when the subscription request is genuine.
pub fn verify_subscription(params: &VerifyParams, expected_token: &str) -> Option<String> {
    if params.mode.as_deref() != Some("subscribe") {
        return None;
    }
    if params.verify_token.as_deref() != Some(expected_token) {
        return None;
    }
    params.challenge.clone()
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(verify).post(receive))
        .route("/health", get(health))
        .with_state(state)
}

async fn verify(
    State(state): State<WebhookState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    match verify_subscription(&params, &state.verify_token) {
        Some(challenge) => {
            info!("webhook subscription verified");
            (StatusCode::OK, challenge)
        }
        None => {
            warn!(mode = ?params.mode, "webhook verification rejected");
            (StatusCode::FORBIDDEN, String::new())
        }
    }
}

/// Acknowledge at once; each message is handled on its own task.
async fn receive(State(state): State<WebhookState>, body: Bytes) -> StatusCode {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(err) => {
            warn!(?err, "malformed webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };
    let messages = payload.into_messages();
    debug!(count = messages.len(), "webhook received");
    for msg in messages {
        let engine = state.engine.clone();
        tokio::spawn(async move {
            engine.handle_inbound(msg).await;
        });
    }
    StatusCode::OK
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: &str, token: &str, challenge: &str) -> VerifyParams {
        VerifyParams {
            mode: Some(mode.into()),
            verify_token: Some(token.into()),
            challenge: Some(challenge.into()),
        }
    }

    #[test]
    fn echoes_challenge_for_matching_token() {
        assert_eq!(
            verify_subscription(&params("subscribe", "s3cret", "1158201444"), "s3cret"),
            Some("1158201444".into())
        );
    }

    #[test]
    fn rejects_wrong_token_or_mode() {
        assert_eq!(verify_subscription(&params("subscribe", "nope", "1"), "s3cret"), None);
        assert_eq!(verify_subscription(&params("unsubscribe", "s3cret", "1"), "s3cret"), None);
        assert_eq!(verify_subscription(&VerifyParams::default(), "s3cret"), None);
    }

    #[test]
    fn query_names_use_hub_prefix() {
        let p: VerifyParams = serde_json::from_value(serde_json::json!({
            "hub.mode": "subscribe",
            "hub.verify_token": "t",
            "hub.challenge": "c"
        }))
        .unwrap();
        assert_eq!(verify_subscription(&p, "t"), Some("c".into()));
    }
}
