//! Provider webhook handler
//!
//! One endpoint receives both delivery-status callbacks and inbound
//! messages. Authentication is a shared secret in the `x-whapi-secret`
//! header or the `secret` query parameter. Once authenticated the response
//! is always `{ok:true}` so the provider never retry-storms a delivery it
//! considers failed.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::auth::AppState;

/// Webhook query parameters
#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    pub secret: Option<String>,
}

fn secret_of(headers: &HeaderMap, query: &WebhookQuery) -> Option<String> {
    if let Some(value) = headers.get("x-whapi-secret").and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }
    query.secret.clone()
}

/// Receive a provider webhook
///
/// POST /webhooks/whapi
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    // Fail fast when no secret is configured; never accept unauthenticated
    // deliveries silently
    let Some(expected) = state.webhook_secret.as_deref() else {
        warn!("webhook secret not configured, rejecting delivery");
        return Err(StatusCode::UNAUTHORIZED);
    };

    match secret_of(&headers, &query) {
        Some(provided) if provided == expected => {}
        _ => {
            warn!("webhook secret mismatch");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    // Status reconciliation and the bot each pull what they recognize from
    // the payload; a failure in either is logged and contained so the
    // provider still gets its ok
    let statuses = match state.ingestor.process(&payload).await {
        Ok(report) => report.applied,
        Err(e) => {
            error!("webhook status ingest failed: {}", e);
            0
        }
    };

    let replies = match state.bot.process_webhook(&payload).await {
        Ok(report) => report.replied,
        Err(e) => {
            error!("webhook bot processing failed: {}", e);
            0
        }
    };

    Ok(Json(serde_json::json!({
        "ok": true,
        "statuses": statuses,
        "replies": replies,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn secret_prefers_header_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert("x-whapi-secret", "from-header".parse().unwrap());
        let query = WebhookQuery {
            secret: Some("from-query".to_string()),
        };
        assert_eq!(secret_of(&headers, &query).as_deref(), Some("from-header"));
    }

    #[test]
    fn secret_falls_back_to_query() {
        let headers = HeaderMap::new();
        let query = WebhookQuery {
            secret: Some("from-query".to_string()),
        };
        assert_eq!(secret_of(&headers, &query).as_deref(), Some("from-query"));

        let none = WebhookQuery { secret: None };
        assert_eq!(secret_of(&headers, &none), None);
    }
}
