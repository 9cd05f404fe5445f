//! WhatsApp gateway client
//!
//! Sends single text messages through the provider's HTTP API using
//! `reqwest` with bearer-token authentication. Failures carry the HTTP
//! status when one was observed so the failure classifier can act on it.

use outpost_common::config::GatewayConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A message accepted by the provider
#[derive(Debug, Clone)]
pub struct SentText {
    /// Provider-assigned message id, later echoed in status webhooks
    pub provider_message_id: String,
}

/// Gateway send failure
///
/// The message embeds the HTTP status when one was received, and the status
/// is carried separately for the failure classifier.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct GatewayError {
    /// HTTP status of the provider response, when one was received
    pub status: Option<u16>,
    pub message: String,
}

impl GatewayError {
    fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

/// Envelope returned by the provider's send-text endpoint
#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    sent: Option<bool>,
    message: Option<SendResponseMessage>,
    error: Option<SendResponseError>,
}

#[derive(Debug, Deserialize)]
struct SendResponseMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SendResponseError {
    message: String,
}

/// WhatsApp gateway client
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GatewayClient {
    /// Create a client from configuration
    pub fn new(config: &GatewayConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config
                .token
                .clone()
                .filter(|t| !t.trim().is_empty()),
        }
    }

    /// Create a client pointing at a custom base URL (used by tests)
    pub fn with_base_url(base_url: &str, token: Option<&str>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(str::to_string).filter(|t| !t.trim().is_empty()),
        }
    }

    /// Whether credentials are present; campaigns fail fast when not
    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Return the configured base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a single text message; returns the provider message id
    pub async fn send_text(&self, to: &str, body: &str) -> Result<SentText, GatewayError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| GatewayError::transport("gateway token not configured"))?;

        let url = format!("{}/messages/text", self.base_url);
        let payload = serde_json::json!({
            "to": to,
            "body": body,
        });

        debug!(url = %url, to = %to, "sending text via gateway");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError {
                status: Some(status.as_u16()),
                message: format!("provider returned {}: {}", status, text),
            });
        }

        let envelope: SendResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::transport(format!("bad provider response: {}", e)))?;

        if let Some(err) = envelope.error {
            return Err(GatewayError {
                status: Some(status.as_u16()),
                message: err.message,
            });
        }

        if envelope.sent == Some(false) {
            return Err(GatewayError {
                status: Some(status.as_u16()),
                message: "provider refused the message".to_string(),
            });
        }

        let provider_message_id = envelope
            .message
            .map(|m| m.id)
            .ok_or_else(|| GatewayError::transport("provider response missing message id"))?;

        Ok(SentText {
            provider_message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn unconfigured_without_token() {
        let client = GatewayClient::with_base_url("http://localhost:9", None);
        assert!(!client.is_configured());

        let client = GatewayClient::with_base_url("http://localhost:9", Some("  "));
        assert!(!client.is_configured());

        let client = GatewayClient::with_base_url("http://localhost:9/", Some("tok"));
        assert!(client.is_configured());
        assert_eq!(client.base_url(), "http://localhost:9");
    }

    #[tokio::test]
    async fn send_text_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages/text"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({"to": "5491155551234"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sent": true,
                "message": {"id": "wamid.1"}
            })))
            .mount(&server)
            .await;

        let client = GatewayClient::with_base_url(&server.uri(), Some("tok"));
        let sent = client.send_text("5491155551234", "hola").await.unwrap();
        assert_eq!(sent.provider_message_id, "wamid.1");
    }

    #[tokio::test]
    async fn send_text_http_error_carries_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages/text"))
            .respond_with(ResponseTemplate::new(429).set_body_string("too many requests"))
            .mount(&server)
            .await;

        let client = GatewayClient::with_base_url(&server.uri(), Some("tok"));
        let err = client.send_text("549", "x").await.unwrap_err();
        assert_eq!(err.status, Some(429));
        assert!(err.message.contains("too many requests"));
    }

    #[tokio::test]
    async fn send_text_provider_error_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sent": false,
                "error": {"message": "trial quota exceeded"}
            })))
            .mount(&server)
            .await;

        let client = GatewayClient::with_base_url(&server.uri(), Some("tok"));
        let err = client.send_text("549", "x").await.unwrap_err();
        assert_eq!(err.status, Some(200));
        assert_eq!(err.message, "trial quota exceeded");
    }

    #[tokio::test]
    async fn send_text_without_token_fails_fast() {
        let client = GatewayClient::with_base_url("http://127.0.0.1:1", None);
        let err = client.send_text("549", "x").await.unwrap_err();
        assert!(err.status.is_none());
        assert!(err.message.contains("not configured"));
    }
}
