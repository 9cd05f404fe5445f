//! Authentication module
//!
//! Operator requests carry a bearer token compared against a SHA-256
//! digest of the configured token. The webhook endpoint is exempt and
//! authenticates with its own shared secret.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use outpost_core::{AutoReplyBot, CampaignDispatcher, WebhookIngestor};
use outpost_storage::DatabasePool;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabasePool,
    pub dispatcher: Arc<CampaignDispatcher>,
    pub ingestor: WebhookIngestor,
    pub bot: Arc<AutoReplyBot>,
    /// Hex SHA-256 digest of the operator token; `None` disables the API
    pub auth_token_digest: Option<String>,
    /// Shared secret expected on webhook deliveries
    pub webhook_secret: Option<String>,
}

/// Hash a token for comparison
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the bearer token from a request
fn extract_bearer(req: &Request) -> Option<&str> {
    let auth = req.headers().get("authorization")?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
}

/// Authentication middleware for operator routes
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.auth_token_digest.as_deref() else {
        warn!("operator token not configured, rejecting API request");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let token = extract_bearer(&request).ok_or_else(|| {
        warn!("missing bearer token for {}", request.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    if hash_token(token) != expected {
        warn!("bearer token mismatch for {}", request.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::hash_token;
    use pretty_assertions::assert_eq;

    #[test]
    fn hash_is_stable_hex_sha256() {
        let digest = hash_token("secret-token");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("secret-token"));
        assert_ne!(digest, hash_token("other-token"));
    }
}
