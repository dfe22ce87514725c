//! Request authentication for the webhook and admin API.
//!
//! Secrets are compared in constant time.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;

/// Shared-secret check for inbound webhooks.
#[derive(Debug, Clone)]
pub struct WebhookAuth {
    header: String,
    secret: Option<String>,
}

impl WebhookAuth {
    pub fn new(header: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
            secret,
        }
    }

    /// Accept everything.
    pub fn disabled() -> Self {
        Self::new("x-webhook-secret", None)
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.secret else {
            return true;
        };
        headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|provided| constant_time_eq(provided, expected))
    }
}

/// Check an `Authorization: Bearer <token>` header.
///
/// Always fails when no token is configured.
pub fn verify_bearer(headers: &HeaderMap, token: Option<&str>) -> bool {
    let Some(token) = token else {
        return false;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|provided| constant_time_eq(provided.trim(), token))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
