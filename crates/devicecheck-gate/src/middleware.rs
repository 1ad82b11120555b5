//! axum adapter for the device gate
//!
//! Looks for the device token in the `Device-Token` header (or one of its
//! spellings) and then in the JSON body. On success the token is stored in
//! the request extensions as [`DeviceToken`] for downstream handlers.
//!
//! Only bodies whose length is known to fit the buffer limit are read, and
//! they are put back byte for byte. Larger or unsized bodies are passed on
//! untouched without being inspected.

use async_trait::async_trait;
use axum::{
    body::{Body, HttpBody},
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use devicecheck_client::DeviceTokenValidator;
use std::sync::Arc;
use tracing::debug;

use crate::api::error::ApiError;
use crate::gate::{DeviceGate, TokenExtractor, Verdict};

/// Header names checked for a token, in order (matching is case-insensitive)
///
/// CGI-style `HTTP_DEVICE_TOKEN` keys never reach axum, which sees raw header names.
pub const DEVICE_TOKEN_HEADERS: [&str; 3] = ["device-token", "devicetoken", "device_token"];

/// JSON body keys checked for a token, in order
pub const DEVICE_TOKEN_BODY_KEYS: [&str; 4] =
    ["device_token", "deviceToken", "devicetoken", "device-token"];

/// Largest body buffered while looking for a token
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Gate over axum requests
pub type AxumGate = DeviceGate<dyn DeviceTokenValidator, AxumTokenExtractor, InvalidDeviceResponse>;

/// Device token that passed the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for DeviceToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<DeviceToken>()
            .cloned()
            .ok_or_else(|| ApiError::BadRequest("device token missing".into()))
    }
}

/// Fixed response for missing or rejected tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDeviceResponse {
    pub status: StatusCode,
    pub body: String,
}

impl InvalidDeviceResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

impl Default for InvalidDeviceResponse {
    fn default() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Invalid device token")
    }
}

impl IntoResponse for InvalidDeviceResponse {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}

/// Reads the device token from headers, then from a JSON body
#[derive(Debug, Clone)]
pub struct AxumTokenExtractor {
    max_body_bytes: usize,
}

impl AxumTokenExtractor {
    pub fn new() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Limit how much of the body is buffered
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

impl Default for AxumTokenExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    DEVICE_TOKEN_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| {
                debug!(header = name, "Found device token in header");
                v.to_string()
            })
    })
}

fn token_from_json(body: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    DEVICE_TOKEN_BODY_KEYS.iter().find_map(|key| {
        json.get(*key)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(|v| {
                debug!(key = key, "Found device token in JSON body");
                v.to_string()
            })
    })
}

#[async_trait]
impl TokenExtractor<Request> for AxumTokenExtractor {
    async fn extract(&self, request: &mut Request) -> Option<String> {
        if let Some(token) = token_from_headers(request.headers()) {
            return Some(token);
        }

        match request.body().size_hint().upper() {
            Some(len) if len as usize <= self.max_body_bytes => {}
            size => {
                debug!(
                    upper = ?size,
                    limit = self.max_body_bytes,
                    "Request body not inspected for device token"
                );
                return None;
            }
        }

        let body = std::mem::take(request.body_mut());
        let bytes = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Could not buffer request body");
                return None;
            }
        };

        let token = token_from_json(&bytes);
        *request.body_mut() = Body::from(bytes);
        token
    }
}

/// Reject requests without a valid device token
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn require_device(
    State(gate): State<Arc<AxumGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    match gate.check(&mut request).await {
        Verdict::Proceed { device_token } => {
            if let Some(token) = device_token {
                request.extensions_mut().insert(DeviceToken(token));
            }
            next.run(request).await
        }
        Verdict::Reject => gate.invalid_response().clone().into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_spellings() {
        for name in ["Device-Token", "DEVICE-TOKEN", "DeviceToken", "device_token"] {
            let mut headers = HeaderMap::new();
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static("abc"),
            );
            assert_eq!(token_from_headers(&headers).as_deref(), Some("abc"), "{}", name);
        }
    }

    #[test]
    fn test_blank_header_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("device-token", HeaderValue::from_static("  "));
        assert_eq!(token_from_headers(&headers), None);
    }

    #[test]
    fn test_body_keys() {
        for key in DEVICE_TOKEN_BODY_KEYS {
            let body = serde_json::json!({ key: "abc" }).to_string();
            assert_eq!(token_from_json(body.as_bytes()).as_deref(), Some("abc"), "{}", key);
        }
        assert_eq!(token_from_json(b"not json"), None);
        assert_eq!(token_from_json(br#"{"device_token": 42}"#), None);
    }

    #[tokio::test]
    async fn test_body_restored_after_extraction() {
        let body = r#"{"device_token": "abc", "bit0": true}"#;
        let mut request = axum::http::Request::builder()
            .uri("/")
            .body(Body::from(body))
            .unwrap();

        let token = AxumTokenExtractor::new().extract(&mut request).await;
        assert_eq!(token.as_deref(), Some("abc"));

        let restored = axum::body::to_bytes(std::mem::take(request.body_mut()), usize::MAX)
            .await
            .unwrap();
        assert_eq!(restored, body.as_bytes());
    }

    #[tokio::test]
    async fn test_oversized_body_left_intact() {
        let body = format!(r#"{{"device_token": "abc", "pad": "{}"}}"#, "x".repeat(256));
        let mut request = axum::http::Request::builder()
            .uri("/")
            .body(Body::from(body.clone()))
            .unwrap();

        let token = AxumTokenExtractor::new()
            .with_max_body_bytes(64)
            .extract(&mut request)
            .await;
        assert_eq!(token, None);

        let remaining = axum::body::to_bytes(std::mem::take(request.body_mut()), usize::MAX)
            .await
            .unwrap();
        assert_eq!(remaining.len(), body.len());
        assert_eq!(remaining, body.as_bytes());
    }

    #[tokio::test]
    async fn test_body_at_limit_is_read() {
        let body = r#"{"device_token": "abc"}"#;
        let mut request = axum::http::Request::builder()
            .uri("/")
            .body(Body::from(body))
            .unwrap();

        let token = AxumTokenExtractor::new()
            .with_max_body_bytes(body.len())
            .extract(&mut request)
            .await;
        assert_eq!(token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_default_invalid_response() {
        let response = InvalidDeviceResponse::default().into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
