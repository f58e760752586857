//! Request metadata: device fingerprint and bearer token extraction.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE, USER_AGENT},
        request::Parts,
    },
};
use serde_json::{Map, Value};
use std::{convert::Infallible, net::SocketAddr};

use crate::auth::models::ClientContext;

const FALLBACK_IP: &str = "127.0.0.1";
const FALLBACK_USER_AGENT: &str = "Unknown";
const REDACTED: &str = "[redacted]";

#[async_trait]
impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(client_context(&parts.headers, peer))
    }
}

/// Build the caller's context from headers, falling back to the socket peer.
///
/// IP precedence: first `X-Forwarded-For` entry, `X-Real-IP`, peer, then
/// `127.0.0.1`.
#[must_use]
pub fn client_context(headers: &HeaderMap, peer: Option<String>) -> ClientContext {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let ip = forwarded
        .or(real_ip)
        .map(ToString::to_string)
        .or(peer)
        .unwrap_or_else(|| FALLBACK_IP.to_string());

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(FALLBACK_USER_AGENT);

    ClientContext::new(ip, user_agent).with_headers(header_snapshot(headers))
}

/// Headers as a JSON object for the session audit row. Credentials are masked.
fn header_snapshot(headers: &HeaderMap) -> Value {
    let mut snapshot = Map::new();
    for (name, value) in headers {
        let value = if *name == AUTHORIZATION || *name == COOKIE {
            REDACTED.to_string()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        snapshot.insert(name.as_str().to_string(), Value::String(value));
    }
    Value::Object(snapshot)
}

/// Token from `Authorization: Bearer <token>`. The scheme is case-insensitive.
#[must_use]
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        headers.insert(USER_AGENT, HeaderValue::from_static("okhttp/4.12"));

        let client = client_context(&headers, Some("192.168.1.1".to_string()));
        assert_eq!(client.fingerprint.ip_address, "203.0.113.7");
        assert_eq!(client.fingerprint.user_agent, "okhttp/4.12");
    }

    #[test]
    fn falls_back_through_real_ip_peer_and_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(
            client_context(&headers, Some("192.168.1.1".to_string()))
                .fingerprint
                .ip_address,
            "10.0.0.9"
        );

        let headers = HeaderMap::new();
        assert_eq!(
            client_context(&headers, Some("192.168.1.1".to_string()))
                .fingerprint
                .ip_address,
            "192.168.1.1"
        );

        let client = client_context(&headers, None);
        assert_eq!(client.fingerprint.ip_address, "127.0.0.1");
        assert_eq!(client.fingerprint.user_agent, "Unknown");
    }

    #[test]
    fn snapshot_masks_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert("x-request-id", HeaderValue::from_static("01J"));

        let client = client_context(&headers, None);
        assert_eq!(client.headers["authorization"], "[redacted]");
        assert_eq!(client.headers["x-request-id"], "01J");
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  tok.en "));
        assert_eq!(extract_bearer_token(&headers), Some("tok.en"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
