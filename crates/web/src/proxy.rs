//! Plain HTTP forwarding to upstreams

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use studio_common::ProxyRule;
use thiserror::Error;
use tracing::debug;

/// Pooled client used for plain forwards
pub type HttpClient = Client<HttpConnector, Body>;

/// Forwarding failures, surfaced to the browser as HTTP errors
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("upstream {upstream} unreachable: {reason}")]
    Connect { upstream: String, reason: String },

    #[error("upstream {upstream} failed: {reason}")]
    Upstream { upstream: String, reason: String },

    #[error("upgrade through {upstream} failed: {reason}")]
    Upgrade { upstream: String, reason: String },

    #[error("invalid proxied request: {0}")]
    BadRequest(String),

    #[error("{0} only accepts WebSocket connections")]
    UpgradeRequired(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Connect { .. }
            | ProxyError::Upstream { .. }
            | ProxyError::Upgrade { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpgradeRequired(_) => StatusCode::UPGRADE_REQUIRED,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Forwards request/response pairs over a shared connection pool
#[derive(Clone)]
pub struct HttpForwarder {
    client: HttpClient,
}

impl HttpForwarder {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    /// Forward `req` to the rule's upstream with path and query unchanged
    pub async fn forward(&self, rule: &ProxyRule, req: Request) -> Result<Response, ProxyError> {
        let (mut parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri: Uri = format!("{}{}", rule.upstream.http_base(), path_and_query)
            .parse()
            .map_err(|e| ProxyError::BadRequest(format!("{}", e)))?;

        debug!(
            "{} {} -> {} ({})",
            parts.method, path_and_query, rule.upstream, rule.prefix
        );

        let original_authority = parts.uri.authority().map(|a| a.to_string());
        strip_hop_by_hop(&mut parts.headers);
        set_host(&mut parts.headers, rule, original_authority.as_deref());

        parts.uri = uri;
        parts.version = Version::HTTP_11;

        let upstream_req = Request::from_parts(parts, body);
        let response = self.client.request(upstream_req).await.map_err(|e| {
            if e.is_connect() {
                ProxyError::Connect {
                    upstream: rule.upstream.authority(),
                    reason: error_chain(&e),
                }
            } else {
                ProxyError::Upstream {
                    upstream: rule.upstream.authority(),
                    reason: error_chain(&e),
                }
            }
        })?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new()
    }
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove connection-scoped headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Apply the rule's origin policy to the `Host` header
pub fn set_host(headers: &mut HeaderMap, rule: &ProxyRule, original_authority: Option<&str>) {
    if rule.change_origin {
        if let Ok(value) = HeaderValue::from_str(&rule.upstream.authority()) {
            headers.insert(header::HOST, value);
        }
    } else if !headers.contains_key(header::HOST) {
        // HTTP/2 clients carry the authority in the URI rather than a header.
        if let Some(value) = original_authority.and_then(|a| HeaderValue::from_str(a).ok()) {
            headers.insert(header::HOST, value);
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_common::{ProxyMode, Upstream};

    fn rule(change_origin: bool) -> ProxyRule {
        ProxyRule {
            prefix: "/api".to_string(),
            upstream_name: "app".to_string(),
            upstream: Upstream::parse("http://app:8000").unwrap(),
            mode: ProxyMode::Http,
            change_origin,
        }
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace"));
        headers.insert("x-trace", HeaderValue::from_static("1"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::UPGRADE).is_none());
        assert!(headers.get("x-trace").is_none());
        assert_eq!(headers.get(header::ACCEPT).unwrap(), "*/*");
    }

    #[test]
    fn test_host_rewrite() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:3000"));
        set_host(&mut headers, &rule(true), None);
        assert_eq!(headers.get(header::HOST).unwrap(), "app:8000");

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:3000"));
        set_host(&mut headers, &rule(false), None);
        assert_eq!(headers.get(header::HOST).unwrap(), "localhost:3000");

        let mut headers = HeaderMap::new();
        set_host(&mut headers, &rule(false), Some("studio.local"));
        assert_eq!(headers.get(header::HOST).unwrap(), "studio.local");
    }

    #[test]
    fn test_error_status() {
        let err = ProxyError::Connect {
            upstream: "app:8000".to_string(),
            reason: "refused".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ProxyError::UpgradeRequired("/websockify".to_string()).status(),
            StatusCode::UPGRADE_REQUIRED
        );
    }
}
