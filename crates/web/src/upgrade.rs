//! WebSocket upgrade tunnelling
//!
//! Replays the client's upgrade handshake against the upstream on a
//! dedicated connection and, once both sides have switched protocols,
//! splices the two byte streams together.

use crate::proxy::{set_host, ProxyError};
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri, Version},
    response::Response,
};
use hyper_util::rt::TokioIo;
use studio_common::ProxyRule;
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Whether the request asks for a WebSocket upgrade
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    let websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    connection_upgrade && websocket
}

/// Tunnel an upgrade request to the rule's upstream.
///
/// A `101` from the upstream is passed back to the client and the two
/// connections are spliced in a background task. Any other upstream answer
/// is relayed as an ordinary response.
pub async fn tunnel(rule: &ProxyRule, mut req: Request) -> Result<Response, ProxyError> {
    let upstream = rule.upstream.clone();
    let on_client_upgrade = hyper::upgrade::on(&mut req);

    let stream = TcpStream::connect((upstream.host.as_str(), upstream.port))
        .await
        .map_err(|e| ProxyError::Connect {
            upstream: upstream.authority(),
            reason: e.to_string(),
        })?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake::<_, Body>(TokioIo::new(stream))
        .await
        .map_err(|e| ProxyError::Upgrade {
            upstream: upstream.authority(),
            reason: e.to_string(),
        })?;

    tokio::spawn(async move {
        if let Err(e) = conn.with_upgrades().await {
            debug!("Upstream upgrade connection ended: {}", e);
        }
    });

    let (mut parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let original_authority = parts.uri.authority().map(|a| a.to_string());

    parts.uri = path_and_query
        .parse::<Uri>()
        .map_err(|e| ProxyError::BadRequest(e.to_string()))?;
    parts.version = Version::HTTP_11;
    for name in ["keep-alive", "te", "trailer", "transfer-encoding", "proxy-authorization"] {
        parts.headers.remove(name);
    }
    parts
        .headers
        .insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    set_host(&mut parts.headers, rule, original_authority.as_deref());

    debug!("Upgrade {} -> {} ({})", path_and_query, upstream, rule.prefix);

    let mut response = sender
        .send_request(Request::from_parts(parts, body))
        .await
        .map_err(|e| ProxyError::Upgrade {
            upstream: upstream.authority(),
            reason: e.to_string(),
        })?;

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        debug!(
            "Upstream {} declined upgrade with {}",
            upstream,
            response.status()
        );
        let (parts, body) = response.into_parts();
        return Ok(Response::from_parts(parts, Body::new(body)));
    }

    let on_upstream_upgrade = hyper::upgrade::on(&mut response);

    let mut client_response = Response::new(Body::empty());
    *client_response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    *client_response.headers_mut() = response.headers().clone();

    let authority = upstream.authority();
    tokio::spawn(async move {
        let (client_io, upstream_io) = match tokio::try_join!(on_client_upgrade, on_upstream_upgrade) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Upgrade to {} did not complete: {}", authority, e);
                return;
            }
        };

        let mut client_io = TokioIo::new(client_io);
        let mut upstream_io = TokioIo::new(upstream_io);
        match tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
            Ok((to_upstream, to_client)) => {
                trace!(
                    "Tunnel to {} closed: {} bytes up, {} bytes down",
                    authority,
                    to_upstream,
                    to_client
                );
            }
            Err(e) => debug!("Tunnel to {} ended: {}", authority, e),
        }
    });

    Ok(client_response)
}
