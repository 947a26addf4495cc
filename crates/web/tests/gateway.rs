//! End-to-end gateway tests against live stub upstreams

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
use axum::extract::Request;
use axum::http::header::{HOST, UPGRADE};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use studio_common::{GatewayConfig, ProxyMode, ProxyRuleConfig, RouteScheme};
use studio_web::GatewayServer;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

async fn spawn_http_server(app: Router) -> Result<(SocketAddr, oneshot::Sender<()>)> {
    spawn_http_server_on("127.0.0.1:0", app).await
}

async fn spawn_http_server_on(
    bind: &str,
    app: Router,
) -> Result<(SocketAddr, oneshot::Sender<()>)> {
    let listener = TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });
    Ok((addr, shutdown_tx))
}

async fn echo(name: &'static str, req: Request) -> Json<Value> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    Json(json!({
        "upstream": name,
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "host": parts.headers.get(HOST).and_then(|v| v.to_str().ok()),
        "upgrade": parts.headers.get(UPGRADE).and_then(|v| v.to_str().ok()),
        "body": String::from_utf8_lossy(&bytes),
    }))
}

async fn ws_echo(mut socket: WebSocket, name: &'static str) {
    while let Some(Ok(msg)) = socket.recv().await {
        let reply = match msg {
            AxumMessage::Text(text) => AxumMessage::Text(format!("{}:{}", name, text)),
            AxumMessage::Binary(data) => AxumMessage::Binary(data),
            AxumMessage::Close(_) => break,
            _ => continue,
        };
        if socket.send(reply).await.is_err() {
            break;
        }
    }
}

/// Upstream that echoes request metadata and WebSocket messages tagged with `name`
fn stub_upstream(name: &'static str) -> Router {
    Router::new()
        .route(
            "/ws/*rest",
            get(move |ws: WebSocketUpgrade| async move {
                ws.on_upgrade(move |socket| ws_echo(socket, name))
            }),
        )
        .route(
            "/websockify",
            get(move |ws: WebSocketUpgrade| async move {
                ws.on_upgrade(move |socket| ws_echo(socket, name))
            }),
        )
        .fallback(move |req: Request| echo(name, req))
}

async fn closed_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

struct Harness {
    gateway: SocketAddr,
    app: SocketAddr,
    vnc: SocketAddr,
    _shutdown: Vec<oneshot::Sender<()>>,
}

impl Harness {
    async fn start(scheme: RouteScheme) -> Result<Self> {
        Self::start_with(scheme, |_| {}).await
    }

    async fn start_with<F>(scheme: RouteScheme, customize: F) -> Result<Self>
    where
        F: FnOnce(&mut GatewayConfig),
    {
        let (app, app_shutdown) = spawn_http_server(stub_upstream("app")).await?;
        let (vnc, vnc_shutdown) = spawn_http_server(stub_upstream("vnc")).await?;

        let mut config = GatewayConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.router.scheme = scheme;
        config.set_upstream("app", &format!("http://{}", app))?;
        config.set_upstream("vnc", &format!("http://{}", vnc))?;
        customize(&mut config);

        let server = GatewayServer::new(config)?;
        let (gateway, gateway_shutdown) = spawn_http_server(server.router()).await?;

        Ok(Self {
            gateway,
            app,
            vnc,
            _shutdown: vec![app_shutdown, vnc_shutdown, gateway_shutdown],
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.gateway, path)
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.gateway, path)
    }
}

fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()?)
}

async fn get_json(url: &str) -> Result<(reqwest::StatusCode, Value)> {
    let resp = client()?.get(url).send().await?;
    let status = resp.status();
    Ok((status, resp.json().await?))
}

async fn next_message<S>(stream: &mut S) -> Result<WsMessage>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    let next = tokio::time::timeout(Duration::from_secs(2), stream.next()).await?;
    let Some(frame) = next else {
        return Err(anyhow!("stream closed before a frame arrived"));
    };
    Ok(frame?)
}

#[tokio::test]
async fn http_prefixes_reach_declared_upstream() -> Result<()> {
    let h = Harness::start(RouteScheme::Flat).await?;

    let cases = [
        ("/api/tasks?limit=5", "app", h.app, "/api/tasks", Some("limit=5")),
        ("/screenshots/before.png", "app", h.app, "/screenshots/before.png", None),
        ("/uploads/routes.csv", "app", h.app, "/uploads/routes.csv", None),
        ("/vnc.html?autoconnect=1", "vnc", h.vnc, "/vnc.html", Some("autoconnect=1")),
    ];

    for (request, upstream, addr, path, query) in cases {
        let (status, body) = get_json(&h.url(request)).await?;
        assert_eq!(status, reqwest::StatusCode::OK, "request {}", request);
        assert_eq!(body["upstream"], upstream, "request {}", request);
        assert_eq!(body["path"], path);
        assert_eq!(body["query"], json!(query));
        assert_eq!(body["host"], addr.to_string(), "origin rewrite for {}", request);
    }
    Ok(())
}

#[tokio::test]
async fn plain_request_on_websocket_prefix_is_forwarded() -> Result<()> {
    let h = Harness::start(RouteScheme::Flat).await?;
    let (status, body) = get_json(&h.url("/ws?probe=1")).await?;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["upstream"], "app");
    assert_eq!(body["path"], "/ws");
    assert_eq!(body["query"], "probe=1");
    Ok(())
}

#[tokio::test]
async fn host_preserved_without_change_origin() -> Result<()> {
    let h = Harness::start_with(RouteScheme::Flat, |config| {
        for rule in &mut config.proxy {
            rule.change_origin = false;
        }
    })
    .await?;

    let (_, body) = get_json(&h.url("/api/health")).await?;
    assert_eq!(body["host"], h.gateway.to_string());
    Ok(())
}

#[tokio::test]
async fn request_body_is_forwarded() -> Result<()> {
    let h = Harness::start(RouteScheme::Flat).await?;
    let resp = client()?
        .post(h.url("/api/automation/run"))
        .json(&json!({"task_id": 2}))
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await?;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"], r#"{"task_id":2}"#);
    Ok(())
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() -> Result<()> {
    let port = closed_port().await?;
    let h = Harness::start_with(RouteScheme::Flat, move |config| {
        config
            .upstreams
            .insert("app".to_string(), format!("http://127.0.0.1:{}", port));
    })
    .await?;

    let resp = client()?.get(h.url("/api/tasks")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);

    match connect_async(h.ws_url("/ws/automation")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 502),
        other => return Err(anyhow!("expected 502, got {:?}", other.map(|(_, r)| r.status()))),
    }
    Ok(())
}

#[tokio::test]
async fn websocket_upgrade_through_ws_prefix() -> Result<()> {
    let h = Harness::start(RouteScheme::Flat).await?;

    let (mut stream, response) = connect_async(h.ws_url("/ws/automation/1")).await?;
    assert_eq!(response.status().as_u16(), 101);

    stream.send(WsMessage::Text("ping".to_string())).await?;
    match next_message(&mut stream).await? {
        WsMessage::Text(text) => assert_eq!(text, "app:ping"),
        other => return Err(anyhow!("unexpected frame: {:?}", other)),
    }
    Ok(())
}

#[tokio::test]
async fn websocket_upgrade_to_ipv6_upstream() -> Result<()> {
    let (app6, _app6_shutdown) = spawn_http_server_on("[::1]:0", stub_upstream("app6")).await?;
    let target = format!("http://[::1]:{}", app6.port());
    let h = Harness::start_with(RouteScheme::Flat, |config| {
        config.upstreams.insert("app".to_string(), target);
    })
    .await?;

    let (mut stream, response) = connect_async(h.ws_url("/ws/automation/6")).await?;
    assert_eq!(response.status().as_u16(), 101);

    stream.send(WsMessage::Text("ping".to_string())).await?;
    match next_message(&mut stream).await? {
        WsMessage::Text(text) => assert_eq!(text, "app6:ping"),
        other => return Err(anyhow!("unexpected frame: {:?}", other)),
    }

    let (status, body) = get_json(&h.url("/api/items")).await?;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["upstream"], "app6");
    assert_eq!(body["host"], format!("[::1]:{}", app6.port()));
    Ok(())
}

#[tokio::test]
async fn websockify_upgrade_reaches_vnc_upstream() -> Result<()> {
    let h = Harness::start(RouteScheme::Flat).await?;

    let (mut stream, _) = connect_async(h.ws_url("/websockify")).await?;
    stream.send(WsMessage::Text("hello".to_string())).await?;
    match next_message(&mut stream).await? {
        WsMessage::Text(text) => assert_eq!(text, "vnc:hello"),
        other => return Err(anyhow!("unexpected frame: {:?}", other)),
    }

    stream.send(WsMessage::Binary(vec![0x52, 0x46, 0x42])).await?;
    match next_message(&mut stream).await? {
        WsMessage::Binary(data) => assert_eq!(data, vec![0x52, 0x46, 0x42]),
        other => return Err(anyhow!("unexpected frame: {:?}", other)),
    }
    Ok(())
}

#[tokio::test]
async fn http_prefix_does_not_upgrade() -> Result<()> {
    let h = Harness::start(RouteScheme::Flat).await?;

    match connect_async(h.ws_url("/api/socket")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 200),
        Ok(_) => return Err(anyhow!("HTTP prefix completed an upgrade")),
        Err(other) => return Err(anyhow!("unexpected error: {}", other)),
    }

    let resp = client()?
        .get(h.url("/api/socket"))
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .send()
        .await?;
    let body: Value = resp.json().await?;
    assert_eq!(body["upgrade"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn tcp_bridge_relays_binary_frames() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let echo_addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut read, mut write) = socket.split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
            });
        }
    });

    let h = Harness::start_with(RouteScheme::Flat, move |config| {
        config
            .upstreams
            .insert("rfb".to_string(), format!("http://{}", echo_addr));
        config.proxy.retain(|rule| rule.prefix != "/websockify");
        config
            .proxy
            .insert(0, ProxyRuleConfig::new("/websockify", "rfb", ProxyMode::Tcp));
    })
    .await?;

    let (mut stream, _) = connect_async(h.ws_url("/websockify")).await?;
    stream.send(WsMessage::Binary(vec![1, 2, 3])).await?;
    match next_message(&mut stream).await? {
        WsMessage::Binary(data) => assert_eq!(data, vec![1, 2, 3]),
        other => return Err(anyhow!("unexpected frame: {:?}", other)),
    }

    let resp = client()?.get(h.url("/websockify")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::UPGRADE_REQUIRED);
    Ok(())
}

#[tokio::test]
async fn flat_and_nested_tables_are_exclusive() -> Result<()> {
    let flat = Harness::start(RouteScheme::Flat).await?;
    let resp = client()?.get(flat.url("/tasks")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.headers()["x-studio-component"], "TaskList");

    let nested = Harness::start(RouteScheme::Nested).await?;
    let resp = client()?.get(nested.url("/tasks")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let resp = client()?.get(nested.url("/test/runner/5")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.headers()["x-studio-component"], "AutomationRunner");
    assert_eq!(resp.headers()["x-studio-props"], r#"{"taskId":"5"}"#);
    Ok(())
}

#[tokio::test]
async fn dist_assets_and_shell_are_served() -> Result<()> {
    let dist = tempfile::tempdir()?;
    std::fs::create_dir_all(dist.path().join("assets"))?;
    std::fs::write(
        dist.path().join("index.html"),
        "<html><head><title>Studio</title></head><body><div id=\"app\">built</div></body></html>",
    )?;
    std::fs::write(dist.path().join("assets/index.js"), "export default 1;")?;

    let dist_dir = dist.path().to_path_buf();
    let h = Harness::start_with(RouteScheme::Flat, move |config| {
        config.server.dist_dir = Some(dist_dir);
    })
    .await?;

    let resp = client()?.get(h.url("/assets/index.js")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await?, "export default 1;");

    let resp = client()?.get(h.url("/builder")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let html = resp.text().await?;
    assert!(html.contains("built"));
    assert!(html.contains(r#""component":"TaskBuilder""#));
    Ok(())
}

#[tokio::test]
async fn introspection_endpoints() -> Result<()> {
    let h = Harness::start(RouteScheme::Nested).await?;

    let (status, health) = get_json(&h.url("/__studio/health")).await?;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["scheme"], "nested");

    let (_, routes) = get_json(&h.url("/__studio/routes")).await?;
    let paths: Vec<&str> = routes["routes"]
        .as_array()
        .ok_or_else(|| anyhow!("routes is not an array"))?
        .iter()
        .filter_map(|r| r["path"].as_str())
        .collect();
    assert_eq!(
        paths,
        vec![
            "/",
            "/test",
            "/test/tasks",
            "/test/builder",
            "/test/runner/:taskId?",
            "/test/vnc"
        ]
    );

    let (_, proxy) = get_json(&h.url("/__studio/proxy")).await?;
    assert_eq!(proxy.as_array().map(Vec::len), Some(6));
    assert_eq!(proxy[2]["prefix"], "/websockify");
    assert_eq!(proxy[2]["mode"], "websocket");
    Ok(())
}
