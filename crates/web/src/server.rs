//! Gateway server implementation

use crate::proxy::{HttpForwarder, ProxyError};
use crate::static_files::SpaAssets;
use crate::upgrade;
use crate::vnc_proxy::{self, TcpBridge};
use axum::{
    extract::{ws::WebSocketUpgrade, FromRequestParts, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use studio_common::{GatewayConfig, ProxyMode, ProxyRule, ProxyTable, RouteMatch, RouteTable};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Header naming the matched route
pub const ROUTE_HEADER: &str = "x-studio-route";
/// Header naming the mounted component
pub const COMPONENT_HEADER: &str = "x-studio-component";
/// Header carrying the forwarded props as JSON
pub const PROPS_HEADER: &str = "x-studio-props";

/// Everything a request needs, built once per process
pub struct GatewayContext {
    config: GatewayConfig,
    routes: RouteTable,
    proxy: ProxyTable,
    forwarder: HttpForwarder,
    assets: SpaAssets,
}

impl GatewayContext {
    /// Validate `config` and build the route and proxy tables
    pub fn new(config: GatewayConfig) -> studio_common::Result<Self> {
        config.validate()?;
        let routes = config.route_table();
        let proxy = config.proxy_table()?;
        let assets = SpaAssets::new(config.server.dist_dir.clone());

        Ok(Self {
            config,
            routes,
            proxy,
            forwarder: HttpForwarder::new(),
            assets,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn proxy(&self) -> &ProxyTable {
        &self.proxy
    }

    pub fn assets(&self) -> &SpaAssets {
        &self.assets
    }
}

/// Dev gateway server
#[derive(Clone)]
pub struct GatewayServer {
    ctx: Arc<GatewayContext>,
}

pub async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let server = GatewayServer::new(config)?;
    server.serve().await
}

impl GatewayServer {
    /// Create a new gateway server
    pub fn new(config: GatewayConfig) -> studio_common::Result<Self> {
        Ok(Self {
            ctx: Arc::new(GatewayContext::new(config)?),
        })
    }

    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.ctx
    }

    /// Create router
    pub fn router(&self) -> Router {
        let router = Router::new()
            // Gateway introspection, namespaced away from proxy prefixes
            .route("/__studio/health", get(health_handler))
            .route("/__studio/routes", get(routes_handler))
            .route("/__studio/resolve", get(resolve_handler))
            .route("/__studio/proxy", get(proxy_table_handler))
            // Proxy rules, built assets, then SPA routes
            .fallback(dispatch_handler)
            .with_state(self.ctx.clone())
            .layer(TraceLayer::new_for_http());

        if self.ctx.config().server.cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn serve(self) -> anyhow::Result<()> {
        let ctx = self.context();
        let addr = ctx.config().listen_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!(
            "Studio gateway listening on http://{} (router: {}, {} routes, {} proxy rules)",
            listener.local_addr()?,
            ctx.config().router.scheme,
            ctx.routes().len(),
            ctx.proxy().len()
        );
        for rule in ctx.proxy().rules() {
            info!("  {} -> {} [{}]", rule.prefix, rule.upstream, rule.mode);
        }
        match ctx.assets().dist_dir() {
            Some(dir) => info!("  assets from {}", dir.display()),
            None => info!("  no dist_dir; serving the embedded shell"),
        }

        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Studio gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

// ============================================================================
// Dispatch
// ============================================================================

async fn dispatch_handler(State(ctx): State<Arc<GatewayContext>>, req: Request) -> Response {
    let path = req.uri().path().to_string();

    if let Some(rule) = ctx.proxy().match_path(&path) {
        return match proxy_request(&ctx, rule, req).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Proxy {} failed: {}", path, e);
                e.into_response()
            }
        };
    }

    if req.method() != Method::GET && req.method() != Method::HEAD {
        return not_found();
    }

    if let Some(resp) = ctx.assets().serve_file(&path).await {
        return resp;
    }

    match ctx.routes().resolve(&path) {
        Some(route) => shell_response(&ctx, &route).await,
        None => {
            debug!("No route matches {}", path);
            not_found()
        }
    }
}

async fn proxy_request(
    ctx: &GatewayContext,
    rule: &ProxyRule,
    req: Request,
) -> Result<Response, ProxyError> {
    match rule.mode {
        ProxyMode::Http => ctx.forwarder.forward(rule, req).await,
        ProxyMode::WebSocket => {
            if upgrade::is_upgrade_request(req.headers()) {
                upgrade::tunnel(rule, req).await
            } else {
                ctx.forwarder.forward(rule, req).await
            }
        }
        ProxyMode::Tcp => bridge_request(rule, req).await,
    }
}

async fn bridge_request(rule: &ProxyRule, req: Request) -> Result<Response, ProxyError> {
    let (mut parts, _body) = req.into_parts();
    let ws = WebSocketUpgrade::from_request_parts(&mut parts, &())
        .await
        .map_err(|_| ProxyError::UpgradeRequired(rule.prefix.clone()))?;

    let bridge = TcpBridge::connect(&rule.upstream)
        .await
        .map_err(|e| ProxyError::Connect {
            upstream: rule.upstream.authority(),
            reason: e.to_string(),
        })?;

    Ok(ws
        .protocols(vnc_proxy::SUBPROTOCOLS)
        .on_upgrade(move |socket| async move {
            if let Err(e) = bridge.bridge(socket).await {
                error!("TCP bridge error: {}", e);
            }
        }))
}

async fn shell_response(ctx: &GatewayContext, route: &RouteMatch) -> Response {
    let html = ctx.assets().render_shell(route).await;
    let mut resp = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response();

    let headers = resp.headers_mut();
    headers.insert(COMPONENT_HEADER, HeaderValue::from_static(route.component.as_str()));
    if let Some(value) = route
        .name
        .as_deref()
        .and_then(|n| HeaderValue::from_str(n).ok())
    {
        headers.insert(ROUTE_HEADER, value);
    }
    if !route.props.is_empty() {
        if let Some(value) = serde_json::to_string(&route.props)
            .ok()
            .and_then(|json| HeaderValue::from_str(&json).ok())
        {
            headers.insert(PROPS_HEADER, value);
        }
    }
    resp
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

// ============================================================================
// Introspection handlers
// ============================================================================

async fn health_handler(State(ctx): State<Arc<GatewayContext>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "studio-web",
        "version": studio_common::VERSION,
        "scheme": ctx.config().router.scheme,
    }))
}

async fn routes_handler(State(ctx): State<Arc<GatewayContext>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "scheme": ctx.config().router.scheme,
        "routes": ctx.routes().entries(),
    }))
}

#[derive(Debug, Deserialize)]
struct ResolveQuery {
    path: String,
}

async fn resolve_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Query(query): Query<ResolveQuery>,
) -> Response {
    match ctx.routes().resolve(&query.path) {
        Some(route) => Json(route).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "no route matches",
                "path": query.path,
            })),
        )
            .into_response(),
    }
}

async fn proxy_table_handler(State(ctx): State<Arc<GatewayContext>>) -> impl IntoResponse {
    Json(ctx.proxy().rules().to_vec())
}
