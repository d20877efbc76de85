use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};

use crate::{
    cors::apply_cors,
    gateway::Gateway,
    metrics::MetricsRegistry,
    ratelimit::RateLimiter,
};

#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
    limiter: RateLimiter,
    metrics: Arc<MetricsRegistry>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, limiter: RateLimiter, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            gateway,
            limiter,
            metrics,
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/api/parse", any(parse))
        .with_state(state)
}

async fn health() -> Response {
    let mut response = Json(serde_json::json!({ "ok": true })).into_response();
    apply_cors(response.headers_mut());
    response
}

async fn metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(state.limiter.tracked_keys()),
    )
        .into_response()
}

async fn parse(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.gateway.handle_http(request, addr.to_string()).await
}
