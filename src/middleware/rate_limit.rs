use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json,
    body::Body,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    context::{Admission, RequestContext},
    cors::apply_cors,
    metrics::MetricsRegistry,
    middleware::{ControlFlow, GatewayMiddleware},
    ratelimit::{RateLimitDecision, RateLimiter},
};

#[derive(Serialize)]
struct RateLimitBody {
    error: &'static str,
    limit: u32,
    window_seconds: u64,
}

/// Answers preflight requests and gates everything else on the client's quota.
///
/// Admitted requests pass through untouched; the protected handler owns their
/// headers, CORS included.
pub struct AdmissionMiddleware {
    limiter: RateLimiter,
    metrics: Arc<MetricsRegistry>,
}

impl AdmissionMiddleware {
    pub fn new(limiter: RateLimiter, metrics: Arc<MetricsRegistry>) -> Self {
        Self { limiter, metrics }
    }

    fn preflight_response() -> Response<Body> {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors(response.headers_mut());
        response
    }

    fn limited_response(&self, decision: RateLimitDecision) -> Response<Body> {
        let policy = self.limiter.policy();
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(RateLimitBody {
                error: "rate limit exceeded",
                limit: policy.limit,
                window_seconds: policy.window_seconds(),
            }),
        )
            .into_response();

        apply_cors(response.headers_mut());
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(decision.retry_after_secs()));
        response
    }
}

#[async_trait]
impl GatewayMiddleware for AdmissionMiddleware {
    fn name(&self) -> &'static str {
        "admission"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> ControlFlow {
        if ctx.method == Method::OPTIONS {
            self.metrics.preflight();
            ctx.admission = Some(Admission::Preflight);
            return ControlFlow::ShortCircuit(Self::preflight_response());
        }

        let key = client_key(&ctx.headers, &ctx.remote_addr);
        let decision = self.limiter.check(&key);

        let flow = if decision.allowed {
            self.metrics.admitted();
            ctx.admission = Some(Admission::Admitted);
            ControlFlow::Continue
        } else {
            self.metrics.denied();
            ctx.admission = Some(Admission::Denied {
                retry_after_secs: decision.retry_after_secs(),
            });
            tracing::debug!(
                request_id = %ctx.request_id,
                client_key = %key,
                retry_after_secs = decision.retry_after_secs(),
                "quota exhausted"
            );
            ControlFlow::ShortCircuit(self.limited_response(decision))
        };
        ctx.client_key = Some(key);
        flow
    }
}

/// Identifies whose quota a request consumes.
///
/// The first `X-Forwarded-For` entry wins when the header is present. It is
/// client-controlled, so a caller can pick any key it likes.
pub fn client_key(headers: &HeaderMap, remote_addr: &str) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return forwarded
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
    }

    split_host(remote_addr).unwrap_or(remote_addr).to_string()
}

/// Host part of `host:port` or `[host]:port`.
fn split_host(addr: &str) -> Option<&str> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        tail.strip_prefix(':')?;
        return Some(host);
    }

    let (host, _port) = addr.rsplit_once(':')?;
    if host.contains(':') {
        return None;
    }
    Some(host)
}
