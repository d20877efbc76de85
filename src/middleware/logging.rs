use async_trait::async_trait;
use axum::{body::Body, response::Response};

use crate::{
    context::{Admission, RequestContext},
    middleware::{ControlFlow, GatewayMiddleware},
};

/// Logs each request on arrival and once its response is known, tagged with
/// the admission outcome recorded further down the chain.
pub struct RequestLoggingMiddleware;

/// `(outcome, retry_after_secs)` for the completion log line.
fn admission_fields(ctx: &RequestContext) -> (&'static str, Option<u64>) {
    match ctx.admission {
        Some(Admission::Denied { retry_after_secs }) => ("denied", Some(retry_after_secs)),
        Some(other) => (other.as_str(), None),
        None => ("unchecked", None),
    }
}

#[async_trait]
impl GatewayMiddleware for RequestLoggingMiddleware {
    fn name(&self) -> &'static str {
        "request-logging"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> ControlFlow {
        tracing::info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.uri.path(),
            remote_addr = %ctx.remote_addr,
            "incoming request"
        );
        ControlFlow::Continue
    }

    async fn on_response(&self, ctx: &RequestContext, response: &mut Response<Body>) {
        let (admission, retry_after_secs) = admission_fields(ctx);
        let status = response.status();

        if status.is_server_error() {
            tracing::warn!(
                request_id = %ctx.request_id,
                client_key = ?ctx.client_key,
                admission,
                status = %status,
                latency_ms = ctx.started_at.elapsed().as_millis(),
                "request failed"
            );
        } else {
            tracing::info!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                client_key = ?ctx.client_key,
                admission,
                retry_after_secs,
                body_bytes = ctx.body.len(),
                status = %status,
                latency_ms = ctx.started_at.elapsed().as_millis(),
                "request completed"
            );
        }
    }
}
