use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{
        Body,
        to_bytes,
    },
    http::{
        HeaderName,
        HeaderValue,
        Request,
    },
    response::{
        IntoResponse,
        Response,
    },
};
use bytes::Bytes;
use uuid::Uuid;

use crate::{
    config::GatewayConfig,
    context::RequestContext,
    error::{GatewayError, GatewayResult},
    metrics::MetricsRegistry,
    middleware::{
        ControlFlow,
        GatewayMiddleware,
        logging::RequestLoggingMiddleware,
        rate_limit::AdmissionMiddleware,
    },
    ratelimit::RateLimiter,
    relay::ParseRelay,
};

/// The handler a [`Gateway`] protects.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, ctx: &RequestContext) -> Response<Body>;
}

pub struct Gateway {
    middlewares: Vec<Arc<dyn GatewayMiddleware>>,
    handler: Arc<dyn RequestHandler>,
    max_body_bytes: usize,
}

impl Gateway {
    pub fn new(
        middlewares: Vec<Arc<dyn GatewayMiddleware>>,
        handler: Arc<dyn RequestHandler>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            middlewares,
            handler,
            max_body_bytes,
        }
    }

    pub fn from_config(
        config: &GatewayConfig,
        limiter: RateLimiter,
        metrics: Arc<MetricsRegistry>,
    ) -> GatewayResult<Self> {
        let middlewares: Vec<Arc<dyn GatewayMiddleware>> = vec![
            Arc::new(RequestLoggingMiddleware),
            Arc::new(AdmissionMiddleware::new(limiter, metrics.clone())),
        ];
        let handler = Arc::new(ParseRelay::new(config.relay.clone(), metrics)?);

        Ok(Self::new(middlewares, handler, config.max_body_bytes))
    }

    /// Runs the middleware chain on the request head; the body is only
    /// buffered once every middleware has let the request through.
    pub async fn handle_http(&self, request: Request<Body>, remote_addr: String) -> Response<Body> {
        let (parts, body) = request.into_parts();

        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut ctx = RequestContext::new(
            request_id,
            parts.method,
            parts.uri,
            parts.headers,
            Bytes::new(),
            remote_addr,
        );

        let mut executed = Vec::new();

        for (idx, middleware) in self.middlewares.iter().enumerate() {
            match middleware.on_request(&mut ctx).await {
                ControlFlow::Continue => executed.push(idx),
                ControlFlow::ShortCircuit(mut response) => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        middleware = middleware.name(),
                        status = %response.status(),
                        "middleware answered request"
                    );
                    self.apply_response_middlewares(&executed, &ctx, &mut response)
                        .await;
                    self.attach_hardening_headers(&ctx.request_id, &mut response);
                    return response;
                }
            }
        }

        ctx.body = match to_bytes(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(_) => {
                let mut response = GatewayError::PayloadTooLarge.into_response();
                self.apply_response_middlewares(&executed, &ctx, &mut response)
                    .await;
                self.attach_hardening_headers(&ctx.request_id, &mut response);
                return response;
            }
        };

        let mut response = self.handler.handle(&ctx).await;
        self.apply_response_middlewares(&executed, &ctx, &mut response)
            .await;
        self.attach_hardening_headers(&ctx.request_id, &mut response);
        response
    }

    async fn apply_response_middlewares(
        &self,
        executed: &[usize],
        ctx: &RequestContext,
        response: &mut Response<Body>,
    ) {
        for idx in executed.iter().rev() {
            self.middlewares[*idx].on_response(ctx, response).await;
        }
    }

    fn attach_hardening_headers(&self, request_id: &str, response: &mut Response<Body>) {
        if let Ok(value) = HeaderValue::from_str(request_id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static("x-request-id"), value);
        }

        response.headers_mut().insert(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::{IntoResponse, Response},
    };

    use super::{Gateway, RequestHandler};
    use crate::{
        clock::ManualClock,
        context::RequestContext,
        metrics::MetricsRegistry,
        middleware::{
            GatewayMiddleware, logging::RequestLoggingMiddleware,
            rate_limit::AdmissionMiddleware,
        },
        ratelimit::{RateLimitPolicy, RateLimiter, in_memory::InMemoryWindowStore},
    };

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RequestHandler for CountingHandler {
        async fn handle(&self, _ctx: &RequestContext) -> Response<Body> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (StatusCode::OK, "{}").into_response()
        }
    }

    struct Harness {
        gateway: Gateway,
        handler: Arc<CountingHandler>,
        clock: Arc<ManualClock>,
        metrics: Arc<MetricsRegistry>,
    }

    fn harness(limit: u32, window_secs: u64) -> Harness {
        let clock = Arc::new(ManualClock::new());
        let store = InMemoryWindowStore::new(RateLimitPolicy::new(
            limit,
            Duration::from_secs(window_secs),
        ));
        let limiter = RateLimiter::new(Arc::new(store), clock.clone());
        let metrics = Arc::new(MetricsRegistry::new());
        let handler = Arc::new(CountingHandler::default());
        let middlewares: Vec<Arc<dyn GatewayMiddleware>> = vec![
            Arc::new(RequestLoggingMiddleware),
            Arc::new(AdmissionMiddleware::new(limiter, metrics.clone())),
        ];

        Harness {
            gateway: Gateway::new(middlewares, handler.clone(), 1024),
            handler,
            clock,
            metrics,
        }
    }

    fn request(method: Method) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/api/parse")
            .body(Body::empty())
            .unwrap()
    }

    async fn send(h: &Harness, method: Method) -> Response<Body> {
        h.gateway
            .handle_http(request(method), "198.51.100.20:40000".to_string())
            .await
    }

    #[tokio::test]
    async fn preflight_never_consumes_quota() {
        let h = harness(3, 60);

        for _ in 0..3 {
            let response = send(&h, Method::OPTIONS).await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        }
        for _ in 0..3 {
            assert_eq!(send(&h, Method::POST).await.status(), StatusCode::OK);
        }
        assert_eq!(
            send(&h, Method::POST).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(h.handler.calls.load(Ordering::SeqCst), 3);

        let rendered = h.metrics.render_prometheus(1);
        assert!(rendered.contains("gateway_preflight_total 3\n"));
        assert!(rendered.contains("gateway_admitted_total 3\n"));
        assert!(rendered.contains("gateway_denied_total 1\n"));
    }

    #[tokio::test]
    async fn denied_requests_never_reach_handler() {
        let h = harness(1, 30);

        assert_eq!(send(&h, Method::POST).await.status(), StatusCode::OK);
        for _ in 0..5 {
            let response = send(&h, Method::POST).await;
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            assert!(response.headers().contains_key(header::RETRY_AFTER));
            assert!(response.headers().contains_key("x-request-id"));
        }
        assert_eq!(h.handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn window_rollover_readmits_client() {
        let h = harness(2, 10);

        assert_eq!(send(&h, Method::POST).await.status(), StatusCode::OK);
        h.clock.advance(Duration::from_secs(1));
        assert_eq!(send(&h, Method::POST).await.status(), StatusCode::OK);
        h.clock.advance(Duration::from_secs(1));

        let denied = send(&h, Method::POST).await;
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.headers()[header::RETRY_AFTER], "8");

        h.clock.advance(Duration::from_secs(9));
        assert_eq!(send(&h, Method::POST).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admitted_response_is_left_to_handler() {
        let h = harness(5, 60);

        let response = send(&h, Method::POST).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert!(!response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn forwarded_for_selects_quota_bucket() {
        let h = harness(1, 60);

        let spoofed = |ip: &str| {
            Request::builder()
                .method(Method::POST)
                .uri("/api/parse")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };
        let peer = "10.0.0.1:1234".to_string();

        let first = h.gateway.handle_http(spoofed("1.1.1.1"), peer.clone()).await;
        let second = h.gateway.handle_http(spoofed("2.2.2.2"), peer.clone()).await;
        let repeat = h.gateway.handle_http(spoofed("1.1.1.1, 3.3.3.3"), peer).await;

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_burst_through_gateway_admits_exactly_limit() {
        let h = Arc::new(harness(4, 60));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let h = h.clone();
                tokio::spawn(async move { send(&h, Method::POST).await.status() })
            })
            .collect();

        let mut ok = 0;
        let mut limited = 0;
        for task in tasks {
            match task.await.unwrap() {
                StatusCode::OK => ok += 1,
                StatusCode::TOO_MANY_REQUESTS => limited += 1,
                other => panic!("unexpected status {other}"),
            }
        }
        assert_eq!(ok, 4);
        assert_eq!(limited, 28);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let h = harness(5, 60);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/parse")
            .body(Body::from(vec![0u8; 2048]))
            .unwrap();

        let response = h
            .gateway
            .handle_http(request, "127.0.0.1:1".to_string())
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!body.is_empty());
        assert_eq!(h.handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn admission_runs_before_body_is_buffered() {
        let h = harness(1, 60);
        let oversized = |method: Method| {
            Request::builder()
                .method(method)
                .uri("/api/parse")
                .body(Body::from(vec![0u8; 2048]))
                .unwrap()
        };
        let peer = || "198.51.100.20:40000".to_string();

        assert_eq!(send(&h, Method::POST).await.status(), StatusCode::OK);

        let limited = h.gateway.handle_http(oversized(Method::POST), peer()).await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.headers()[header::RETRY_AFTER], "60");

        let preflight = h.gateway.handle_http(oversized(Method::OPTIONS), peer()).await;
        assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
        assert_eq!(preflight.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        assert_eq!(h.handler.calls.load(Ordering::SeqCst), 1);
    }
}
