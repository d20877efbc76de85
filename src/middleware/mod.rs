pub mod logging;
pub mod rate_limit;

use async_trait::async_trait;
use axum::{
    body::Body,
    response::Response,
};

use crate::context::RequestContext;

pub enum ControlFlow {
    Continue,
    ShortCircuit(Response<Body>),
}

/// A step in the request pipeline run before the protected handler.
///
/// `on_response` runs in reverse order for every middleware whose
/// `on_request` returned `Continue`.
#[async_trait]
pub trait GatewayMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_request(&self, ctx: &mut RequestContext) -> ControlFlow;

    async fn on_response(&self, _ctx: &RequestContext, _response: &mut Response<Body>) {}
}
