//! The handler behind `/api/parse`: turns an upload into a model prompt and
//! returns the model's JSON answer.

pub mod form;
pub mod gemini;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    config::RelayConfig,
    context::RequestContext,
    cors::apply_cors,
    error::{GatewayError, GatewayResult},
    gateway::RequestHandler,
    metrics::MetricsRegistry,
    relay::gemini::{GeminiClient, GenerateRequest},
};

pub struct ParseRelay {
    config: RelayConfig,
    client: GeminiClient,
    metrics: Arc<MetricsRegistry>,
}

impl ParseRelay {
    pub fn new(config: RelayConfig, metrics: Arc<MetricsRegistry>) -> GatewayResult<Self> {
        let client = GeminiClient::new(config.endpoint.clone(), config.timeout)?;
        Ok(Self {
            config,
            client,
            metrics,
        })
    }

    async fn relay(&self, ctx: &RequestContext) -> GatewayResult<Response<Body>> {
        if ctx.method != Method::POST {
            return Err(GatewayError::MethodNotAllowed);
        }

        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GatewayError::MissingApiKey)?;

        let form = form::read_form(ctx, self.config.max_file_bytes).await?;
        if form.file.is_none() && form.schema.is_none() {
            return Err(GatewayError::Validation(
                "either file or schema must be provided".to_string(),
            ));
        }

        let prompt = prompt::build_prompt(form.schema.as_deref(), form.file.is_some());
        let request = GenerateRequest::new(prompt, form.file.as_deref());
        let content = self
            .client
            .generate(api_key, &request, &ctx.request_id)
            .await?;

        tracing::debug!(request_id = %ctx.request_id, content = %content, "extraction result");

        let mut response = (StatusCode::OK, content).into_response();
        apply_cors(response.headers_mut());
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(response)
    }
}

#[async_trait]
impl RequestHandler for ParseRelay {
    async fn handle(&self, ctx: &RequestContext) -> Response<Body> {
        match self.relay(ctx).await {
            Ok(response) => response,
            Err(err) => {
                if matches!(err, GatewayError::Upstream(_)) {
                    self.metrics.upstream_failed();
                }
                err.into_response()
            }
        }
    }
}
