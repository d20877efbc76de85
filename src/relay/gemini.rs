use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    pub generation_config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Content,
}

impl GenerateRequest {
    pub fn new(prompt: String, pdf: Option<&[u8]>) -> Self {
        let mut parts = vec![Part {
            text: Some(prompt),
            inline_data: None,
        }];
        if let Some(pdf) = pdf {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: "application/pdf".to_string(),
                    data: STANDARD.encode(pdf),
                }),
            });
        }

        Self {
            contents: vec![Content { parts }],
            generation_config: json!({ "temperature": 0.1 }),
        }
    }
}

impl GenerateResponse {
    /// First candidate's first text part, or `{}` when the model said nothing.
    pub fn into_text(self) -> String {
        let text = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default();

        if text.trim().is_empty() {
            "{}".to_string()
        } else {
            text
        }
    }
}

/// Client for the `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(endpoint: String, timeout: Duration) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    /// Sends one extraction request. The whole exchange, body included, runs
    /// under the configured deadline.
    pub async fn generate(
        &self,
        api_key: &str,
        request: &GenerateRequest,
        request_id: &str,
    ) -> GatewayResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(request_id, error = %err, "gemini request error");
                GatewayError::Upstream("upstream error".to_string())
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(request_id, status = %status, body = %body, "gemini error");
            return Err(GatewayError::Upstream("gemini error".to_string()));
        }

        let decoded = response.json::<GenerateResponse>().await.map_err(|err| {
            tracing::warn!(request_id, error = %err, "gemini decode error");
            GatewayError::Upstream("decode error".to_string())
        })?;

        Ok(decoded.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::{GenerateRequest, GenerateResponse};

    #[test]
    fn request_serializes_inline_pdf() {
        let request = GenerateRequest::new("prompt".into(), Some(b"%PDF"));
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["contents"][0]["parts"][0]["text"], "prompt");
        assert!(value["contents"][0]["parts"][0].get("inline_data").is_none());
        assert_eq!(
            value["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "application/pdf"
        );
        assert_eq!(value["contents"][0]["parts"][1]["inline_data"]["data"], "JVBERg==");
        assert_eq!(value["generationConfig"]["temperature"], 0.1);
    }

    #[test]
    fn request_without_file_has_single_part() {
        let value = serde_json::to_value(GenerateRequest::new("p".into(), None)).unwrap();
        assert_eq!(value["contents"][0]["parts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn blank_or_missing_answer_becomes_empty_object() {
        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert_eq!(empty.into_text(), "{}");

        let blank: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"content": {"parts": [{"text": "  "}]}}]}"#)
                .unwrap();
        assert_eq!(blank.into_text(), "{}");

        let answer: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"a\":1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(answer.into_text(), "{\"a\":1}");
    }
}
