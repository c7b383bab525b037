//! Gemini API client: POST {base}/v1beta/models/{model}:generateContent?key=...
//!
//! Non-2xx and transport errors are returned to the caller; a 2xx body whose shape is not
//! `candidates[0].content.parts[0].text` yields [`UNEXPECTED_RESPONSE_REPLY`] instead of an error.

use crate::config::GeminiConfig;
use crate::llm::{CompletionBackend, RequestPart};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Reply used when a successful response does not carry the expected text field.
pub const UNEXPECTED_RESPONSE_REPLY: &str = "Gemini returned an unexpected response.";

/// Client for the Gemini generateContent endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    /// Transport failure. The URL is stripped since it carries the API key.
    #[error("gemini request failed: {0}")]
    Request(reqwest::Error),
    #[error("gemini api error: {0}")]
    Api(String),
    #[error("gemini request has no parts")]
    EmptyRequest,
}

impl From<reqwest::Error> for GeminiError {
    fn from(e: reqwest::Error) -> Self {
        GeminiError::Request(e.without_url())
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: &'a [RequestPart],
}

impl GeminiClient {
    /// Build a client from config. The API key is passed separately since it is resolved from env or config.
    pub fn new(config: &GeminiConfig, api_key: impl Into<String>) -> Result<Self, GeminiError> {
        let base_url = config.base_url.trim_end_matches('/');
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            base_url,
            config.model.trim()
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint,
            api_key: api_key.into(),
            client,
        })
    }

    /// Full generateContent URL (without the key query parameter).
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one request with all parts in a single "contents" entry and return the reply text.
    pub async fn generate(&self, parts: &[RequestPart]) -> Result<String, GeminiError> {
        if parts.is_empty() {
            return Err(GeminiError::EmptyRequest);
        }
        let body = GenerateContentRequest {
            contents: [Content { parts }],
        };
        log::debug!("gemini: sending request with {} part(s)", parts.len());
        let res = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GeminiError::Api(format!("{} {}", status, body)));
        }
        let text = res.text().await?;
        let data: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("gemini: response body is not JSON: {}", e);
                return Ok(UNEXPECTED_RESPONSE_REPLY.to_string());
            }
        };
        match extract_reply_text(&data) {
            Some(reply) => Ok(reply.to_string()),
            None => {
                log::warn!("gemini: unexpected response format: {}", data);
                Ok(UNEXPECTED_RESPONSE_REPLY.to_string())
            }
        }
    }
}

/// Text of the first part of the first candidate, if the response has that shape.
pub fn extract_reply_text(data: &serde_json::Value) -> Option<&str> {
    data.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
}

#[async_trait]
impl CompletionBackend for GeminiClient {
    async fn complete(&self, parts: &[RequestPart]) -> Result<String, GeminiError> {
        self.generate(parts).await
    }
}
