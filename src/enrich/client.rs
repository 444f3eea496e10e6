//! Anthropic messages-API client behind the `ContextModel` seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::types::RetryConfig;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 8192;

/// The model seam the enricher talks through. Tests substitute a scripted
/// implementation.
#[async_trait]
pub trait ContextModel: Send + Sync {
    /// Send one prompt, return the model's text response.
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError>;
}

/// Messages-API client for context generation.
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Point the client at a different endpoint, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl ContextModel for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::provider("anthropic", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::provider(
                "anthropic",
                format!("messages API returned {status}: {body}"),
            ));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::provider("anthropic", e.to_string()))?;
        debug!(blocks = parsed.content.len(), "messages API response");

        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .ok_or_else(|| {
                PipelineError::MalformedResponse("no text block in model response".into())
            })
    }
}

/// Run an async operation with a fixed-delay bounded retry.
///
/// The last error propagates when every attempt fails.
pub async fn call_with_retry<T, F, Fut>(retry: &RetryConfig, mut op: F) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, PipelineError>>,
{
    let mut last_error = None;
    for attempt in 1..=retry.max_attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(attempt, error = %err, "provider call failed");
                last_error = Some(err);
                if attempt < retry.max_attempts {
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| PipelineError::provider("retry", "no attempts were made")))
}
