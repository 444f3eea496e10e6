//! Embedding generation against the OpenAI embeddings API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;
use crate::types::EmbedConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// One text prepared for embedding.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub id: String,
    pub text: String,
}

/// Vectors positionally aligned with the submitted inputs.
#[derive(Debug, Clone)]
pub struct EmbeddingBatchResult {
    pub embeddings: Vec<Vec<f32>>,
    pub total_tokens: u64,
}

/// Compose the text that gets embedded: contextual header line, context
/// prefix line, blank line, then the chunk content. Empty components drop
/// out entirely, so a bare chunk embeds as its content alone.
pub fn build_embedding_input(content: &str, context_prefix: Option<&str>, header: &str) -> String {
    let mut intro = String::new();
    if !header.is_empty() {
        intro.push_str(header);
    }
    if let Some(prefix) = context_prefix.filter(|p| !p.is_empty()) {
        if !intro.is_empty() {
            intro.push('\n');
        }
        intro.push_str(prefix);
    }
    if intro.is_empty() {
        content.to_string()
    } else {
        format!("{intro}\n\n{content}")
    }
}

/// Render a vector in the storage format: `[v0,v1,...]`, no spaces.
pub fn vector_to_string(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// The embedding seam the sync engine talks through. Tests substitute a
/// deterministic implementation.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn max_batch_size(&self) -> usize;

    /// Embed one batch of inputs, preserving submission order.
    async fn embed_batch(
        &self,
        inputs: &[EmbeddingInput],
    ) -> Result<EmbeddingBatchResult, PipelineError>;
}

/// Embeddings client.
pub struct EmbeddingGenerator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    config: EmbedConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

impl EmbeddingGenerator {
    pub fn new(api_key: impl Into<String>, config: EmbedConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            config,
        }
    }

    /// Point the client at a different endpoint, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

}

#[async_trait]
impl EmbeddingProvider for EmbeddingGenerator {
    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    /// Oversize batches are an error, never a silent truncation. Inputs
    /// beyond the per-input character ceiling are clipped before sending.
    async fn embed_batch(
        &self,
        inputs: &[EmbeddingInput],
    ) -> Result<EmbeddingBatchResult, PipelineError> {
        if inputs.is_empty() {
            return Ok(EmbeddingBatchResult {
                embeddings: Vec::new(),
                total_tokens: 0,
            });
        }
        if inputs.len() > self.config.max_batch_size {
            return Err(PipelineError::Validation {
                source_id: inputs[0].id.clone(),
                reason: format!(
                    "batch of {} exceeds the provider limit of {}",
                    inputs.len(),
                    self.config.max_batch_size
                ),
            });
        }

        let clipped: Vec<String> = inputs
            .iter()
            .map(|i| i.text.chars().take(self.config.max_input_chars).collect())
            .collect();
        let total_chars: usize = clipped.iter().map(|t| t.chars().count()).sum();

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: clipped.iter().map(String::as_str).collect(),
            dimensions: self.config.dimensions,
        };

        let wrap = |detail: String| {
            PipelineError::provider(
                "openai",
                format!("{detail} (batch of {}, {total_chars} chars)", inputs.len()),
            )
        };

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| wrap(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(wrap(format!("embeddings API returned {status}: {body}")));
        }

        let mut parsed: EmbeddingResponse =
            response.json().await.map_err(|e| wrap(e.to_string()))?;

        // Providers may return entries out of order.
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(wrap(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        debug!(
            batch = inputs.len(),
            tokens = parsed.usage.total_tokens,
            "embedded batch"
        );

        Ok(EmbeddingBatchResult {
            embeddings: parsed.data.into_iter().map(|e| e.embedding).collect(),
            total_tokens: parsed.usage.total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn input_combines_all_components() {
        let text = build_embedding_input(
            "Denna lag gäller alla.",
            Some("Inledande bestämmelse om tillämpning."),
            "Testlag (SFS 2025:1) > Kap 1 > 1 §",
        );
        assert_eq!(
            text,
            "Testlag (SFS 2025:1) > Kap 1 > 1 §\nInledande bestämmelse om tillämpning.\n\nDenna lag gäller alla."
        );
    }

    #[test]
    fn input_with_header_only() {
        let text = build_embedding_input("Content only.", None, "Header");
        assert_eq!(text, "Header\n\nContent only.");
    }

    #[test]
    fn empty_prefix_treated_as_absent() {
        let text = build_embedding_input("Content only.", Some(""), "Header");
        assert_eq!(text, "Header\n\nContent only.");
    }

    #[test]
    fn bare_content_passes_through() {
        assert_eq!(build_embedding_input("Just content.", None, ""), "Just content.");
    }

    #[test]
    fn vector_rendering_has_no_spaces() {
        assert_eq!(vector_to_string(&[0.5, -1.0, 2.25]), "[0.5,-1,2.25]");
        assert_eq!(vector_to_string(&[]), "[]");
    }
}
