//! Configuration types for the ingestion pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::{
    DEFAULT_CAP_TOKENS, DEFAULT_MERGE_TARGET_TOKENS, DEFAULT_MIN_CHUNK_CHARS,
    DEFAULT_NON_PARA_MERGE_TARGET_TOKENS,
};

/// Token budgets for the structured and markdown chunking tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkBudget {
    /// Merge target for adjacent markdown paragraphs, in tokens.
    pub merge_target_tokens: usize,

    /// Hard cap above which a chunk gets split, in tokens.
    pub cap_tokens: usize,

    /// Merge target for non-paragraf entries (transition provisions,
    /// preamble, appendices), in tokens.
    pub non_para_merge_target_tokens: usize,

    /// Minimum characters for a non-paragraf entry to stand on its own.
    pub min_chunk_chars: usize,
}

impl Default for ChunkBudget {
    fn default() -> Self {
        Self {
            merge_target_tokens: DEFAULT_MERGE_TARGET_TOKENS,
            cap_tokens: DEFAULT_CAP_TOKENS,
            non_para_merge_target_tokens: DEFAULT_NON_PARA_MERGE_TARGET_TOKENS,
            min_chunk_chars: DEFAULT_MIN_CHUNK_CHARS,
        }
    }
}

/// Token budgets for splitting enrichment work across model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Upper bound on estimated tokens in one prompt.
    pub max_prompt_tokens: usize,

    /// Estimated per-chunk prompt overhead (excerpt plus framing).
    pub per_chunk_overhead: usize,

    /// Estimated fixed prompt overhead (instructions, examples).
    pub fixed_prompt_overhead: usize,

    /// Characters of chunk content quoted in the prompt.
    pub excerpt_chars: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_prompt_tokens: 190_000,
            per_chunk_overhead: 160,
            fixed_prompt_overhead: 600,
            excerpt_chars: 500,
        }
    }
}

impl ContextBudget {
    /// Token budget available for markdown text in one prompt, given the
    /// number of chunks riding along.
    pub fn markdown_budget(&self, chunk_count: usize) -> usize {
        self.max_prompt_tokens
            .saturating_sub(self.fixed_prompt_overhead)
            .saturating_sub(chunk_count * self.per_chunk_overhead)
    }

    /// Hard character ceiling for a markdown slice with the given token
    /// budget. Guards against pathological token-estimate drift.
    pub fn max_slice_chars(&self, token_budget: usize) -> usize {
        token_budget * 4
    }
}

/// Bounded retry policy for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: usize,

    /// Fixed delay between attempts.
    #[serde(with = "duration_secs")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_secs(2),
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    pub model: String,

    /// Expected vector dimensionality.
    pub dimensions: usize,

    /// Maximum inputs per provider request.
    pub max_batch_size: usize,

    /// Character ceiling for one embedding input.
    pub max_input_chars: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            max_batch_size: 100,
            max_input_chars: 8192 * 3,
        }
    }
}

/// Rerank provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub model: String,

    /// Request timeout; on expiry the original ordering is returned.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Documents beyond this count are silently dropped from the request.
    pub max_documents: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            model: "rerank-v4.0-pro".to_string(),
            timeout: Duration::from_secs(10),
            max_documents: 1000,
        }
    }
}

/// Top-level pipeline configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_path: String,

    /// Anthropic API key for context enrichment. Absent means chunks are
    /// stored without prefixes.
    pub anthropic_api_key: Option<String>,

    /// OpenAI API key for embeddings.
    pub openai_api_key: Option<String>,

    /// Cohere API key for reranking. Absent means rerank is a passthrough.
    pub cohere_api_key: Option<String>,

    pub context_model: String,

    /// Maximum documents processed concurrently by the bulk driver.
    pub max_concurrency: usize,

    pub chunk_budget: ChunkBudget,
    pub context_budget: ContextBudget,
    pub retry: RetryConfig,
    pub embed: EmbedConfig,
    pub rerank: RerankConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: "pipeline.db".to_string(),
            anthropic_api_key: None,
            openai_api_key: None,
            cohere_api_key: None,
            context_model: "claude-haiku-4-5-20251001".to_string(),
            max_concurrency: 4,
            chunk_budget: ChunkBudget::default(),
            context_budget: ContextBudget::default(),
            retry: RetryConfig::default(),
            embed: EmbedConfig::default(),
            rerank: RerankConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or(defaults.database_path),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            cohere_api_key: std::env::var("COHERE_API_KEY").ok(),
            context_model: std::env::var("CONTEXT_MODEL")
                .unwrap_or(defaults.context_model),
            max_concurrency: std::env::var("MAX_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrency),
            chunk_budget: defaults.chunk_budget,
            context_budget: defaults.context_budget,
            retry: defaults.retry,
            embed: defaults.embed,
            rerank: defaults.rerank,
        }
    }

    /// Fail early when a key required by the requested operation is missing.
    pub fn require_openai_key(&self) -> Result<&str, PipelineError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| PipelineError::Configuration("OPENAI_API_KEY is not set".into()))
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
