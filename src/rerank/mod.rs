//! Query-time reranking via Cohere, degrading to a passthrough.
//!
//! Reranking is an optional quality layer: a missing key, an oversize
//! candidate set, or a provider failure must never break retrieval, so
//! every failure mode returns the original ordering.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embed::build_embedding_input;
use crate::types::RerankConfig;

const DEFAULT_BASE_URL: &str = "https://api.cohere.com";

/// One retrieval hit offered for reranking. The payload travels through
/// untouched.
#[derive(Debug, Clone)]
pub struct RerankCandidate<T> {
    pub text: String,
    pub payload: T,
}

#[derive(Debug, Clone)]
pub struct RankedItem<T> {
    pub payload: T,
    pub relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct RerankOutcome<T> {
    pub results: Vec<RankedItem<T>>,
    /// False when any passthrough guard fired.
    pub reranked: bool,
    pub latency_ms: u64,
}

/// Compose the text scored by the reranker: same header + prefix +
/// content composite the embeddings use.
pub fn build_rerank_text(content: &str, context_prefix: Option<&str>, header: &str) -> String {
    build_embedding_input(content, context_prefix, header)
}

/// Cohere v2 rerank client.
pub struct RerankClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    config: RerankConfig,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

impl RerankClient {
    pub fn new(api_key: Option<String>, config: RerankConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            config,
        }
    }

    /// Point the client at a different endpoint, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Rerank candidates against a query.
    ///
    /// Returns provider ordering with scores on success, and the original
    /// ordering with zero scores on any guard or failure. Never an error.
    pub async fn rerank<T>(
        &self,
        query: &str,
        mut candidates: Vec<RerankCandidate<T>>,
        top_n: Option<usize>,
    ) -> RerankOutcome<T> {
        let started = Instant::now();

        let Some(api_key) = self.api_key.as_deref() else {
            return passthrough(candidates, started);
        };
        if candidates.len() <= 1 {
            return passthrough(candidates, started);
        }
        if candidates.len() > self.config.max_documents {
            debug!(
                candidates = candidates.len(),
                max = self.config.max_documents,
                "truncating rerank candidate set"
            );
            candidates.truncate(self.config.max_documents);
        }

        let documents: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let request = RerankRequest {
            model: &self.config.model,
            query,
            top_n: top_n.unwrap_or(documents.len()),
            documents,
        };

        let response = self
            .http
            .post(format!("{}/v2/rerank", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.config.timeout)
            .json(&request)
            .send()
            .await;

        let parsed: RerankResponse = match response {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(parsed) => parsed,
                Err(err) => {
                    error!(error = %err, "Cohere rerank response unreadable");
                    return passthrough(candidates, started);
                }
            },
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                error!("Cohere rerank failed ({status}): {body}");
                return passthrough(candidates, started);
            }
            Err(err) => {
                error!(error = %err, "Cohere rerank request failed");
                return passthrough(candidates, started);
            }
        };

        let mut slots: Vec<Option<RerankCandidate<T>>> =
            candidates.into_iter().map(Some).collect();
        let mut results = Vec::with_capacity(parsed.results.len());
        for entry in parsed.results {
            if let Some(candidate) = slots.get_mut(entry.index).and_then(Option::take) {
                results.push(RankedItem {
                    payload: candidate.payload,
                    relevance_score: entry.relevance_score,
                });
            }
        }

        RerankOutcome {
            results,
            reranked: true,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn passthrough<T>(candidates: Vec<RerankCandidate<T>>, started: Instant) -> RerankOutcome<T> {
    RerankOutcome {
        results: candidates
            .into_iter()
            .map(|c| RankedItem {
                payload: c.payload,
                relevance_score: 0.0,
            })
            .collect(),
        reranked: false,
        latency_ms: started.elapsed().as_millis() as u64,
    }
}
