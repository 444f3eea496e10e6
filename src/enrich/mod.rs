//! Context enrichment: LLM-generated retrieval prefixes for chunks.
//!
//! Each chunk gets 1-2 Swedish sentences of surrounding context so the
//! indexed passage is self-contained. One model call covers the whole
//! document when it fits the prompt budget; larger documents are planned
//! into several calls.

mod client;
mod parser;
mod planner;
mod prompt;

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::types::{Chunk, ContextBudget, Document, RetryConfig};

pub use client::{call_with_retry, AnthropicClient, ContextModel};
pub use parser::parse_prefix_response;
pub use planner::{plan_enrichment, ChunkForContext, DocumentForContext, EnrichmentCall};
pub use prompt::build_prompt;

/// Generate context prefixes for a document's chunks.
///
/// Returns a map of chunk path → prefix. Chunks the model skipped are
/// simply absent; callers treat enrichment as best-effort.
pub async fn generate_context_prefixes(
    model: &dyn ContextModel,
    doc: &DocumentForContext,
    chunks: &[ChunkForContext],
    budget: &ContextBudget,
    retry: &RetryConfig,
) -> Result<HashMap<String, String>, PipelineError> {
    if chunks.is_empty() {
        return Ok(HashMap::new());
    }

    let plan = plan_enrichment(doc, chunks, budget);
    info!(
        document = %doc.source_id,
        calls = plan.len(),
        chunks = chunks.len(),
        "planned context enrichment"
    );

    let mut prefixes = HashMap::new();
    for call in &plan {
        let prompt = build_prompt(doc, call, budget);
        let response = call_with_retry(retry, || model.complete(&prompt)).await?;
        let expected: Vec<String> = call.chunks.iter().map(|c| c.path.clone()).collect();
        let parsed = parse_prefix_response(&response, &expected);
        debug!(
            call = %call.custom_id,
            expected = expected.len(),
            parsed = parsed.len(),
            "parsed prefix response"
        );
        prefixes.extend(parsed);
    }
    Ok(prefixes)
}

/// Project pipeline chunks onto the enricher's view of them.
pub fn chunks_for_context(chunks: &[Chunk]) -> Vec<ChunkForContext> {
    chunks
        .iter()
        .map(|c| ChunkForContext {
            path: c.path.clone(),
            content: c.content.clone(),
        })
        .collect()
}

/// Project a document onto the enricher's view, preferring markdown and
/// falling back to plain text.
pub fn document_for_context(doc: &Document) -> DocumentForContext {
    let markdown = doc
        .markdown_content
        .clone()
        .or_else(|| doc.plain_text_content.clone())
        .unwrap_or_default();
    DocumentForContext {
        source_id: doc.id.clone(),
        title: doc.title.clone(),
        document_number: doc.document_number.clone().unwrap_or_default(),
        markdown,
    }
}
