//! Document chunking.
//!
//! Three-tier strategy:
//! 1. Paragraf-level: each § becomes one chunk (primary)
//! 2. Non-paragraf content: transition provisions, preamble, appendices
//! 3. Markdown fallback: paragraph-merge when the structured form is empty

mod markdown;
mod structured;

use std::collections::HashMap;

use crate::types::{Chunk, ChunkBudget, Document};

pub use markdown::chunk_from_markdown;
pub use structured::chunk_structured;

/// Derive all chunks for a document.
///
/// Falls back to markdown chunking when the canonical JSON is missing or
/// carries no content. Paths are unique within the returned set.
pub fn chunk_document(doc: &Document, budget: &ChunkBudget) -> Vec<Chunk> {
    let mut chunks = match &doc.json_content {
        Some(json) if !json.is_effectively_empty() => chunk_structured(doc, json, budget),
        _ => chunk_from_markdown(doc, budget),
    };
    deduplicate_paths(&mut chunks);
    chunks
}

/// Metadata keys shared by every chunk of a document, used for retrieval
/// filtering.
fn base_metadata(doc: &Document) -> serde_json::Map<String, serde_json::Value> {
    let mut meta = serde_json::Map::new();
    if let Some(number) = &doc.document_number {
        meta.insert("documentNumber".into(), number.clone().into());
    }
    meta.insert("contentType".into(), doc.content_type.as_str().into());
    if let Some(slug) = &doc.slug {
        meta.insert("slug".into(), slug.clone().into());
    }
    meta
}

/// Make duplicate paths unique by appending `.v2`, `.v3`, ...
fn deduplicate_paths(chunks: &mut [Chunk]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for chunk in chunks {
        let count = seen.entry(chunk.path.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            chunk.path = format!("{}.v{}", chunk.path, *count);
        }
    }
}
