//! Ingestion pipeline for Swedish legal documents.
//!
//! Turns statutes, regulations and agency rules into retrieval-ready
//! chunks: structure-aware chunking, LLM-generated context prefixes,
//! embeddings, and an atomic sqlite sync, plus a query-time reranker.

pub mod chunker;
pub mod embed;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod rerank;
pub mod store;
pub mod sync;
pub mod tokens;
pub mod types;

pub use chunker::chunk_document;
pub use error::PipelineError;
pub use ingest::{IngestOptions, IngestRunner, IngestSummary, Progress};
pub use store::{ChunkStore, SOURCE_TYPE_LEGAL_DOCUMENT};
pub use sync::{SyncEngine, SyncOutcome};
pub use tokens::estimate_tokens;
pub use types::{Chunk, ContentRole, Document, PipelineConfig, SourceCategory};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::chunker::chunk_document;
    pub use crate::error::PipelineError;
    pub use crate::sync::{SyncEngine, SyncOutcome};
    pub use crate::tokens::estimate_tokens;
    pub use crate::types::*;
}

/// Default merge target for markdown chunks, in tokens
pub const DEFAULT_MERGE_TARGET_TOKENS: usize = 400;

/// Hard per-chunk token cap; larger chunks are split at sentences
pub const DEFAULT_CAP_TOKENS: usize = 1000;

/// Merge target for non-paragraf material (preambles, appendices)
pub const DEFAULT_NON_PARA_MERGE_TARGET_TOKENS: usize = 800;

/// Chunks shorter than this many characters are dropped
pub const DEFAULT_MIN_CHUNK_CHARS: usize = 20;
