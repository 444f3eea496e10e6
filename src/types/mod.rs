//! Core type definitions.

pub mod chunk;
pub mod config;
pub mod document;

pub use chunk::{chapter_number_of, Chunk, ContentRole};
pub use config::{
    ChunkBudget, ContextBudget, EmbedConfig, PipelineConfig, RerankConfig, RetryConfig,
};
pub use document::{
    Appendix, CanonicalJson, Chapter, Division, Document, Paragraf, SemanticRole,
    SourceCategory, Stycke, TextBlock,
};
