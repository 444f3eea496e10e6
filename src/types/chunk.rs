//! Chunk type definitions.

use serde::{Deserialize, Serialize};

use super::document::SemanticRole;

/// Role of a chunk's content in the source document.
///
/// Stored alongside the chunk so retrieval can filter, e.g., transition
/// provisions out of ordinary semantic search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentRole {
    /// Ordinary body paragraph.
    Stycke,
    /// Non-binding general guidance (allmänna råd).
    AllmantRad,
    Table,
    Heading,
    TransitionProvision,
    Footnote,
    /// Produced by the markdown fallback tier.
    MarkdownChunk,
}

impl ContentRole {
    /// Map a stycke-level semantic role onto a chunk role.
    ///
    /// List items and preamble text are absorbed into the chunk body and
    /// carry no role of their own.
    pub fn from_semantic(role: SemanticRole) -> Self {
        match role {
            SemanticRole::Stycke => ContentRole::Stycke,
            SemanticRole::AllmantRad => ContentRole::AllmantRad,
            SemanticRole::Table => ContentRole::Table,
            SemanticRole::Heading => ContentRole::Heading,
            SemanticRole::TransitionProvision => ContentRole::TransitionProvision,
            SemanticRole::Footnote => ContentRole::Footnote,
            SemanticRole::ListItem | SemanticRole::Preamble => ContentRole::Stycke,
        }
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentRole::Stycke => "STYCKE",
            ContentRole::AllmantRad => "ALLMANT_RAD",
            ContentRole::Table => "TABLE",
            ContentRole::Heading => "HEADING",
            ContentRole::TransitionProvision => "TRANSITION_PROVISION",
            ContentRole::Footnote => "FOOTNOTE",
            ContentRole::MarkdownChunk => "MARKDOWN_CHUNK",
        }
    }

    /// Parse the storage representation back into an enum value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STYCKE" => Some(ContentRole::Stycke),
            "ALLMANT_RAD" => Some(ContentRole::AllmantRad),
            "TABLE" => Some(ContentRole::Table),
            "HEADING" => Some(ContentRole::Heading),
            "TRANSITION_PROVISION" => Some(ContentRole::TransitionProvision),
            "FOOTNOTE" => Some(ContentRole::Footnote),
            "MARKDOWN_CHUNK" => Some(ContentRole::MarkdownChunk),
            _ => None,
        }
    }
}

/// An atomic retrieval passage derived from one document.
///
/// Chunks are the unit that gets enriched, embedded and indexed. The
/// `path` is a stable, deterministic identifier unique within the owning
/// document (`kap3.§12`, `overgangsbest`, `bilaga.2`, `md.chunk4`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// ID of the owning document.
    pub source_id: String,

    /// Stable identifier within the document.
    pub path: String,

    /// Deterministic breadcrumb: law title, chapter, section.
    ///
    /// Distinct from the LLM-generated context prefix.
    pub contextual_header: String,

    /// The indexed text. Never empty after trimming.
    pub content: String,

    pub content_role: ContentRole,

    /// Estimated token count of `content`.
    pub token_count: usize,

    /// Open key-value metadata (document number, amendment refs, ...).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Chunk {
    /// Length of the chunk content in characters.
    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    /// Whether the chunk content is empty.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Extract the chapter-number component from the path, if any.
    ///
    /// `kap3.§12` → `Some("3")`; `overgangsbest` → `None`.
    pub fn chapter_number(&self) -> Option<&str> {
        chapter_number_of(&self.path)
    }
}

/// Chapter-number component of a chunk path, if the path has one.
pub fn chapter_number_of(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("kap")?;
    let end = rest.find('.')?;
    let num = &rest[..end];
    if !num.is_empty() && num.bytes().all(|b| b.is_ascii_digit()) {
        Some(num)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with_path(path: &str) -> Chunk {
        Chunk {
            source_id: "doc-1".into(),
            path: path.into(),
            contextual_header: String::new(),
            content: "x".into(),
            content_role: ContentRole::Stycke,
            token_count: 1,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn chapter_number_extraction() {
        assert_eq!(chunk_with_path("kap3.§12").chapter_number(), Some("3"));
        assert_eq!(chunk_with_path("kap0.§1").chapter_number(), Some("0"));
        assert_eq!(chunk_with_path("overgangsbest").chapter_number(), None);
        assert_eq!(chunk_with_path("bilaga.2").chapter_number(), None);
        assert_eq!(chunk_with_path("kapx.§1").chapter_number(), None);
    }

    #[test]
    fn content_role_roundtrip() {
        for role in [
            ContentRole::Stycke,
            ContentRole::AllmantRad,
            ContentRole::Table,
            ContentRole::Heading,
            ContentRole::TransitionProvision,
            ContentRole::Footnote,
            ContentRole::MarkdownChunk,
        ] {
            assert_eq!(ContentRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(ContentRole::parse("NOT_A_ROLE"), None);
    }

    #[test]
    fn list_items_absorb_into_stycke() {
        assert_eq!(
            ContentRole::from_semantic(SemanticRole::ListItem),
            ContentRole::Stycke
        );
    }
}
