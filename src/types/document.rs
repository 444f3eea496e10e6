//! Document and canonical-structure types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a legal source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceCategory {
    /// Consolidated SFS statute.
    SfsLaw,
    /// Amendment act; text lives inside the consolidated base law.
    SfsAmendment,
    /// Agency regulation (myndighetsföreskrift).
    AgencyRegulation,
    /// EU regulation.
    EuRegulation,
    Other,
}

impl SourceCategory {
    /// Whether documents of this category get chunked and indexed.
    ///
    /// Amendments are skipped: their text is already part of the
    /// consolidated base law.
    pub fn is_chunkable(&self) -> bool {
        matches!(
            self,
            SourceCategory::SfsLaw
                | SourceCategory::AgencyRegulation
                | SourceCategory::EuRegulation
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::SfsLaw => "SFS_LAW",
            SourceCategory::SfsAmendment => "SFS_AMENDMENT",
            SourceCategory::AgencyRegulation => "AGENCY_REGULATION",
            SourceCategory::EuRegulation => "EU_REGULATION",
            SourceCategory::Other => "OTHER",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained role of an individual text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticRole {
    Stycke,
    AllmantRad,
    Table,
    Heading,
    ListItem,
    Preamble,
    TransitionProvision,
    Footnote,
}

/// One stycke (sub-paragraph) inside a paragraf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stycke {
    pub text: String,
    #[serde(default = "default_role")]
    pub role: SemanticRole,
}

fn default_role() -> SemanticRole {
    SemanticRole::Stycke
}

/// One paragraf (§) of a statute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraf {
    /// Section number, e.g. "12" or "12 a".
    pub number: String,
    #[serde(default)]
    pub heading: Option<String>,
    /// Full text of the paragraf when stycken are not broken out.
    #[serde(default)]
    pub content: Option<String>,
    /// SFS number of the latest amending act, if recorded.
    #[serde(default)]
    pub amended_by: Option<String>,
    #[serde(default)]
    pub stycken: Vec<Stycke>,
}

impl Paragraf {
    /// Assembled text of the paragraf, stycken joined by blank lines.
    pub fn full_text(&self) -> String {
        if !self.stycken.is_empty() {
            self.stycken
                .iter()
                .map(|s| s.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n")
        } else {
            self.content.as_deref().unwrap_or("").trim().to_string()
        }
    }

    /// Dominant semantic role across the stycken.
    ///
    /// Only a paragraf whose stycken all share one role carries that role;
    /// mixed paragrafer fall back to plain Stycke.
    pub fn dominant_role(&self) -> SemanticRole {
        let mut roles = self.stycken.iter().map(|s| s.role);
        match roles.next() {
            Some(first) if roles.all(|r| r == first) => first,
            _ => SemanticRole::Stycke,
        }
    }
}

/// A chapter grouping paragrafer.
///
/// Laws without chapter structure are modelled as a single chapter with
/// `number` absent or `"0"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter number, e.g. "3". Absent or "0" for chapterless laws.
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub paragrafer: Vec<Paragraf>,
}

impl Chapter {
    /// Normalized chapter number: `None` and `"0"` both mean chapterless.
    pub fn effective_number(&self) -> Option<&str> {
        match self.number.as_deref() {
            None | Some("0") | Some("") => None,
            Some(n) => Some(n),
        }
    }
}

/// A division (avdelning) grouping chapters in large statutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Division {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

/// A free-standing text block outside the chapter structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    #[serde(default = "default_role")]
    pub role: SemanticRole,
}

/// An appendix (bilaga).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appendix {
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
}

/// Canonical structured representation of a legal document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalJson {
    #[serde(default)]
    pub divisions: Vec<Division>,
    /// Chapters for documents without divisions.
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub preamble: Vec<TextBlock>,
    #[serde(default)]
    pub transition_provisions: Vec<TextBlock>,
    #[serde(default)]
    pub appendices: Vec<Appendix>,
}

impl CanonicalJson {
    /// All chapters in document order.
    ///
    /// Documents with divisions nest their chapters inside them; the
    /// top-level `chapters` list is only used when no divisions exist.
    pub fn all_chapters(&self) -> Vec<&Chapter> {
        if !self.divisions.is_empty() {
            self.divisions.iter().flat_map(|d| d.chapters.iter()).collect()
        } else {
            self.chapters.iter().collect()
        }
    }

    pub fn paragraf_count(&self) -> usize {
        self.all_chapters().iter().map(|c| c.paragrafer.len()).sum()
    }

    /// True when there is nothing to chunk at the structured tier.
    pub fn is_effectively_empty(&self) -> bool {
        self.paragraf_count() == 0
            && self.preamble.is_empty()
            && self.transition_provisions.is_empty()
            && self.appendices.is_empty()
    }
}

/// A source document as loaded from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Official number, e.g. "2010:110" or "HSLF-FS 2021:75".
    #[serde(default)]
    pub document_number: Option<String>,
    pub content_type: SourceCategory,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub json_content: Option<CanonicalJson>,
    #[serde(default)]
    pub markdown_content: Option<String>,
    #[serde(default)]
    pub plain_text_content: Option<String>,
}

impl Document {
    /// Human-readable label for logs: title plus number when known.
    pub fn label(&self) -> String {
        match &self.document_number {
            Some(num) => format!("{} ({})", self.title, num),
            None => self.title.clone(),
        }
    }

    /// True when no representation carries any text.
    pub fn has_no_content(&self) -> bool {
        let json_empty = self
            .json_content
            .as_ref()
            .map(|j| j.is_effectively_empty())
            .unwrap_or(true);
        let md_empty = self
            .markdown_content
            .as_deref()
            .map(|m| m.trim().is_empty())
            .unwrap_or(true);
        let plain_empty = self
            .plain_text_content
            .as_deref()
            .map(|p| p.trim().is_empty())
            .unwrap_or(true);
        json_empty && md_empty && plain_empty
    }
}
