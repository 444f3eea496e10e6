//! Structured chunking tiers: paragraf-level chunks and non-paragraf
//! content (transition provisions, preamble, appendices).

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::tokens::estimate_tokens;
use crate::types::{
    CanonicalJson, Chapter, Chunk, ChunkBudget, ContentRole, Document, Paragraf,
};

use super::base_metadata;
use super::markdown::split_non_para;

lazy_static! {
    // Transition provision boundary: an SFS number at the start of a line.
    static ref SFS_BOUNDARY: Regex = Regex::new(r"^(\d{4}:\d{1,4})\b").unwrap();
}

/// Derive paragraf-level and non-paragraf chunks from canonical JSON.
pub fn chunk_structured(doc: &Document, json: &CanonicalJson, budget: &ChunkBudget) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let base_meta = base_metadata(doc);
    let doc_part = format!(
        "{} ({})",
        doc.title,
        doc.document_number.as_deref().unwrap_or("")
    );

    // Tier 1: one chunk per paragraf.
    for chapter in json.all_chapters() {
        for paragraf in &chapter.paragrafer {
            let content = paragraf.full_text();
            if content.is_empty() {
                warn!(
                    paragraf = %paragraf.number,
                    document = %doc.label(),
                    "skipping empty paragraf"
                );
                continue;
            }

            let chap_num = chapter.effective_number().unwrap_or("0");
            let path = format!("kap{chap_num}.§{}", paragraf.number);
            let header = contextual_header(&doc_part, chapter, paragraf);

            let mut metadata = base_meta.clone();
            if let Some(anchor) = anchor_id(doc, chap_num, &paragraf.number) {
                metadata.insert("anchorId".into(), anchor.into());
            }
            if let Some(amended_by) = &paragraf.amended_by {
                metadata.insert("amendedBy".into(), amended_by.clone().into());
            }
            if let Some(heading) = &paragraf.heading {
                metadata.insert("heading".into(), heading.clone().into());
            }

            let content = match &paragraf.heading {
                Some(heading) => format!("{heading}\n{content}"),
                None => content,
            };
            let token_count = estimate_tokens(&content);

            chunks.push(Chunk {
                source_id: doc.id.clone(),
                path,
                contextual_header: header,
                content,
                content_role: ContentRole::from_semantic(paragraf.dominant_role()),
                token_count,
                metadata,
            });
        }
    }

    chunk_transition_provisions(doc, json, budget, &doc_part, &mut chunks);
    chunk_preamble(doc, json, budget, &doc_part, &mut chunks);
    chunk_appendices(doc, json, budget, &doc_part, &mut chunks);

    chunks
}

/// Transition provisions: one chunk when small, otherwise split at SFS
/// number boundaries so each amendment's clause stands alone.
fn chunk_transition_provisions(
    doc: &Document,
    json: &CanonicalJson,
    budget: &ChunkBudget,
    doc_part: &str,
    chunks: &mut Vec<Chunk>,
) {
    if json.transition_provisions.is_empty() {
        return;
    }
    let text = json
        .transition_provisions
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed = text.trim();
    if trimmed.chars().count() < budget.min_chunk_chars {
        return;
    }

    let base_meta = base_metadata(doc);
    let base_header = format!("{doc_part} > Övergångsbestämmelser");

    if estimate_tokens(trimmed) <= budget.cap_tokens {
        chunks.push(Chunk {
            source_id: doc.id.clone(),
            path: "overgangsbest".into(),
            contextual_header: base_header,
            content: trimmed.to_string(),
            content_role: ContentRole::TransitionProvision,
            token_count: estimate_tokens(trimmed),
            metadata: base_meta,
        });
        return;
    }

    let entries = split_transition_provisions(trimmed, budget);
    let single = entries.len() == 1;
    for (i, entry) in entries.into_iter().enumerate() {
        if entry.content.chars().count() < budget.min_chunk_chars {
            continue;
        }
        let mut metadata = base_meta.clone();
        let header = match &entry.sfs_number {
            Some(sfs) => {
                metadata.insert("sfsNumber".into(), sfs.clone().into());
                format!("{base_header} > {sfs}")
            }
            None => base_header.clone(),
        };
        let token_count = estimate_tokens(&entry.content);
        chunks.push(Chunk {
            source_id: doc.id.clone(),
            path: if single {
                "overgangsbest".into()
            } else {
                format!("overgangsbest.{}", i + 1)
            },
            contextual_header: header,
            content: entry.content,
            content_role: ContentRole::TransitionProvision,
            token_count,
            metadata,
        });
    }
}

fn chunk_preamble(
    doc: &Document,
    json: &CanonicalJson,
    budget: &ChunkBudget,
    doc_part: &str,
    chunks: &mut Vec<Chunk>,
) {
    if json.preamble.is_empty() {
        return;
    }
    let text = json
        .preamble
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let trimmed = text.trim();
    if trimmed.chars().count() < budget.min_chunk_chars {
        return;
    }

    let base_meta = base_metadata(doc);
    let base_header = format!("{doc_part} > Inledning");
    let blocks = if estimate_tokens(trimmed) <= budget.cap_tokens {
        vec![trimmed.to_string()]
    } else {
        split_non_para(trimmed, budget)
    };
    let single = blocks.len() == 1;
    for (i, block) in blocks.into_iter().enumerate() {
        if block.chars().count() < budget.min_chunk_chars {
            continue;
        }
        let token_count = estimate_tokens(&block);
        chunks.push(Chunk {
            source_id: doc.id.clone(),
            path: if single {
                "preamble".into()
            } else {
                format!("preamble.{}", i + 1)
            },
            contextual_header: base_header.clone(),
            content: block,
            content_role: ContentRole::Stycke,
            token_count,
            metadata: base_meta.clone(),
        });
    }
}

fn chunk_appendices(
    doc: &Document,
    json: &CanonicalJson,
    budget: &ChunkBudget,
    doc_part: &str,
    chunks: &mut Vec<Chunk>,
) {
    for (i, appendix) in json.appendices.iter().enumerate() {
        let trimmed = appendix.content.trim();
        if trimmed.chars().count() < budget.min_chunk_chars {
            continue;
        }
        let n = i + 1;
        let base_header = format!("{doc_part} > Bilaga {n}");
        let mut appendix_meta = base_metadata(doc);
        if let Some(title) = &appendix.title {
            appendix_meta.insert("appendixTitle".into(), title.clone().into());
        }

        let blocks = if estimate_tokens(trimmed) <= budget.cap_tokens {
            vec![trimmed.to_string()]
        } else {
            split_non_para(trimmed, budget)
        };
        let single = blocks.len() == 1;
        for (j, block) in blocks.into_iter().enumerate() {
            if block.chars().count() < budget.min_chunk_chars {
                continue;
            }
            let token_count = estimate_tokens(&block);
            chunks.push(Chunk {
                source_id: doc.id.clone(),
                path: if single {
                    format!("bilaga.{n}")
                } else {
                    format!("bilaga.{n}.{}", j + 1)
                },
                contextual_header: base_header.clone(),
                content: block,
                content_role: ContentRole::Stycke,
                token_count,
                metadata: appendix_meta.clone(),
            });
        }
    }
}

/// Breadcrumb header for a paragraf chunk. Chapterless documents omit the
/// chapter segment entirely.
fn contextual_header(doc_part: &str, chapter: &Chapter, paragraf: &Paragraf) -> String {
    match chapter.effective_number() {
        None => format!("{doc_part} > {} §", paragraf.number),
        Some(num) => {
            let chapter_part = match &chapter.title {
                Some(title) => format!("Kap {num}: {title}"),
                None => format!("Kap {num}"),
            };
            format!("{doc_part} > {chapter_part} > {} §", paragraf.number)
        }
    }
}

/// Reader-compatible anchor id, e.g. `2010-110_K3_P12`.
///
/// AFS documents are scraped from av.se with their own slugified anchors,
/// so those get none.
fn anchor_id(doc: &Document, chapter_number: &str, paragraf_number: &str) -> Option<String> {
    let number = doc.document_number.as_deref()?;
    if doc.content_type == crate::types::SourceCategory::AgencyRegulation
        && number.starts_with("AFS ")
    {
        return None;
    }
    let doc_id: String = number
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ':' { '-' } else { c })
        .collect();
    if chapter_number != "0" {
        Some(format!("{doc_id}_K{chapter_number}_P{paragraf_number}"))
    } else {
        Some(format!("{doc_id}_P{paragraf_number}"))
    }
}

struct TransitionEntry {
    sfs_number: Option<String>,
    content: String,
}

/// Split transition provisions at SFS-number line boundaries, merging
/// adjacent small entries back up to the cap.
fn split_transition_provisions(text: &str, budget: &ChunkBudget) -> Vec<TransitionEntry> {
    let mut entries: Vec<TransitionEntry> = Vec::new();
    let mut current_sfs: Option<String> = None;
    let mut current_lines: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if let Some(caps) = SFS_BOUNDARY.captures(line) {
            let content = current_lines.join("\n").trim().to_string();
            if !content.is_empty() {
                entries.push(TransitionEntry {
                    sfs_number: current_sfs.take(),
                    content,
                });
            }
            current_sfs = Some(caps[1].to_string());
            current_lines = vec![line];
        } else {
            current_lines.push(line);
        }
    }
    let content = current_lines.join("\n").trim().to_string();
    if !content.is_empty() {
        entries.push(TransitionEntry {
            sfs_number: current_sfs,
            content,
        });
    }

    // No boundaries found: fall back to paragraph-merge splitting.
    if entries.len() <= 1 {
        return split_non_para(text, budget)
            .into_iter()
            .map(|block| TransitionEntry {
                sfs_number: None,
                content: block,
            })
            .collect();
    }

    // Merge adjacent small entries, keeping the first SFS number as label.
    let mut merged: Vec<TransitionEntry> = Vec::new();
    let mut buffer: Option<TransitionEntry> = None;
    for entry in entries {
        match buffer.as_mut() {
            None => buffer = Some(entry),
            Some(buf) => {
                let combined = format!("{}\n{}", buf.content, entry.content);
                if estimate_tokens(&combined) <= budget.cap_tokens {
                    buf.content = combined;
                } else {
                    merged.extend(buffer.replace(entry));
                }
            }
        }
    }
    merged.extend(buffer);
    merged
}
