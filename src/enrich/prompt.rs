//! Prompt construction for context enrichment.
//!
//! Follows the contextual-retrieval pattern: the whole document (or a
//! slice of it) rides along in the prompt, and the model writes one short
//! Swedish context per chunk that makes it self-contained.

use crate::types::ContextBudget;

use super::planner::{DocumentForContext, EnrichmentCall};

/// Build the enrichment prompt for one planned call.
pub fn build_prompt(doc: &DocumentForContext, call: &EnrichmentCall, budget: &ContextBudget) -> String {
    let chunk_list = call
        .chunks
        .iter()
        .map(|c| {
            let excerpt: String = c.content.chars().take(budget.excerpt_chars).collect();
            format!("<chunk id=\"{}\">\n{}\n</chunk>", c.path, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<document>
{markdown}
</document>

Here are {count} chunks extracted from the Swedish legal document "{title}" ({number}). Please give a short succinct context for each chunk to situate it within the overall document for the purposes of improving search retrieval of the chunk.

{chunk_list}

For each chunk, write a context (1-2 sentences, in Swedish) that makes the chunk SELF-CONTAINED — someone reading only the context + chunk should fully understand it without access to the rest of the document.

Specifically:
- State which law (full name + SFS number) and which chapter/topic area the chunk belongs to
- Resolve cross-references: replace "denna lag", "denna förordning", "enligt 14 §", "ovan nämnda paragraf" with what they actually refer to
- Resolve pronouns: replace "den som", "dessa", "sådan" with the actual subjects they refer to
- Add surrounding context: what do the neighboring sections deal with? What broader topic does this chunk fall under?

DO NOT summarize the chunk — the chunk text is already indexed. Only add information that is MISSING from the chunk.

<example>
CHUNK: "Den som uppsåtligen eller av grov oaktsamhet bryter mot 29 § döms till böter eller fängelse i högst ett år."
BAD — paraphrases: "Bestämmelsen anger straff för den som bryter mot 29 §."
GOOD — contextualizes: "Straffbestämmelse i 8 kap. Arbetsmiljölagen (1977:1160) om sanktioner. 29 § avser arbetsgivarens skyldighet att anmäla allvarliga olyckor till Arbetsmiljöverket. 'Den som' syftar på arbetsgivaren eller den som hyr in arbetskraft."
</example>

Respond ONLY with valid JSON: {{ "prefixes": {{ "<chunk id>": "<context>", ... }} }}"#,
        markdown = call.markdown,
        count = call.chunks.len(),
        title = doc.title,
        number = doc.document_number,
    )
}
