//! Profile synthesis (C5): retrieve context and ask the LLM for a single
//! canonical visual description per character.
//!
//! Retrieval-empty is treated as a normal, isolated-skip outcome (`Ok(None)`)
//! rather than an error, so the orchestrator can continue past a character
//! with no retrievable mentions without treating the whole ingest as failed.

use crate::embedder::Embedder;
use crate::error::Result;
use crate::index::EmbeddingIndex;
use crate::llm::LlmClient;

const SYNTHESIS_PROMPT_TEMPLATE: &str = r#"You are building a canonical visual description of a fictional character from excerpts of a novel that mention them.

Character name: {name}

Excerpts mentioning this character:
---
{context}
---

Write a single paragraph (roughly 50-300 words) describing this character's enduring physical appearance: hair, build, face, distinguishing features, and habitual dress. Do not describe their personality, actions, or plot events. Do not describe transient states (e.g. what they are wearing in one specific scene) unless it is characteristic of them throughout the excerpts. Respond with only the paragraph, no preamble."#;

/// A synthesized canonical description for one character, prior to seeding
/// and image generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterProfile {
    pub name: String,
    pub description: String,
    pub mention_count: usize,
}

/// Synthesize a profile for `name` by retrieving the `k` nearest windows to
/// it from `index` and asking `llm` for a canonical description.
///
/// Returns `Ok(None)` when retrieval yields no usable windows — this is an
/// expected, isolated outcome (the orchestrator skips the character and
/// continues), not an error.
pub fn synthesize(
    name: &str,
    index: &EmbeddingIndex,
    embedder: &mut dyn Embedder,
    llm: &dyn LlmClient,
    k: usize,
) -> Result<Option<CharacterProfile>> {
    let query_vector = embedder.embed(name)?;
    let hits = index.search(&query_vector, k);

    if hits.is_empty() {
        tracing::warn!("no retrievable context for character '{name}', skipping");
        return Ok(None);
    }

    let mention_count = hits
        .iter()
        .filter(|(_, text)| mentions_whole_word(text, name))
        .count();

    let context = hits
        .iter()
        .map(|(_, text)| *text)
        .collect::<Vec<_>>()
        .join("\n---\n");

    let prompt = SYNTHESIS_PROMPT_TEMPLATE
        .replace("{name}", name)
        .replace("{context}", &context);

    let description = llm.complete(&prompt)?.trim().to_string();

    Ok(Some(CharacterProfile {
        name: name.to_string(),
        description,
        mention_count,
    }))
}

fn mentions_whole_word(haystack: &str, needle: &str) -> bool {
    let haystack_lower = haystack.to_lowercase();
    let needle_lower = needle.to_lowercase();
    let needle_words: Vec<&str> = needle_lower.split_whitespace().collect();
    if needle_words.is_empty() {
        return false;
    }
    let haystack_words: Vec<&str> = haystack_lower.split_whitespace().collect();
    if needle_words.len() > haystack_words.len() {
        return false;
    }
    haystack_words
        .windows(needle_words.len())
        .any(|w| w == needle_words.as_slice())
}
