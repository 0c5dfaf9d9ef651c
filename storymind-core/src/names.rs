//! Name extraction (C3): find candidate character names in a document prefix.
//!
//! One LLM call over the document's leading prefix, asking for a bounded
//! JSON array of proper names. Parsing tolerance (code fences, surrounding
//! prose) lives in `llm::parse_json_string_array`.

use crate::error::Result;
use crate::llm::LlmClient;

const EXTRACTION_PROMPT_TEMPLATE: &str = r#"You are analyzing the opening of a work of long-form fiction to identify named characters.

Read the following excerpt and list the distinct human or human-like character names mentioned (first names, full names, or commonly used nicknames — not titles alone, not places, not organizations).

Return ONLY a JSON array of strings, at most {limit} names, ordered by how prominently each character appears. Example: ["Harry Potter", "Hermione Granger"]

Excerpt:
---
{prefix}
---

Names:"#;

/// Extract up to `limit` candidate character names from `prefix`.
pub fn extract(llm: &dyn LlmClient, prefix: &str, limit: usize) -> Result<Vec<String>> {
    let prompt = EXTRACTION_PROMPT_TEMPLATE
        .replace("{limit}", &limit.to_string())
        .replace("{prefix}", prefix);

    let response = llm.complete(&prompt)?;
    let names = crate::llm::parse_json_string_array(&response)?;

    let mut names: Vec<String> = names.iter().map(|n| normalize_whitespace(n)).filter(|n| !n.is_empty()).collect();
    names.truncate(limit);
    Ok(names)
}

/// Trim and collapse runs of internal whitespace to a single space.
fn normalize_whitespace(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_limit_and_prefix() {
        let prompt = EXTRACTION_PROMPT_TEMPLATE
            .replace("{limit}", "50")
            .replace("{prefix}", "Once upon a time, Harry Potter lived under the stairs.");
        assert!(prompt.contains("at most 50 names"));
        assert!(prompt.contains("Harry Potter"));
    }

    #[test]
    fn extract_parses_and_truncates_llm_response() {
        use crate::llm::FakeLlmClient;

        let fake = FakeLlmClient {
            response: r#"["Harry Potter", "Hermione Granger", "Ron Weasley"]"#.to_string(),
        };
        let names = extract(&fake, "some prefix text", 2).unwrap();
        assert_eq!(names, vec!["Harry Potter", "Hermione Granger"]);
    }

    #[test]
    fn extract_drops_blank_names() {
        use crate::llm::FakeLlmClient;

        let fake = FakeLlmClient {
            response: r#"["Harry Potter", "  ", ""]"#.to_string(),
        };
        let names = extract(&fake, "some prefix text", 10).unwrap();
        assert_eq!(names, vec!["Harry Potter"]);
    }

    #[test]
    fn extract_collapses_internal_whitespace() {
        use crate::llm::FakeLlmClient;

        let fake = FakeLlmClient {
            response: r#"["  Harry   Potter  ", "Ron\tWeasley"]"#.to_string(),
        };
        let names = extract(&fake, "some prefix text", 10).unwrap();
        assert_eq!(names, vec!["Harry Potter", "Ron Weasley"]);
    }
}
