//! Alias deduplication (C4): collapse name variants into canonical names.
//!
//! Union-find over indices into the input list, with three string-level
//! merge strategies applied in order and an optional LLM-backed semantic
//! pass for pairs no string signal can join. Degrades silently on any LLM
//! failure, matching the teacher's treatment of reranking as an optional
//! quality pass rather than a required step.

use std::collections::HashMap;

use crate::llm::LlmClient;

const TITLES: &[&str] = &[
    "Mr", "Mrs", "Ms", "Miss", "Dr", "Professor", "Sir", "Lady",
];

const FUZZY_THRESHOLD: f64 = 0.85;

/// Options controlling which C4 merge strategies run.
#[derive(Debug, Clone)]
pub struct DedupOptions {
    /// Whether to run the optional LLM-backed semantic merge pass.
    pub semantic: bool,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self { semantic: false }
    }
}

/// Union-find over `0..n`, path-compressed, union-by-rank.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Strip a leading honorific (case-insensitively) and return the remainder,
/// trimmed. If no title prefix matches, the original trimmed string is
/// returned unchanged.
fn strip_title(name: &str) -> &str {
    let trimmed = name.trim();
    for title in TITLES {
        if let Some(rest) = trimmed.strip_prefix(title) {
            let rest = rest.trim_start_matches('.').trim_start();
            if rest.len() < trimmed.len() && !rest.is_empty() {
                // Only treat as a title if followed by a separator or space,
                // not if it merely happens to be a prefix of a longer word.
                let boundary_ok = trimmed[title.len()..]
                    .chars()
                    .next()
                    .map(|c| c == '.' || c.is_whitespace())
                    .unwrap_or(true);
                if boundary_ok {
                    return rest;
                }
            }
        }
    }
    trimmed
}

fn is_whole_word_substring(needle: &str, haystack: &str) -> bool {
    let needle_lower = needle.to_lowercase();
    let haystack_lower = haystack.to_lowercase();
    if needle_lower.is_empty() {
        return false;
    }
    let needle_words: Vec<&str> = needle_lower.split_whitespace().collect();
    let haystack_words: Vec<&str> = haystack_lower.split_whitespace().collect();
    if needle_words.is_empty() || needle_words.len() > haystack_words.len() {
        return false;
    }
    haystack_words
        .windows(needle_words.len())
        .any(|window| window == needle_words.as_slice())
}

/// Choose the canonical representative of a merged group: longest form;
/// among ties, prefer the one with no stripped-off title; among ties,
/// prefer the lexicographically earliest.
fn choose_canonical<'a>(names: &[&'a str]) -> &'a str {
    let mut best = names[0];
    for &candidate in &names[1..] {
        let cand_len = candidate.chars().count();
        let best_len = best.chars().count();
        let cand_has_title = strip_title(candidate) != candidate.trim();
        let best_has_title = strip_title(best) != best.trim();

        let replace = match cand_len.cmp(&best_len) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => {
                if cand_has_title != best_has_title {
                    !cand_has_title
                } else {
                    candidate < best
                }
            }
        };
        if replace {
            best = candidate;
        }
    }
    best
}

/// Collapse name variants in `names` into canonical names and an alias map
/// from each surface form to its canonical name.
pub fn deduplicate(
    names: &[String],
    opts: &DedupOptions,
    llm: Option<&dyn LlmClient>,
) -> (Vec<String>, HashMap<String, String>) {
    let n = names.len();
    if n == 0 {
        return (Vec::new(), HashMap::new());
    }

    let stripped: Vec<&str> = names.iter().map(|n| strip_title(n)).collect();
    let mut uf = UnionFind::new(n);

    // Substring match on stripped forms.
    for i in 0..n {
        for j in (i + 1)..n {
            if is_whole_word_substring(stripped[i], stripped[j])
                || is_whole_word_substring(stripped[j], stripped[i])
            {
                uf.union(i, j);
            }
        }
    }

    // Fuzzy match on stripped, lowercased forms.
    for i in 0..n {
        for j in (i + 1)..n {
            if uf.find(i) == uf.find(j) {
                continue;
            }
            let a = stripped[i].to_lowercase();
            let b = stripped[j].to_lowercase();
            if strsim::normalized_levenshtein(&a, &b) >= FUZZY_THRESHOLD {
                uf.union(i, j);
            }
        }
    }

    // Optional semantic pass: for each still-unmerged pair, ask the LLM.
    // Any failure (quota, transport, unparsable response) is swallowed —
    // semantic merging is a quality improvement, not a requirement.
    if opts.semantic {
        if let Some(llm) = llm {
            for i in 0..n {
                for j in (i + 1)..n {
                    if uf.find(i) == uf.find(j) {
                        continue;
                    }
                    if semantic_same_character(llm, &names, names[i].as_str(), names[j].as_str())
                        .unwrap_or(false)
                    {
                        uf.union(i, j);
                    }
                }
            }
        }
    }

    // Group indices by root, pick canonical per group.
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = uf.find(i);
        groups.entry(root).or_default().push(i);
    }

    let mut canonical_names = Vec::with_capacity(groups.len());
    let mut alias_map = HashMap::with_capacity(n);

    for indices in groups.values() {
        let members: Vec<&str> = indices.iter().map(|&i| names[i].as_str()).collect();
        let canonical = choose_canonical(&members).to_string();
        for &i in indices {
            alias_map.insert(names[i].clone(), canonical.clone());
        }
        canonical_names.push(canonical);
    }
    canonical_names.sort();

    (canonical_names, alias_map)
}

fn semantic_same_character(
    llm: &dyn LlmClient,
    all_names: &[String],
    a: &str,
    b: &str,
) -> crate::error::Result<bool> {
    let context = all_names.join(", ");
    let prompt = format!(
        "In a work of fiction with these character names: {context}\n\n\
         Are \"{a}\" and \"{b}\" the same fictional character (e.g. a formal name \
         and an informal or relational alias for the same person)? Answer with \
         exactly one word: yes or no."
    );
    let response = llm.complete(&prompt)?;
    Ok(response.trim().to_lowercase().starts_with("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FakeLlmClient;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strips_known_titles() {
        assert_eq!(strip_title("Mr Darcy"), "Darcy");
        assert_eq!(strip_title("Dr. Watson"), "Watson");
        assert_eq!(strip_title("Professor Snape"), "Snape");
        assert_eq!(strip_title("Harry Potter"), "Harry Potter");
    }

    #[test]
    fn substring_merges_first_name_into_full_name() {
        let input = names(&["Harry", "Harry Potter", "Ron"]);
        let (canonical, aliases) = deduplicate(&input, &DedupOptions::default(), None);
        assert_eq!(canonical, vec!["Harry Potter".to_string(), "Ron".to_string()]);
        assert_eq!(aliases["Harry"], "Harry Potter");
        assert_eq!(aliases["Harry Potter"], "Harry Potter");
        assert_eq!(aliases["Ron"], "Ron");
    }

    #[test]
    fn fuzzy_merges_misspelling() {
        let input = names(&["Hermione Granger", "Hermoine Granger"]);
        let (canonical, _) = deduplicate(&input, &DedupOptions::default(), None);
        assert_eq!(canonical.len(), 1);
    }

    #[test]
    fn distinct_names_are_not_merged() {
        let input = names(&["Harry Potter", "Ron Weasley", "Hermione Granger"]);
        let (canonical, _) = deduplicate(&input, &DedupOptions::default(), None);
        assert_eq!(canonical.len(), 3);
    }

    #[test]
    fn canonical_prefers_longest_then_no_title_then_lexicographic() {
        let input = names(&["Mr Darcy", "Darcy", "Fitzwilliam Darcy"]);
        let (canonical, aliases) = deduplicate(&input, &DedupOptions::default(), None);
        assert_eq!(canonical, vec!["Fitzwilliam Darcy".to_string()]);
        assert_eq!(aliases["Mr Darcy"], "Fitzwilliam Darcy");
    }

    #[test]
    fn semantic_pass_merges_with_fake_llm_when_enabled() {
        let input = names(&["Petunia", "Mrs Dursley"]);
        let fake = FakeLlmClient {
            response: "yes".to_string(),
        };
        let opts = DedupOptions { semantic: true };
        let (canonical, _) = deduplicate(&input, &opts, Some(&fake));
        assert_eq!(canonical.len(), 1);
    }

    #[test]
    fn semantic_pass_is_noop_when_disabled_even_with_llm_present() {
        let input = names(&["Petunia", "Mrs Dursley"]);
        let fake = FakeLlmClient {
            response: "yes".to_string(),
        };
        let opts = DedupOptions { semantic: false };
        let (canonical, _) = deduplicate(&input, &opts, Some(&fake));
        assert_eq!(canonical.len(), 2);
    }

    #[test]
    fn empty_input_returns_empty_output() {
        let (canonical, aliases) = deduplicate(&[], &DedupOptions::default(), None);
        assert!(canonical.is_empty());
        assert!(aliases.is_empty());
    }
}
