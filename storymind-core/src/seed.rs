//! Deterministic name-to-seed mapping (C6).
//!
//! `MD5` is chosen deliberately over a cryptographic hash: it is universally
//! available, cheap, and its strength properties are irrelevant here — the
//! only requirements are bit-identical determinism across processes and a
//! low collision rate at 32 bits, both of which MD5 trivially satisfies.

/// Deterministically map `name` to a 32-bit seed: `MD5(lowercase(trim(name)))`
/// as a big-endian integer mod 2^32 — the low-order 4 bytes of the digest.
#[must_use]
pub fn seed(name: &str) -> u32 {
    let normalized = name.trim().to_lowercase();
    let digest = md5::compute(normalized.as_bytes());
    u32::from_be_bytes([digest[12], digest[13], digest[14], digest[15]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_value_harry_potter() {
        assert_eq!(seed("Harry Potter"), 1085936863);
    }

    #[test]
    fn seed_is_deterministic() {
        assert_eq!(seed("Hermione Granger"), seed("Hermione Granger"));
    }

    #[test]
    fn seed_ignores_surrounding_whitespace_and_case() {
        assert_eq!(seed("Harry Potter"), seed("  harry potter  "));
        assert_eq!(seed("Harry Potter"), seed("HARRY POTTER"));
    }

    #[test]
    fn distinct_names_usually_differ() {
        assert_ne!(seed("Harry Potter"), seed("Ron Weasley"));
        assert_ne!(seed("Harry Potter"), seed("Hermione Granger"));
    }
}
