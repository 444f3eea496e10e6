//! Cheap token estimation.
//!
//! Every budget decision in the pipeline (prompt splitting, paragraph
//! merging, embedding truncation) runs through this heuristic instead of a
//! real tokenizer. The error margin is absorbed by conservative multipliers
//! at the call sites.

/// Estimate the token count of `text` as `ceil(chars / 4)`.
///
/// Counts Unicode scalar values rather than bytes so Swedish text
/// (å/ä/ö) does not inflate budgets. Returns 0 for empty input.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("Text A"), 2);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // Four Swedish letters = 8 bytes but 4 chars = 1 token.
        assert_eq!(estimate_tokens("åäöå"), 1);
    }

    #[test]
    fn monotone_in_length() {
        let mut text = String::new();
        let mut prev = 0;
        for _ in 0..64 {
            text.push('x');
            let now = estimate_tokens(&text);
            assert!(now >= prev);
            prev = now;
        }
    }
}
