//! Token estimation helpers.

/// Rough token count: one token per four bytes. Advisory only.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() / 4).max(1)
}
