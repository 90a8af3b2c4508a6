//! Scoring helpers for file resolution.
//!
//! All scores are relative-ranking signals for one resolution run; they are
//! not probabilities and are not comparable with parser confidences.

/// Floor a fuzzy score must exceed before it is scaled and kept.
pub const FUZZY_FLOOR: f64 = 0.3;
pub const PATH_FUZZY_SCALE: f64 = 0.5;
pub const SUMMARY_FUZZY_SCALE: f64 = 0.4;
pub const SUBSEQUENCE_SCALE: f64 = 0.8;

/// Exact-pass score for an identifier stem against a file base name.
/// Equality is 1.0; containment scales with how much of the name it covers.
pub fn file_name_score(stem: &str, base_name: &str) -> Option<f64> {
    let stem = stem.to_lowercase();
    let base = base_name.to_lowercase();
    if stem.is_empty() || base.is_empty() {
        return None;
    }
    if stem == base {
        return Some(1.0);
    }
    if base.contains(&stem) {
        return Some(0.8 * stem.len() as f64 / base.len() as f64);
    }
    None
}

/// Symbol-pass score: `equal` on case-insensitive equality, otherwise
/// `contained * identifier.len / symbol.len` when the symbol contains it.
pub fn symbol_score(identifier: &str, symbol: &str, equal: f64, contained: f64) -> Option<f64> {
    let ident = identifier.to_lowercase();
    let sym = symbol.to_lowercase();
    if ident.is_empty() || sym.is_empty() {
        return None;
    }
    if ident == sym {
        return Some(equal);
    }
    if sym.contains(&ident) {
        return Some(contained * ident.len() as f64 / sym.len() as f64);
    }
    None
}

/// Compactness of `needle` as an in-order character subsequence of
/// `haystack`: `needle.len / span`, where span runs from the first to the last
/// matched character. Zero when not every character is found.
pub fn subsequence_score(needle: &str, haystack: &str) -> f64 {
    let needle: Vec<char> = needle.to_lowercase().chars().collect();
    let hay: Vec<char> = haystack.to_lowercase().chars().collect();
    if needle.is_empty() || hay.is_empty() {
        return 0.0;
    }
    let mut best = 0.0f64;
    // Try every start position of the first needle char so a late compact
    // occurrence is not hidden by an early sparse one.
    for (start, &c) in hay.iter().enumerate() {
        if c != needle[0] {
            continue;
        }
        let mut ni = 1;
        let mut end = start;
        for (offset, &h) in hay[start + 1..].iter().enumerate() {
            if ni == needle.len() {
                break;
            }
            if h == needle[ni] {
                ni += 1;
                end = start + 1 + offset;
            }
        }
        if ni == needle.len() {
            let span = end - start + 1;
            best = best.max(needle.len() as f64 / span as f64);
        }
    }
    best
}

/// Fuzzy score of an identifier against a haystack (path or summary):
/// containment scores `identifier.len / haystack.len`, otherwise the
/// subsequence scorer scaled by [`SUBSEQUENCE_SCALE`].
pub fn fuzzy_score(identifier: &str, haystack: &str) -> f64 {
    let ident = identifier.to_lowercase();
    let hay = haystack.to_lowercase();
    if ident.is_empty() || hay.is_empty() {
        return 0.0;
    }
    if hay.contains(&ident) {
        return ident.len() as f64 / hay.len() as f64;
    }
    subsequence_score(&ident, &hay) * SUBSEQUENCE_SCALE
}
