/// Keep at most `max` characters of `s`. Cuts on char boundaries, so
/// multi-byte (CJK) text is never split mid-character.
pub fn clip_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Normalize a path-like source reference to forward slashes.
pub fn normalize_source_ref(s: &str) -> String {
    s.trim().replace('\\', "/")
}
