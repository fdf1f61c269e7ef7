//! Pre-write content policy.
//!
//! The store consults an optional [`WriteGuard`] after normalizing an entry
//! and before opening its write transaction. A rejection surfaces as
//! `MemError::PolicyBlocked` carrying the guard's reason.

use regex::Regex;
use std::sync::LazyLock;

/// What a guard gets to inspect: the normalized title, the body verbatim
/// and the raw metadata document.
#[derive(Debug, Clone, Copy)]
pub struct EntryDraft<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub metadata: &'a str,
}

pub trait WriteGuard: Send + Sync {
    /// `Err(reason)` rejects the write.
    fn check(&self, draft: &EntryDraft<'_>) -> Result<(), String>;
}

struct Pattern {
    name: &'static str,
    re: Regex,
}

static SECRET_PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    vec![
        Pattern {
            name: "openai_secret_key",
            re: Regex::new(r"\bsk-[a-zA-Z0-9_-]{10,}\b").unwrap(),
        },
        Pattern {
            name: "aws_access_key",
            re: Regex::new(r"\bAKIA[0-9A-Z]{16}\b").unwrap(),
        },
        Pattern {
            name: "github_token",
            re: Regex::new(r"\bghp_[a-zA-Z0-9]{20,}\b").unwrap(),
        },
    ]
});

/// Name of the first secret pattern found in `text`, if any.
pub fn find_secret(text: &str) -> Option<&'static str> {
    SECRET_PATTERNS
        .iter()
        .find(|p| p.re.is_match(text))
        .map(|p| p.name)
}

/// Rejects entries that appear to carry API keys or access tokens in any
/// of their text fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecretGuard;

impl WriteGuard for SecretGuard {
    fn check(&self, draft: &EntryDraft<'_>) -> Result<(), String> {
        for field in [draft.body, draft.title, draft.metadata] {
            if let Some(name) = find_secret(field) {
                return Err(name.to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
