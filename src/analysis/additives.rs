//! Food-additive code ("E-number") extraction from recognized label text

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

/// Word-delimited `E` + three ASCII digits + optional trailing letter.
///
/// `[0-9]` instead of `\d` keeps non-ASCII digits out of the match.
const ADDITIVE_PATTERN: &str = r"\bE[0-9]{3}[A-Za-z]?\b";

/// Compiled [`ADDITIVE_PATTERN`].
///
/// The pattern is a constant whose compilation is covered by a test, so this
/// cannot fail at runtime.
fn additive_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(ADDITIVE_PATTERN).expect("additive pattern is valid"))
}

/// A normalized additive code such as `E322` or `E150d`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AdditiveCode(String);

impl AdditiveCode {
    /// The code as it appeared in the source text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric part of the code (`E150d` -> 150)
    pub fn number(&self) -> u16 {
        self.0[1..4].parse().unwrap_or_default()
    }

    /// Trailing letter, with its original case
    pub fn suffix(&self) -> Option<char> {
        self.0[4..].chars().next()
    }
}

impl fmt::Display for AdditiveCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AdditiveCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract every additive code from `text`, left to right.
///
/// Duplicates are kept and nothing is re-cased. Never fails; text without
/// matches yields an empty list.
pub fn extract_codes(text: &str) -> Vec<AdditiveCode> {
    additive_regex()
        .find_iter(text)
        .map(|m| AdditiveCode(m.as_str().to_string()))
        .collect()
}

/// Drop repeated codes, keeping the order of first appearance
pub fn dedup_codes(codes: &[AdditiveCode]) -> Vec<AdditiveCode> {
    let mut seen = HashSet::with_capacity(codes.len());
    codes
        .iter()
        .filter(|&code| seen.insert(code.as_str()))
        .cloned()
        .collect()
}
