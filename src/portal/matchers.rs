use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use tracing::warn;

/// Case-insensitive multi-phrase matcher for portal UI text
/// ("no records found", dialog titles, button labels).
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    inner: Option<AhoCorasick>,
}

impl KeywordMatcher {
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Self {
        let patterns: Vec<String> = phrases
            .iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if patterns.is_empty() {
            return Self { inner: None };
        }
        let inner = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostFirst)
            .build(&patterns);
        match inner {
            Ok(ac) => Self { inner: Some(ac) },
            Err(e) => {
                warn!("matchers: failed to build keyword matcher: {}", e);
                Self { inner: None }
            }
        }
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        match &self.inner {
            Some(ac) => ac.is_match(&haystack.to_lowercase()),
            None => false,
        }
    }
}
