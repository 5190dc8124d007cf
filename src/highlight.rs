//! Keyword search over extracted text
//!
//! Matches are wrapped in markdown bold markers (`**match**`).

use regex::{Captures, RegexBuilder};
use serde::Serialize;

/// Search terms parsed from comma-separated user input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    /// Split on commas, trim, and drop empty entries. Input order is kept.
    pub fn parse(input: &str) -> Self {
        Self(
            input
                .split(',')
                .map(str::trim)
                .filter(|kw| !kw.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn highlight(&self, text: &str) -> String {
        highlight(text, &self.0)
    }
}

/// Wrap every case-insensitive occurrence of any keyword in `**...**`.
///
/// Keywords are literals. Matching is leftmost-first and non-overlapping;
/// when several keywords match at the same position the one listed first
/// wins. Text is returned unchanged when no non-blank keyword is given.
pub fn highlight<S: AsRef<str>>(text: &str, keywords: &[S]) -> String {
    let escaped: Vec<String> = keywords
        .iter()
        .map(|kw| kw.as_ref().trim())
        .filter(|kw| !kw.is_empty())
        .map(regex::escape)
        .collect();

    if escaped.is_empty() {
        return text.to_string();
    }

    let pattern = match RegexBuilder::new(&escaped.join("|"))
        .case_insensitive(true)
        .build()
    {
        Ok(pattern) => pattern,
        Err(e) => {
            // Only reachable if the keywords exceed the regex size limit
            tracing::warn!("Keyword pattern rejected, skipping highlight: {}", e);
            return text.to_string();
        }
    };

    pattern
        .replace_all(text, |caps: &Captures| format!("**{}**", &caps[0]))
        .into_owned()
}
