//! Language selection
//!
//! Users pick one of a fixed set of options; each option maps to a code
//! string such as `en+hi`, which is split on `+` into the set of language
//! codes handed to the engine cache.

use crate::error::OcrError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// The language options offered to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageSelection {
    English,
    Hindi,
    EnglishHindi,
}

impl LanguageSelection {
    pub const ALL: [LanguageSelection; 3] = [
        LanguageSelection::English,
        LanguageSelection::Hindi,
        LanguageSelection::EnglishHindi,
    ];

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "Hindi",
            Self::EnglishHindi => "English + Hindi",
        }
    }

    /// Engine-neutral code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Hindi => "hi",
            Self::EnglishHindi => "en+hi",
        }
    }

    /// Look up an option by its label or its code (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        let wanted = s.trim();
        Self::ALL.into_iter().find(|option| {
            option.label().eq_ignore_ascii_case(wanted) || option.code().eq_ignore_ascii_case(wanted)
        })
    }

    pub fn languages(&self) -> LanguageSet {
        // Codes are static and never empty
        LanguageSet::from_codes(self.code().split('+'))
    }
}

/// Label/code pair reported by the info endpoint
#[derive(Debug, Clone, Serialize)]
pub struct LanguageOption {
    pub label: &'static str,
    pub code: &'static str,
}

impl From<LanguageSelection> for LanguageOption {
    fn from(selection: LanguageSelection) -> Self {
        Self {
            label: selection.label(),
            code: selection.code(),
        }
    }
}

/// Non-empty set of language codes; the engine cache key
///
/// Codes are kept as given (lowercased) and are not checked against any
/// list here. Engines reject codes they cannot load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LanguageSet(BTreeSet<String>);

impl LanguageSet {
    fn from_codes<'a>(codes: impl Iterator<Item = &'a str>) -> Self {
        Self(
            codes
                .map(|code| code.trim().to_lowercase())
                .filter(|code| !code.is_empty())
                .collect(),
        )
    }

    /// Parse a `+`-separated code string such as `en+hi`
    pub fn parse(codes: &str) -> Result<Self, OcrError> {
        let set = Self::from_codes(codes.split('+'));
        if set.0.is_empty() {
            return Err(OcrError::InvalidRequest(format!(
                "No language codes in '{}'",
                codes
            )));
        }
        Ok(set)
    }

    /// Resolve a user value: a known option label or code, or a raw code string
    pub fn resolve(value: &str) -> Result<Self, OcrError> {
        match LanguageSelection::from_str(value) {
            Some(selection) => Ok(selection.languages()),
            None => Self::parse(value),
        }
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for LanguageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.codes().collect::<Vec<_>>().join("+");
        f.write_str(&joined)
    }
}
