use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

static DOI_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:doi:\s*|https?://(?:dx\.)?doi\.org/)").expect("valid regex")
});

// PDF text extraction sometimes glues the next word onto a DOI that ends in a digit.
static GLUED_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*\d)[A-Za-z]{3,}$").expect("valid regex"));

/// Clean a raw DOI string: strip a `doi:` or `doi.org` URL prefix
/// (case-insensitive), trailing punctuation and any glued-on trailing word.
/// Case is preserved. Returns `None` when nothing is left.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let stripped = DOI_PREFIX.replace(raw.trim(), "");
    let cleaned = trim_trailing_punctuation(stripped.trim());
    let repaired = GLUED_SUFFIX
        .captures(cleaned)
        .and_then(|caps| caps.get(1))
        .map_or(cleaned, |m| m.as_str());
    let result = trim_trailing_punctuation(repaired);
    (!result.is_empty()).then(|| result.to_string())
}

fn trim_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches(|c: char| !c.is_alphanumeric())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doi {
    pub raw: String,
    /// Cleaned DOI with its original case.
    pub normalized: String,
    pub url: String,
}

impl Doi {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || ScienceError::InvalidDoi(input.trim().to_string());
        let normalized = normalize_doi(input).ok_or_else(invalid)?;

        // Must look like `10.<registrant>/<suffix>`
        if !normalized.starts_with("10.") {
            return Err(invalid());
        }
        let slash_pos = normalized.find('/').ok_or_else(invalid)?;
        if normalized[slash_pos + 1..].is_empty() {
            return Err(invalid());
        }

        let url = format!("https://doi.org/{normalized}");
        Ok(Self {
            raw: input.trim().to_string(),
            normalized,
            url,
        })
    }

    /// Lower-cased form used for equality and uniqueness checks.
    pub fn key(&self) -> String {
        self.normalized.to_lowercase()
    }

    pub fn same_as(&self, other: &Doi) -> bool {
        self.normalized.eq_ignore_ascii_case(&other.normalized)
    }
}
