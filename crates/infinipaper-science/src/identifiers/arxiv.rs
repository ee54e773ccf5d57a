use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

static ARXIV_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:arxiv:\s*|https?://(?:www\.|export\.)?arxiv\.org/(?:abs|pdf)/)")
        .expect("valid regex")
});

// YYMM.NNNNN with optional version
static NEW_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}\.\d{4,5})(?:v(\d+))?$").expect("valid regex"));

// category/YYMMNNN with optional version
static OLD_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(([a-zA-Z\-]+(?:\.[A-Z]{2})?)/\d{7})(?:v(\d+))?$").expect("valid regex")
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArxivId {
    pub raw: String,
    /// Identifier without version suffix.
    pub id: String,
    pub version: Option<u32>,
    pub category: Option<String>,
}

impl ArxivId {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let stripped = ARXIV_PREFIX.replace(input, "");
        let stripped = stripped.trim_end_matches(".pdf");

        if let Some(caps) = NEW_FORMAT.captures(stripped)
            && let Some(id) = caps.get(1)
        {
            return Ok(Self {
                raw: input.to_string(),
                id: id.as_str().to_string(),
                version: caps.get(2).and_then(|v| v.as_str().parse().ok()),
                category: None,
            });
        }

        if let Some(caps) = OLD_FORMAT.captures(stripped)
            && let Some(id) = caps.get(1)
        {
            return Ok(Self {
                raw: input.to_string(),
                id: id.as_str().to_string(),
                version: caps.get(3).and_then(|v| v.as_str().parse().ok()),
                category: caps.get(2).map(|c| c.as_str().to_string()),
            });
        }

        Err(ScienceError::InvalidArxivId(input.to_string()))
    }

    pub fn abs_url(&self) -> String {
        format!("https://arxiv.org/abs/{}", self.id)
    }

    pub fn pdf_url(&self) -> String {
        format!("https://arxiv.org/pdf/{}", self.id)
    }

    /// DOI that DataCite assigns to every arXiv preprint.
    pub fn datacite_doi(&self) -> String {
        format!("10.48550/arXiv.{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_format_bare() {
        let id = ArxivId::parse("2301.04567").unwrap();
        assert_eq!(id.id, "2301.04567");
        assert_eq!(id.version, None);
        assert_eq!(id.abs_url(), "https://arxiv.org/abs/2301.04567");
        assert_eq!(id.pdf_url(), "https://arxiv.org/pdf/2301.04567");
    }

    #[test]
    fn new_format_with_version() {
        let id = ArxivId::parse("2301.04567v2").unwrap();
        assert_eq!(id.id, "2301.04567");
        assert_eq!(id.version, Some(2));
    }

    #[test]
    fn old_format_with_category() {
        let id = ArxivId::parse("cs.AI/0601001").unwrap();
        assert_eq!(id.id, "cs.AI/0601001");
        assert_eq!(id.category.as_deref(), Some("cs.AI"));
        assert_eq!(id.version, None);
    }

    #[test]
    fn prefixes_are_case_insensitive() {
        assert_eq!(ArxivId::parse("arxiv:2301.04567").unwrap().id, "2301.04567");
        let id = ArxivId::parse("arXiv: 2301.04567v5").unwrap();
        assert_eq!(id.id, "2301.04567");
        assert_eq!(id.version, Some(5));
    }

    #[test]
    fn abs_and_pdf_urls() {
        assert_eq!(
            ArxivId::parse("https://arxiv.org/abs/2301.04567").unwrap().id,
            "2301.04567"
        );
        assert_eq!(
            ArxivId::parse("http://arxiv.org/pdf/2301.04567v1.pdf").unwrap().id,
            "2301.04567"
        );
    }

    #[test]
    fn datacite_doi_uses_arxiv_prefix() {
        let id = ArxivId::parse("1706.03762").unwrap();
        assert_eq!(id.datacite_doi(), "10.48550/arXiv.1706.03762");
    }

    #[test]
    fn reject_plain_number() {
        assert!(ArxivId::parse("12345").is_err());
    }
}
