use std::collections::BTreeMap;
use std::fmt;

use infinipaper_core::{NewAuthor, NewPaper};
use serde::{Deserialize, Serialize};

/// Provider that produced a [`SourceRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Grobid,
    #[serde(rename = "arxiv")]
    ArxivApi,
    SemanticScholar,
    #[serde(rename = "crossref")]
    CrossRef,
    #[serde(rename = "openalex")]
    OpenAlex,
    TextHeuristic,
    Filename,
    Unknown,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grobid => "grobid",
            Self::ArxivApi => "arxiv",
            Self::SemanticScholar => "semantic_scholar",
            Self::CrossRef => "crossref",
            Self::OpenAlex => "openalex",
            Self::TextHeuristic => "text_heuristic",
            Self::Filename => "filename",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
}

impl AuthorRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One provider's answer about a paper. Every field is optional; an
/// unreachable or empty provider is represented by [`SourceRecord::empty`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: SourceKind,
    pub title: Option<String>,
    pub venue: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub open_access_pdf_url: Option<String>,
    #[serde(default)]
    pub authors: Vec<AuthorRecord>,
    pub cited_by_count: Option<u64>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl SourceRecord {
    pub fn empty(source: SourceKind) -> Self {
        Self {
            source,
            title: None,
            venue: None,
            year: None,
            doi: None,
            url: None,
            open_access_pdf_url: None,
            authors: Vec::new(),
            cited_by_count: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.venue.is_none()
            && self.year.is_none()
            && self.doi.is_none()
            && self.url.is_none()
            && self.open_access_pdf_url.is_none()
            && self.authors.is_empty()
            && self.cited_by_count.is_none()
            && self.extra.is_empty()
    }

    /// Set `extra[key]` when `value` holds non-blank text.
    pub fn set_extra(&mut self, key: &str, value: Option<&str>) {
        if let Some(v) = non_blank(value) {
            self.extra.insert(key.to_string(), v);
        }
    }
}

/// Outcome of folding source records; see [`crate::enrichment::merge_records`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    pub title: Option<String>,
    pub venue: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub open_access_pdf_url: Option<String>,
    pub authors: Vec<AuthorRecord>,
    pub cited_by_count: Option<u64>,
    pub extra: BTreeMap<String, String>,
    /// Winning provider per populated field.
    pub field_sources: BTreeMap<String, SourceKind>,
}

impl ResolvedMetadata {
    pub fn abstract_text(&self) -> Option<&str> {
        self.extra.get("abstract").map(String::as_str)
    }

    /// Storage form of this metadata. `file_ref` points at the source PDF.
    pub fn to_new_paper(&self, file_ref: Option<String>) -> NewPaper {
        let mut paper = NewPaper::new(self.title.clone().unwrap_or_default());
        paper.abstract_text = self.abstract_text().map(ToOwned::to_owned);
        paper.year = self.year;
        paper.doi = self.doi.clone();
        paper.venue = self.venue.clone();
        paper.url = self.url.clone();
        paper.pdf_url = self.open_access_pdf_url.clone();
        paper.file_ref = file_ref;
        paper.authors = self
            .authors
            .iter()
            .map(|a| {
                let mut author = NewAuthor::new(a.name.clone());
                author.affiliation = a.affiliation.clone();
                author.orcid = a.orcid.clone();
                author
            })
            .collect();
        paper
    }
}

/// Trimmed copy of `value`, or `None` when it is missing or blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

/// Bare ORCID iD without its `orcid.org` URL prefix.
pub(crate) fn strip_orcid(raw: &str) -> Option<String> {
    let bare = raw
        .trim()
        .trim_start_matches("https://orcid.org/")
        .trim_start_matches("http://orcid.org/")
        .trim();
    (!bare.is_empty()).then(|| bare.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_reports_empty() {
        let mut record = SourceRecord::empty(SourceKind::CrossRef);
        assert!(record.is_empty());
        record.set_extra("abstract", Some("   "));
        assert!(record.is_empty());
        record.set_extra("abstract", Some(" We study things. "));
        assert!(!record.is_empty());
        assert_eq!(record.extra["abstract"], "We study things.");
    }

    #[test]
    fn orcid_prefix_is_stripped() {
        assert_eq!(
            strip_orcid("https://orcid.org/0000-0002-1825-0097").as_deref(),
            Some("0000-0002-1825-0097")
        );
        assert_eq!(
            strip_orcid("http://orcid.org/0000-0002-1825-0097").as_deref(),
            Some("0000-0002-1825-0097")
        );
        assert_eq!(strip_orcid("  "), None);
    }

    #[test]
    fn resolved_metadata_converts_to_new_paper() {
        let mut meta = ResolvedMetadata {
            title: Some("Deep Residual Learning".into()),
            doi: Some("10.1109/CVPR.2016.90".into()),
            year: Some(2016),
            open_access_pdf_url: Some("https://example.org/resnet.pdf".into()),
            authors: vec![AuthorRecord {
                name: "Kaiming He".into(),
                affiliation: Some("Microsoft Research".into()),
                orcid: None,
            }],
            ..Default::default()
        };
        meta.extra.insert("abstract".into(), "Deeper networks.".into());

        let paper = meta.to_new_paper(Some("/papers/resnet.pdf".into()));
        assert_eq!(paper.title, "Deep Residual Learning");
        assert_eq!(paper.abstract_text.as_deref(), Some("Deeper networks."));
        assert_eq!(paper.pdf_url.as_deref(), Some("https://example.org/resnet.pdf"));
        assert_eq!(paper.file_ref.as_deref(), Some("/papers/resnet.pdf"));
        assert_eq!(paper.authors.len(), 1);
        assert_eq!(paper.authors[0].affiliation.as_deref(), Some("Microsoft Research"));
    }

    #[test]
    fn source_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SourceKind::SemanticScholar).unwrap();
        assert_eq!(json, "\"semantic_scholar\"");
        let json = serde_json::to_string(&SourceKind::OpenAlex).unwrap();
        assert_eq!(json, format!("\"{}\"", SourceKind::OpenAlex.as_str()));
        assert_eq!(SourceKind::CrossRef.to_string(), "crossref");
    }
}
