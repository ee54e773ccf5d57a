use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::author::NewAuthor;

pub type PaperId = i64;

/// A stored paper record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: PaperId,
    pub title: String,

    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,

    /// Location of the stored file this record was imported from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a merge may copy from a duplicate into the kept paper.
pub const MERGEABLE_FIELDS: [&str; 4] = ["doi", "abstract", "venue", "year"];

impl Paper {
    /// Copy `doi`, `abstract`, `venue` and `year` from `other` wherever this
    /// paper's value is empty. Returns the names of the fields that were filled.
    pub fn absorb_missing(&mut self, other: &Paper) -> Vec<&'static str> {
        let mut filled = Vec::new();
        if fill_text(&mut self.doi, other.doi.as_deref()) {
            filled.push("doi");
        }
        if fill_text(&mut self.abstract_text, other.abstract_text.as_deref()) {
            filled.push("abstract");
        }
        if fill_text(&mut self.venue, other.venue.as_deref()) {
            filled.push("venue");
        }
        if fill_year(&mut self.year, other.year) {
            filled.push("year");
        }
        if !filled.is_empty() {
            self.updated_at = Utc::now();
        }
        filled
    }

    /// Fill every empty field from an incoming import. Existing values win.
    pub fn absorb_import(&mut self, incoming: &NewPaper) -> Vec<&'static str> {
        let mut filled = Vec::new();
        if self.title.trim().is_empty() && !incoming.title.trim().is_empty() {
            self.title = incoming.title.trim().to_string();
            filled.push("title");
        }
        if fill_text(&mut self.abstract_text, incoming.abstract_text.as_deref()) {
            filled.push("abstract");
        }
        if fill_year(&mut self.year, incoming.year) {
            filled.push("year");
        }
        if fill_text(&mut self.doi, incoming.doi.as_deref()) {
            filled.push("doi");
        }
        if fill_text(&mut self.venue, incoming.venue.as_deref()) {
            filled.push("venue");
        }
        if fill_text(&mut self.url, incoming.url.as_deref()) {
            filled.push("url");
        }
        if fill_text(&mut self.pdf_url, incoming.pdf_url.as_deref()) {
            filled.push("pdf_url");
        }
        if fill_text(&mut self.file_ref, incoming.file_ref.as_deref()) {
            filled.push("file_ref");
        }
        if !filled.is_empty() {
            self.updated_at = Utc::now();
        }
        filled
    }

    pub fn has_doi(&self) -> bool {
        self.doi.as_deref().is_some_and(|d| !d.trim().is_empty())
    }
}

/// Input for creating or updating a paper through import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPaper {
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub file_ref: Option<String>,
    #[serde(default)]
    pub authors: Vec<NewAuthor>,
}

impl NewPaper {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

fn fill_text(target: &mut Option<String>, incoming: Option<&str>) -> bool {
    let current_empty = target.as_deref().is_none_or(|s| s.trim().is_empty());
    match incoming.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) if current_empty => {
            *target = Some(value.to_string());
            true
        }
        _ => false,
    }
}

fn fill_year(target: &mut Option<i32>, incoming: Option<i32>) -> bool {
    let current_empty = target.is_none_or(|y| y == 0);
    match incoming.filter(|y| *y != 0) {
        Some(year) if current_empty => {
            *target = Some(year);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(id: PaperId, title: &str) -> Paper {
        let now = Utc::now();
        Paper {
            id,
            title: title.to_string(),
            abstract_text: None,
            year: None,
            doi: None,
            venue: None,
            url: None,
            pdf_url: None,
            file_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn absorb_missing_only_fills_empty_fields() {
        let mut keep = paper(1, "Keep");
        keep.venue = Some("NeurIPS".to_string());
        keep.abstract_text = Some("   ".to_string());

        let mut other = paper(2, "Other");
        other.venue = Some("ICML".to_string());
        other.abstract_text = Some("An abstract".to_string());
        other.year = Some(2017);
        other.doi = Some("10.1000/abc".to_string());
        other.url = Some("https://example.org".to_string());

        let filled = keep.absorb_missing(&other);

        assert_eq!(filled, vec!["doi", "abstract", "year"]);
        assert_eq!(keep.venue.as_deref(), Some("NeurIPS"));
        assert_eq!(keep.abstract_text.as_deref(), Some("An abstract"));
        assert_eq!(keep.year, Some(2017));
        assert!(keep.url.is_none());
    }

    #[test]
    fn zero_year_counts_as_empty() {
        let mut keep = paper(1, "Keep");
        keep.year = Some(0);
        let mut other = paper(2, "Other");
        other.year = Some(2020);

        assert_eq!(keep.absorb_missing(&other), vec!["year"]);
        assert_eq!(keep.year, Some(2020));
    }

    #[test]
    fn absorb_import_keeps_existing_title() {
        let mut keep = paper(1, "Existing Title");
        let mut incoming = NewPaper::new("Incoming Title");
        incoming.pdf_url = Some("/files/pdfs/a.pdf".to_string());

        let filled = keep.absorb_import(&incoming);

        assert_eq!(keep.title, "Existing Title");
        assert_eq!(filled, vec!["pdf_url"]);
    }
}
