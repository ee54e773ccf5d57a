use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::arxiv::ArxivId;
use crate::record::{AuthorRecord, SourceKind, SourceRecord};

/// One `<entry>` of an arXiv Atom feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivEntry {
    pub arxiv_id: ArxivId,
    pub doi: Option<String>,
    pub title: String,
    pub authors: Vec<ArxivAuthor>,
    pub abstract_text: String,
    pub published: Option<DateTime<Utc>>,
    /// First four digits of `<published>`, kept even when the timestamp is malformed.
    pub year: Option<i32>,
    pub categories: Vec<String>,
    pub primary_category: Option<String>,
    pub comment: Option<String>,
    pub journal_ref: Option<String>,
    pub pdf_url: String,
    pub abs_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivAuthor {
    pub name: String,
    pub affiliation: Option<String>,
}

impl ArxivEntry {
    pub fn published_year(&self) -> Option<i32> {
        self.published.map(|p| p.year()).or(self.year)
    }

    pub fn into_record(self) -> SourceRecord {
        let year = self.published_year();
        let mut record = SourceRecord::empty(SourceKind::ArxivApi);
        record.title = Some(self.title).filter(|t| !t.is_empty());
        record.year = year;
        record.doi = self.doi;
        record.venue = self.journal_ref;
        record.url = Some(self.abs_url);
        record.open_access_pdf_url = Some(self.pdf_url);
        record.authors = self
            .authors
            .into_iter()
            .filter(|a| !a.name.is_empty())
            .map(|a| AuthorRecord {
                name: a.name,
                affiliation: a.affiliation,
                orcid: None,
            })
            .collect();
        record.set_extra("abstract", Some(self.abstract_text.as_str()));
        record.set_extra("arxiv_id", Some(self.arxiv_id.id.as_str()));
        record.set_extra("primary_category", self.primary_category.as_deref());
        record.set_extra("comment", self.comment.as_deref());
        record
    }
}
