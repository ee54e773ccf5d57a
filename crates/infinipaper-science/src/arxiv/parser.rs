use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use crate::arxiv::types::{ArxivAuthor, ArxivEntry};
use crate::error::{Result, ScienceError};
use crate::identifiers::{arxiv::ArxivId, doi::normalize_doi};

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: String,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    #[serde(rename = "arxiv:primary_category", alias = "primary_category")]
    primary_category: Option<AtomCategory>,
    #[serde(rename = "arxiv:comment", alias = "comment")]
    comment: Option<String>,
    #[serde(rename = "arxiv:journal_ref", alias = "journal_ref")]
    journal_ref: Option<String>,
    #[serde(rename = "arxiv:doi", alias = "doi")]
    doi: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    #[serde(default)]
    name: String,
    #[serde(rename = "arxiv:affiliation", alias = "affiliation")]
    affiliation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@type")]
    link_type: Option<String>,
}

/// Parse an Atom feed. Entries whose `<id>` is not an arXiv identifier
/// (the API reports errors as such entries) are skipped.
pub fn parse_atom_response(xml: &str) -> Result<Vec<ArxivEntry>> {
    let feed: AtomFeed =
        from_str(xml).map_err(|e| ScienceError::Parse(format!("invalid atom xml: {e}")))?;

    Ok(feed.entries.into_iter().filter_map(parse_entry).collect())
}

fn parse_entry(entry: AtomEntry) -> Option<ArxivEntry> {
    let arxiv_id = match ArxivId::parse(entry.id.trim()) {
        Ok(id) => id,
        Err(_) => {
            debug!(id = %entry.id, "skipping atom entry without arXiv id");
            return None;
        }
    };

    let authors = entry
        .authors
        .into_iter()
        .map(|author| ArxivAuthor {
            name: clean_text(&author.name),
            affiliation: clean_optional(author.affiliation),
        })
        .collect::<Vec<_>>();

    let categories = entry
        .categories
        .into_iter()
        .filter_map(|category| clean_optional(category.term))
        .collect::<Vec<_>>();

    let primary_category = entry
        .primary_category
        .and_then(|category| clean_optional(category.term))
        .or_else(|| categories.first().cloned());

    let pdf_url = entry
        .links
        .iter()
        .find(|link| link.link_type.as_deref() == Some("application/pdf"))
        .and_then(|link| link.href.as_deref())
        .map(normalize_arxiv_url)
        .unwrap_or_else(|| arxiv_id.pdf_url());

    Some(ArxivEntry {
        abs_url: arxiv_id.abs_url(),
        doi: entry.doi.as_deref().and_then(normalize_doi),
        title: clean_text(&entry.title),
        authors,
        abstract_text: clean_text(&entry.summary),
        published: parse_timestamp(&entry.published),
        year: leading_year(&entry.published),
        categories,
        primary_category,
        comment: clean_optional(entry.comment),
        journal_ref: clean_optional(entry.journal_ref),
        pdf_url,
        arxiv_id,
    })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn leading_year(value: &str) -> Option<i32> {
    let digits = value.trim().get(..4)?;
    digits
        .chars()
        .all(|c| c.is_ascii_digit())
        .then(|| digits.parse().ok())
        .flatten()
}

fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| clean_text(&v)).filter(|v| !v.is_empty())
}

fn normalize_arxiv_url(url: &str) -> String {
    match url.strip_prefix("http://arxiv.org/") {
        Some(rest) => format!("https://arxiv.org/{rest}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESNET_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=id:1512.03385</title>
  <entry>
    <id>http://arxiv.org/abs/1512.03385v1</id>
    <published>2015-12-10T19:51:55Z</published>
    <title>Deep Residual Learning
      for Image Recognition</title>
    <summary>  Deeper neural networks are more difficult to train.  </summary>
    <author><name>Kaiming He</name></author>
    <author><name> Xiangyu   Zhang </name></author>
    <arxiv:comment>Tech report</arxiv:comment>
    <link href="http://arxiv.org/abs/1512.03385v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1512.03385v1" rel="related" type="application/pdf"/>
    <category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_entry_fields() {
        let entries = parse_atom_response(RESNET_XML).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.arxiv_id.id, "1512.03385");
        assert_eq!(entry.arxiv_id.version, Some(1));
        assert_eq!(entry.title, "Deep Residual Learning for Image Recognition");
        assert_eq!(entry.abstract_text, "Deeper neural networks are more difficult to train.");
        assert_eq!(entry.authors[1].name, "Xiangyu Zhang");
        assert_eq!(entry.authors[1].affiliation, None);
        assert_eq!(entry.categories, vec!["cs.CV".to_string()]);
        // falls back to the first category
        assert_eq!(entry.primary_category.as_deref(), Some("cs.CV"));
        assert_eq!(entry.comment.as_deref(), Some("Tech report"));
        assert_eq!(entry.journal_ref, None);
        assert_eq!(entry.doi, None);
        assert_eq!(entry.pdf_url, "https://arxiv.org/pdf/1512.03385v1");
        assert_eq!(entry.abs_url, "https://arxiv.org/abs/1512.03385");
        assert_eq!(entry.year, Some(2015));
    }

    #[test]
    fn record_without_journal_ref_has_no_venue() {
        let entry = parse_atom_response(RESNET_XML).unwrap().remove(0);
        let record = entry.into_record();
        assert_eq!(record.venue, None);
        assert_eq!(record.year, Some(2015));
        assert_eq!(record.url.as_deref(), Some("https://arxiv.org/abs/1512.03385"));
        assert_eq!(record.extra["arxiv_id"], "1512.03385");
        assert_eq!(record.authors.len(), 2);
    }

    #[test]
    fn malformed_published_still_yields_year() {
        assert_eq!(leading_year("2019-13-45Tjunk"), Some(2019));
        assert_eq!(parse_timestamp("2019-13-45Tjunk"), None);
        assert_eq!(leading_year("n/a"), None);
    }

    #[test]
    fn error_entries_are_skipped() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_garbage</id>
    <title>Error</title>
    <summary>incorrect id format for garbage</summary>
  </entry>
</feed>"#;
        assert!(parse_atom_response(xml).unwrap().is_empty());
    }
}
