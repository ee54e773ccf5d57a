use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Result, ScienceError};
use crate::identifiers::doi::normalize_doi;
use crate::record::{AuthorRecord, SourceKind, SourceRecord, strip_orcid};

#[derive(Debug, Default)]
struct AuthorDraft {
    forenames: Vec<String>,
    surname: String,
    orcid: Option<String>,
    affiliation: Option<String>,
    affiliation_ref: Option<String>,
}

#[derive(Debug)]
struct AffiliationDraft {
    id: Option<String>,
    orgs: Vec<String>,
    inside_author: bool,
}

/// Streaming state over a GROBID `processHeaderDocument` TEI response.
#[derive(Debug, Default)]
struct TeiState {
    stack: Vec<String>,
    title: Option<String>,
    title_buf: Option<String>,
    year: Option<i32>,
    doi: Option<String>,
    authors: Vec<AuthorDraft>,
    author: Option<AuthorDraft>,
    affiliation: Option<AffiliationDraft>,
    org_buf: Option<String>,
    affiliations: HashMap<String, String>,
    idno: Option<(String, String)>,
    abstract_buf: Option<String>,
    abstract_text: Option<String>,
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Value of the attribute whose local name is `key` (`xml:id` matches `id`).
fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn leading_year(value: &str) -> Option<i32> {
    let digits = value.get(..4)?;
    if digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

impl TeiState {
    fn open(&mut self, e: &BytesStart<'_>, empty: bool) {
        let name = local_name(e);
        let parent = self.stack.last().map(String::as_str);

        match name.as_str() {
            "title"
                if !empty
                    && self.title.is_none()
                    && self.title_buf.is_none()
                    && matches!(parent, Some("titleStmt") | Some("analytic")) =>
            {
                self.title_buf = Some(String::new());
            }
            "date" => {
                if self.year.is_none() {
                    self.year = attr(e, "when").as_deref().and_then(leading_year);
                }
            }
            "author" if !empty && self.author.is_none() => {
                self.author = Some(AuthorDraft::default());
            }
            "forename" if !empty => {
                if let Some(author) = self.author.as_mut() {
                    author.forenames.push(String::new());
                }
            }
            "affiliation" => {
                if let Some(author) = self.author.as_mut()
                    && let Some(reference) = attr(e, "ref")
                {
                    author.affiliation_ref = Some(reference.trim_start_matches('#').to_string());
                }
                if !empty {
                    self.affiliation = Some(AffiliationDraft {
                        id: attr(e, "id"),
                        orgs: Vec::new(),
                        inside_author: self.author.is_some(),
                    });
                }
            }
            "orgName" if !empty && self.affiliation.is_some() => {
                self.org_buf = Some(String::new());
            }
            "idno" if !empty => {
                self.idno = Some((attr(e, "type").unwrap_or_default(), String::new()));
            }
            "abstract" if !empty => {
                self.abstract_buf = Some(String::new());
            }
            _ => {}
        }

        if !empty {
            self.stack.push(name);
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(buf) = self.title_buf.as_mut() {
            buf.push_str(text);
        }
        if let Some(author) = self.author.as_mut() {
            match self.stack.last().map(String::as_str) {
                Some("forename") => {
                    if let Some(f) = author.forenames.last_mut() {
                        f.push_str(text);
                    }
                }
                Some("surname") => author.surname.push_str(text),
                _ => {}
            }
        }
        if let Some((_, buf)) = self.idno.as_mut() {
            buf.push_str(text);
        }
        if let Some(buf) = self.org_buf.as_mut() {
            buf.push_str(text);
        }
        if let Some(buf) = self.abstract_buf.as_mut() {
            buf.push_str(text);
            buf.push(' ');
        }
    }

    fn close(&mut self, name: &str) {
        self.stack.pop();

        match name {
            "title" => {
                if let Some(buf) = self.title_buf.take() {
                    let cleaned = clean_text(&buf);
                    if !cleaned.is_empty() {
                        self.title = Some(cleaned);
                    }
                }
            }
            "orgName" => {
                if let (Some(org), Some(aff)) = (self.org_buf.take(), self.affiliation.as_mut()) {
                    let cleaned = clean_text(&org);
                    if !cleaned.is_empty() {
                        aff.orgs.push(cleaned);
                    }
                }
            }
            "affiliation" => {
                if let Some(aff) = self.affiliation.take() {
                    let joined = aff.orgs.join(", ");
                    if !joined.is_empty() {
                        if aff.inside_author
                            && let Some(author) = self.author.as_mut()
                            && author.affiliation.is_none()
                        {
                            author.affiliation = Some(joined.clone());
                        }
                        if let Some(id) = aff.id {
                            self.affiliations.insert(id, joined);
                        }
                    }
                }
            }
            "idno" => {
                if let Some((kind, value)) = self.idno.take() {
                    match kind.to_ascii_lowercase().as_str() {
                        "orcid" => {
                            if let Some(author) = self.author.as_mut() {
                                author.orcid = strip_orcid(&value);
                            }
                        }
                        "doi" if self.author.is_none() && self.doi.is_none() => {
                            self.doi = normalize_doi(&value);
                        }
                        _ => {}
                    }
                }
            }
            "author" => {
                if let Some(author) = self.author.take() {
                    self.authors.push(author);
                }
            }
            "abstract" => {
                if let Some(buf) = self.abstract_buf.take() {
                    let cleaned = clean_text(&buf);
                    if !cleaned.is_empty() {
                        self.abstract_text = Some(cleaned);
                    }
                }
            }
            _ => {}
        }
    }

    fn into_record(self) -> SourceRecord {
        let mut record = SourceRecord::empty(SourceKind::Grobid);
        record.title = self.title;
        record.year = self.year;
        record.doi = self.doi;

        let affiliations = self.affiliations;
        record.authors = self
            .authors
            .into_iter()
            .filter_map(|draft| {
                let mut parts: Vec<&str> = draft.forenames.iter().map(String::as_str).collect();
                parts.push(&draft.surname);
                let name = clean_text(&parts.join(" "));
                if name.is_empty() {
                    return None;
                }
                let affiliation = draft.affiliation.or_else(|| {
                    draft
                        .affiliation_ref
                        .as_ref()
                        .and_then(|id| affiliations.get(id).cloned())
                });
                Some(AuthorRecord {
                    name,
                    affiliation,
                    orcid: draft.orcid,
                })
            })
            .collect();
        record.set_extra("abstract", self.abstract_text.as_deref());
        record
    }
}

/// Parse the TEI header GROBID returns into a record.
pub fn parse_tei_header(xml: &str) -> Result<SourceRecord> {
    let mut reader = Reader::from_str(xml);
    let mut state = TeiState::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => state.open(e, false),
            Ok(Event::Empty(ref e)) => state.open(e, true),
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| ScienceError::Parse(format!("invalid TEI text: {err}")))?;
                state.text(&text);
            }
            Ok(Event::CData(ref e)) => {
                state.text(&String::from_utf8_lossy(e));
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                state.close(&name);
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(ScienceError::Parse(format!(
                    "invalid TEI at byte {}: {err}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(state.into_record())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_TEI: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<TEI xml:space="preserve" xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader xml:lang="en">
    <fileDesc>
      <titleStmt>
        <title level="a" type="main">Attention Is All You Need</title>
      </titleStmt>
      <publicationStmt>
        <publisher/>
        <date type="published" when="2017-06-12">12 Jun 2017</date>
      </publicationStmt>
      <sourceDesc>
        <biblStruct>
          <analytic>
            <author>
              <persName><forename type="first">Ashish</forename><surname>Vaswani</surname></persName>
              <idno type="ORCID">https://orcid.org/0000-0002-1825-0097</idno>
              <affiliation key="aff0">
                <orgName type="department">Google Brain</orgName>
                <orgName type="institution">Google</orgName>
              </affiliation>
            </author>
            <author>
              <persName><forename type="first">Noam</forename><forename type="middle">M</forename><surname>Shazeer</surname></persName>
              <affiliation ref="#aff1"/>
            </author>
            <author><persName><surname> </surname></persName></author>
            <title level="a" type="main">Ignored Second Title</title>
          </analytic>
          <idno type="DOI">10.48550/arXiv.1706.03762</idno>
        </biblStruct>
      </sourceDesc>
    </fileDesc>
    <profileDesc>
      <abstract><div><p>The dominant sequence transduction models &amp; more.</p></div></abstract>
    </profileDesc>
  </teiHeader>
  <text>
    <affiliation xml:id="aff1"><orgName type="institution">Google Research</orgName></affiliation>
  </text>
</TEI>"##;

    #[test]
    fn parses_header_fields() {
        let record = parse_tei_header(HEADER_TEI).unwrap();
        assert_eq!(record.source, SourceKind::Grobid);
        assert_eq!(record.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(record.year, Some(2017));
        assert_eq!(record.doi.as_deref(), Some("10.48550/arXiv.1706.03762"));
        assert_eq!(
            record.extra.get("abstract").map(String::as_str),
            Some("The dominant sequence transduction models & more.")
        );
    }

    #[test]
    fn parses_authors_with_inline_and_referenced_affiliations() {
        let record = parse_tei_header(HEADER_TEI).unwrap();
        assert_eq!(record.authors.len(), 2);

        let first = &record.authors[0];
        assert_eq!(first.name, "Ashish Vaswani");
        assert_eq!(first.affiliation.as_deref(), Some("Google Brain, Google"));
        assert_eq!(first.orcid.as_deref(), Some("0000-0002-1825-0097"));

        let second = &record.authors[1];
        assert_eq!(second.name, "Noam M Shazeer");
        assert_eq!(second.affiliation.as_deref(), Some("Google Research"));
        assert_eq!(second.orcid, None);
    }

    #[test]
    fn empty_tei_gives_empty_record() {
        let record = parse_tei_header(r#"<TEI xmlns="http://www.tei-c.org/ns/1.0"><teiHeader/></TEI>"#)
            .unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn malformed_xml_is_parse_error() {
        let err = parse_tei_header("<TEI><teiHeader></TEI>").unwrap_err();
        assert!(matches!(err, ScienceError::Parse(_)));
    }
}
