use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::http::{DiskCache, RateLimitedClient};
use crate::identifiers::doi::{Doi, normalize_doi};
use crate::record::{AuthorRecord, SourceKind, SourceRecord, non_blank, strip_orcid};
use crate::sources::{
    ExternalSource, endpoint, endpoint_with_tail, first_str, parse_json, polite_user_agent,
    str_field,
};

pub const DEFAULT_BASE_URL: &str = "https://api.crossref.org";
const TITLE_ROWS: u32 = 3;

pub struct CrossRefSource {
    client: RateLimitedClient,
    cache: Option<DiskCache>,
    base_url: String,
}

impl CrossRefSource {
    pub fn new(base_url: &str, polite_email: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = RateLimitedClient::new(&polite_user_agent(polite_email), timeout)?
            .with_min_interval(Duration::from_millis(100));
        Ok(Self {
            client,
            cache: None,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_cache(mut self, cache: DiskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn fetch_by_doi(&self, doi: &Doi) -> Result<SourceRecord> {
        let key = format!("doi:{}", doi.key());
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get::<SourceRecord>(&key).await
        {
            return Ok(cached);
        }

        let url = endpoint_with_tail(&self.base_url, "works", &doi.normalized)?;
        let body = self.client.get(url.as_str()).await?;
        let val = parse_json(&body)?;
        let record = record_from_work(&val["message"]);

        if let Some(cache) = &self.cache
            && !record.is_empty()
        {
            cache.set(&key, &record).await;
        }
        Ok(record)
    }

    /// Bibliographic title search. Of the top results, the first whose title
    /// overlaps `title` wins, otherwise the top result is taken.
    pub async fn fetch_by_title(&self, title: &str) -> Result<SourceRecord> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(SourceRecord::empty(SourceKind::CrossRef));
        }

        let mut url = endpoint(&self.base_url, "works")?;
        url.query_pairs_mut()
            .append_pair("query.title", title)
            .append_pair("rows", &TITLE_ROWS.to_string());

        let body = self.client.get(url.as_str()).await?;
        let val = parse_json(&body)?;
        let Some(items) = val["message"]["items"].as_array().filter(|i| !i.is_empty()) else {
            debug!(title, "crossref title search returned no items");
            return Ok(SourceRecord::empty(SourceKind::CrossRef));
        };

        let chosen = items
            .iter()
            .find(|item| first_str(item, "title").is_some_and(|t| titles_overlap(title, t)))
            .unwrap_or(&items[0]);
        Ok(record_from_work(chosen))
    }
}

impl ExternalSource for CrossRefSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CrossRef
    }
}

/// Map a Crossref `work` object to a record.
pub fn record_from_work(v: &Value) -> SourceRecord {
    let mut record = SourceRecord::empty(SourceKind::CrossRef);
    if !v.is_object() {
        return record;
    }

    record.title = non_blank(first_str(v, "title"));
    record.venue = non_blank(first_str(v, "container-title"));
    record.year = parse_year(v);
    record.doi = str_field(v, "DOI").and_then(normalize_doi);
    record.url = non_blank(str_field(v, "URL"));
    record.authors = v
        .get("author")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_author).collect())
        .unwrap_or_default();
    record.cited_by_count = v.get("is-referenced-by-count").and_then(Value::as_u64);
    record.set_extra("abstract", str_field(v, "abstract"));
    record.set_extra("publisher", str_field(v, "publisher"));
    record.set_extra("type", str_field(v, "type"));
    record
}

fn parse_author(a: &Value) -> Option<AuthorRecord> {
    let given = str_field(a, "given").unwrap_or_default().trim();
    let family = str_field(a, "family").unwrap_or_default().trim();
    let joined = format!("{given} {family}");
    let name = non_blank(Some(joined.as_str())).or_else(|| non_blank(str_field(a, "name")))?;

    let affiliation = a
        .get("affiliation")
        .and_then(Value::as_array)
        .and_then(|affs| affs.first())
        .and_then(|aff| non_blank(str_field(aff, "name")));
    let orcid = str_field(a, "ORCID").and_then(strip_orcid);

    Some(AuthorRecord {
        name,
        affiliation,
        orcid,
    })
}

fn parse_year(v: &Value) -> Option<i32> {
    ["issued", "published-print", "published-online", "created"]
        .iter()
        .find_map(|key| {
            v[key]["date-parts"][0][0]
                .as_i64()
                .and_then(|y| i32::try_from(y).ok())
                .filter(|y| *y > 0)
        })
}

/// Substring either way, or enough shared words.
fn titles_overlap(query: &str, candidate: &str) -> bool {
    let q = query.to_lowercase();
    let c = candidate.to_lowercase();
    if q.contains(&c) || c.contains(&q) {
        return true;
    }

    let q_words: Vec<&str> = q.split_whitespace().collect();
    let c_words: Vec<&str> = c.split_whitespace().collect();
    let shared = q_words.iter().filter(|w| c_words.contains(*w)).count();
    let needed = (q_words.len().min(c_words.len()) / 2).max(2);
    shared >= needed
}
