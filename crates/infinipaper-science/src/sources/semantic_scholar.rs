use std::time::Duration;

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::http::{DiskCache, RateLimitedClient};
use crate::identifiers::{arxiv::ArxivId, doi::normalize_doi};
use crate::record::{AuthorRecord, SourceKind, SourceRecord, non_blank};
use crate::sources::{ExternalSource, parse_json, polite_user_agent, str_field, year_field};

pub const DEFAULT_BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const PAPER_FIELDS: &str =
    "title,year,venue,authors,externalIds,citationCount,openAccessPdf,url,abstract";
const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

pub struct SemanticScholarSource {
    client: RateLimitedClient,
    cache: Option<DiskCache>,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        // The public pool allows roughly one request per second without a key.
        let interval = if api_key.is_some() {
            Duration::from_millis(100)
        } else {
            Duration::from_secs(1)
        };
        let client =
            RateLimitedClient::new(&polite_user_agent(None), timeout)?.with_min_interval(interval);
        Ok(Self {
            client,
            cache: None,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn with_cache(mut self, cache: DiskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn fetch_by_arxiv_id(&self, arxiv_id: &ArxivId) -> Result<SourceRecord> {
        let cache_key = format!("arxiv:{}", arxiv_id.id);
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get::<SourceRecord>(&cache_key).await
        {
            return Ok(cached);
        }

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ScienceError::Parse(format!("invalid URL {}: {e}", self.base_url)))?;
        {
            let mut segs = url.path_segments_mut().map_err(|_| {
                ScienceError::Parse("invalid Semantic Scholar base URL".to_string())
            })?;
            segs.push("paper");
            segs.push(&format!("arXiv:{}", arxiv_id.id));
        }
        url.query_pairs_mut().append_pair("fields", PAPER_FIELDS);

        let body = self
            .client
            .get_with_headers(url.as_str(), self.auth_headers()?)
            .await?;
        let record = record_from_paper(&parse_json(&body)?);

        if let Some(cache) = &self.cache
            && !record.is_empty()
        {
            cache.set(&cache_key, &record).await;
        }
        Ok(record)
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let value =
                HeaderValue::from_str(key).map_err(|e| ScienceError::Parse(e.to_string()))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }
}

impl ExternalSource for SemanticScholarSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SemanticScholar
    }
}

pub fn record_from_paper(v: &Value) -> SourceRecord {
    let mut record = SourceRecord::empty(SourceKind::SemanticScholar);
    if !v.is_object() {
        return record;
    }

    let external_ids = v.get("externalIds");

    record.title = non_blank(str_field(v, "title"));
    record.year = year_field(v, "year");
    record.venue = non_blank(str_field(v, "venue"));
    record.doi = external_ids
        .and_then(|ids| str_field(ids, "DOI"))
        .and_then(normalize_doi);
    record.url = non_blank(str_field(v, "url"));
    record.open_access_pdf_url = v
        .get("openAccessPdf")
        .and_then(|pdf| non_blank(str_field(pdf, "url")));
    record.authors = v
        .get("authors")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|a| non_blank(str_field(a, "name")))
                .map(AuthorRecord::new)
                .collect()
        })
        .unwrap_or_default();
    record.cited_by_count = v.get("citationCount").and_then(Value::as_u64);
    record.set_extra("abstract", str_field(v, "abstract"));
    record.set_extra("s2_paper_id", str_field(v, "paperId"));
    record.set_extra("arxiv_id", external_ids.and_then(|ids| str_field(ids, "ArXiv")));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::DEFAULT_TIMEOUT;
    use mockito::{Matcher, Server};

    const PAPER: &str = r#"{
        "paperId": "204e3073870fae3d05bcbc2f6a8e263d9b72e776",
        "title": "Attention is All you Need",
        "year": 2017,
        "venue": "Neural Information Processing Systems",
        "url": "https://www.semanticscholar.org/paper/204e3073870fae3d05bcbc2f6a8e263d9b72e776",
        "externalIds": {"ArXiv": "1706.03762", "DBLP": "conf/nips/VaswaniSPUJGKP17"},
        "citationCount": 100000,
        "openAccessPdf": {"url": "https://arxiv.org/pdf/1706.03762", "status": "GREEN"},
        "abstract": "The dominant sequence transduction models...",
        "authors": [{"authorId": "40348417", "name": "Ashish Vaswani"}, {"authorId": "1", "name": " "}]
    }"#;

    #[test]
    fn maps_paper_fields() {
        let record = record_from_paper(&serde_json::from_str(PAPER).unwrap());
        assert_eq!(record.title.as_deref(), Some("Attention is All you Need"));
        assert_eq!(record.venue.as_deref(), Some("Neural Information Processing Systems"));
        assert_eq!(record.doi, None);
        assert_eq!(record.authors, vec![AuthorRecord::new("Ashish Vaswani")]);
        assert_eq!(record.cited_by_count, Some(100000));
        assert_eq!(
            record.open_access_pdf_url.as_deref(),
            Some("https://arxiv.org/pdf/1706.03762")
        );
        assert_eq!(record.extra["arxiv_id"], "1706.03762");
        assert!(record.extra.contains_key("abstract"));
    }

    #[tokio::test]
    async fn fetch_by_arxiv_id_sends_fields_and_key() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/paper/arXiv:1706.03762")
            .match_query(Matcher::UrlEncoded("fields".into(), PAPER_FIELDS.into()))
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_body(PAPER)
            .create_async()
            .await;

        let source =
            SemanticScholarSource::new(&server.url(), Some("secret".into()), DEFAULT_TIMEOUT)
                .unwrap();
        let id = ArxivId::parse("arXiv:1706.03762v5").unwrap();
        let record = source.fetch_by_arxiv_id(&id).await.unwrap();

        m.assert_async().await;
        assert_eq!(record.source, SourceKind::SemanticScholar);
        assert_eq!(record.year, Some(2017));
    }

    #[tokio::test]
    async fn unknown_paper_is_not_found() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/paper/arXiv:2401.00001")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": "Paper not found"}"#)
            .create_async()
            .await;

        let source = SemanticScholarSource::new(&server.url(), None, DEFAULT_TIMEOUT).unwrap();
        let id = ArxivId::parse("2401.00001").unwrap();
        let err = source.fetch_by_arxiv_id(&id).await.unwrap_err();
        assert!(matches!(err, ScienceError::NotFound(_)));
    }
}
