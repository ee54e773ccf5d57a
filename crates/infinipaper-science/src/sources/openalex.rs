use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ScienceError};
use crate::http::{DiskCache, RateLimitedClient};
use crate::identifiers::doi::normalize_doi;
use crate::record::{AuthorRecord, SourceKind, SourceRecord, non_blank, strip_orcid};
use crate::sources::{
    ExternalSource, endpoint, endpoint_with_tail, parse_json, polite_user_agent, str_field,
    year_field,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openalex.org";

/// Lookup keys for [`OpenAlexSource::fetch`], tried in the order arXiv id,
/// DOI, title.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAlexQuery<'a> {
    pub doi: Option<&'a str>,
    pub title: Option<&'a str>,
    pub arxiv_id: Option<&'a str>,
}

impl<'a> OpenAlexQuery<'a> {
    pub fn by_doi(doi: &'a str) -> Self {
        Self {
            doi: Some(doi),
            ..Default::default()
        }
    }

    pub fn by_title(title: &'a str) -> Self {
        Self {
            title: Some(title),
            ..Default::default()
        }
    }

    fn cache_key(&self) -> String {
        format!(
            "arxiv:{}|doi:{}|title:{}",
            self.arxiv_id.unwrap_or_default(),
            self.doi.unwrap_or_default().to_lowercase(),
            self.title.unwrap_or_default().trim().to_lowercase()
        )
    }
}

pub struct OpenAlexSource {
    client: RateLimitedClient,
    cache: Option<DiskCache>,
    base_url: String,
}

impl OpenAlexSource {
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

    /// First hit among the available keys. A 404 on one key moves on to the
    /// next; other failures are returned.
    pub async fn fetch(&self, query: OpenAlexQuery<'_>) -> Result<SourceRecord> {
        let key = query.cache_key();
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get::<SourceRecord>(&key).await
        {
            return Ok(cached);
        }

        let record = self.lookup(query).await?;
        if let Some(cache) = &self.cache
            && !record.is_empty()
        {
            cache.set(&key, &record).await;
        }
        Ok(record)
    }

    async fn lookup(&self, query: OpenAlexQuery<'_>) -> Result<SourceRecord> {
        if let Some(id) = query.arxiv_id.map(str::trim).filter(|s| !s.is_empty()) {
            let tail = format!("doi:10.48550/arXiv.{id}");
            let url = endpoint_with_tail(&self.base_url, "works", &tail)?;
            if let Some(work) = self.get_work(url).await? {
                return Ok(record_from_work(&work));
            }
        }

        if let Some(doi) = query.doi.and_then(normalize_doi) {
            let tail = format!("https://doi.org/{doi}");
            let url = endpoint_with_tail(&self.base_url, "works", &tail)?;
            if let Some(work) = self.get_work(url).await? {
                return Ok(record_from_work(&work));
            }
        }

        if let Some(title) = query.title.map(str::trim).filter(|s| !s.is_empty()) {
            return self.search_title(title).await;
        }

        Ok(SourceRecord::empty(SourceKind::OpenAlex))
    }

    async fn get_work(&self, url: Url) -> Result<Option<Value>> {
        match self.client.get(url.as_str()).await {
            Ok(body) => parse_json(&body).map(Some),
            Err(ScienceError::NotFound(_)) => {
                debug!(url = %url, "openalex work not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn search_title(&self, title: &str) -> Result<SourceRecord> {
        let mut url = endpoint(&self.base_url, "works")?;
        url.query_pairs_mut()
            .append_pair("search", title)
            .append_pair("per-page", "1");

        let body = self.client.get(url.as_str()).await?;
        let json = parse_json(&body)?;
        Ok(json
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .map(record_from_work)
            .unwrap_or_else(|| SourceRecord::empty(SourceKind::OpenAlex)))
    }
}

impl ExternalSource for OpenAlexSource {
    fn kind(&self) -> SourceKind {
        SourceKind::OpenAlex
    }
}

/// Map an OpenAlex `work` object to a record.
pub fn record_from_work(v: &Value) -> SourceRecord {
    let mut record = SourceRecord::empty(SourceKind::OpenAlex);
    if !v.is_object() {
        return record;
    }

    let primary = v.get("primary_location").filter(|p| p.is_object());

    record.title = non_blank(str_field(v, "title").or_else(|| str_field(v, "display_name")));
    record.year = year_field(v, "publication_year");
    record.url = primary.and_then(|p| non_blank(str_field(p, "landing_page_url")));
    record.open_access_pdf_url = primary
        .and_then(|p| non_blank(str_field(p, "pdf_url")))
        .or_else(|| v.get("open_access").and_then(|oa| non_blank(str_field(oa, "oa_url"))));
    record.venue = primary
        .and_then(|p| p.get("source"))
        .and_then(|s| non_blank(str_field(s, "display_name")));
    record.doi = v
        .get("ids")
        .and_then(|ids| str_field(ids, "doi"))
        .or_else(|| str_field(v, "doi"))
        .and_then(normalize_doi);
    record.authors = v
        .get("authorships")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_authorship).collect())
        .unwrap_or_default();
    record.cited_by_count = v.get("cited_by_count").and_then(Value::as_u64);
    record.set_extra("openalex_id", str_field(v, "id"));
    record.set_extra(
        "abstract",
        v.get("abstract_inverted_index")
            .and_then(reconstruct_abstract)
            .as_deref(),
    );
    record
}

fn parse_authorship(a: &Value) -> Option<AuthorRecord> {
    let author = a.get("author")?;
    let name = non_blank(str_field(author, "display_name"))?;
    let affiliation = a
        .get("institutions")
        .and_then(Value::as_array)
        .and_then(|insts| insts.first())
        .and_then(|inst| non_blank(str_field(inst, "display_name")));
    let orcid = str_field(author, "orcid").and_then(strip_orcid);
    Some(AuthorRecord {
        name,
        affiliation,
        orcid,
    })
}

/// Rebuild abstract text from OpenAlex's `word -> [positions]` index.
fn reconstruct_abstract(index: &Value) -> Option<String> {
    let obj = index.as_object()?;
    let mut placed: Vec<(u64, &str)> = obj
        .iter()
        .flat_map(|(word, positions)| {
            positions
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_u64)
                .map(move |pos| (pos, word.as_str()))
        })
        .collect();
    placed.sort_by_key(|(pos, _)| *pos);
    placed.dedup_by_key(|(pos, _)| *pos);

    let text = placed
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::DEFAULT_TIMEOUT;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const WORK: &str = r#"{
        "id": "https://openalex.org/W2963403868",
        "title": "Attention Is All You Need",
        "publication_year": 2017,
        "ids": {"doi": "https://doi.org/10.48550/arXiv.1706.03762"},
        "primary_location": {
            "landing_page_url": "https://arxiv.org/abs/1706.03762",
            "pdf_url": null,
            "source": {"display_name": "arXiv (Cornell University)"}
        },
        "open_access": {"oa_url": "https://arxiv.org/pdf/1706.03762"},
        "authorships": [
            {"author": {"display_name": "Ashish Vaswani", "orcid": "https://orcid.org/0000-0000-0000-0001"},
             "institutions": [{"display_name": "Google Brain"}]},
            {"author": {"display_name": "Noam Shazeer"}, "institutions": []}
        ],
        "cited_by_count": 90000,
        "abstract_inverted_index": {"The": [0], "dominant": [1], "models": [2]}
    }"#;

    fn source(base_url: &str) -> OpenAlexSource {
        OpenAlexSource::new(base_url, None, DEFAULT_TIMEOUT).unwrap()
    }

    #[test]
    fn reconstruct_abstract_from_inverted_index() {
        let index = json!({"attention": [0], "is": [1], "all": [2, 5], "you": [3], "need": [4]});
        assert_eq!(
            reconstruct_abstract(&index).as_deref(),
            Some("attention is all you need all")
        );
        assert_eq!(reconstruct_abstract(&json!({})), None);
    }

    #[test]
    fn maps_work_fields() {
        let v: Value = serde_json::from_str(WORK).unwrap();
        let record = record_from_work(&v);
        assert_eq!(record.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(record.year, Some(2017));
        assert_eq!(record.doi.as_deref(), Some("10.48550/arXiv.1706.03762"));
        assert_eq!(record.url.as_deref(), Some("https://arxiv.org/abs/1706.03762"));
        assert_eq!(
            record.open_access_pdf_url.as_deref(),
            Some("https://arxiv.org/pdf/1706.03762")
        );
        assert_eq!(record.venue.as_deref(), Some("arXiv (Cornell University)"));
        assert_eq!(record.authors[0].affiliation.as_deref(), Some("Google Brain"));
        assert_eq!(record.authors[0].orcid.as_deref(), Some("0000-0000-0000-0001"));
        assert_eq!(record.authors[1].affiliation, None);
        assert_eq!(record.cited_by_count, Some(90000));
        assert_eq!(record.extra["openalex_id"], "https://openalex.org/W2963403868");
        assert_eq!(record.extra["abstract"], "The dominant models");
    }

    #[tokio::test]
    async fn fetch_by_doi() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works/https://doi.org/10.48550/arXiv.1706.03762")
            .with_status(200)
            .with_body(WORK)
            .create_async()
            .await;

        let record = source(&server.url())
            .fetch(OpenAlexQuery::by_doi("doi:10.48550/arXiv.1706.03762"))
            .await
            .unwrap();
        assert_eq!(record.source, SourceKind::OpenAlex);
        assert_eq!(record.year, Some(2017));
    }

    #[tokio::test]
    async fn missing_doi_falls_through_to_title_search() {
        let mut server = Server::new_async().await;
        let _missing = server
            .mock("GET", "/works/https://doi.org/10.1000/unknown")
            .with_status(404)
            .create_async()
            .await;
        let _search = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search".into(), "Attention Is All You Need".into()),
                Matcher::UrlEncoded("per-page".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(format!(r#"{{"results": [{WORK}]}}"#))
            .create_async()
            .await;

        let query = OpenAlexQuery {
            doi: Some("10.1000/unknown"),
            title: Some("Attention Is All You Need"),
            arxiv_id: None,
        };
        let record = source(&server.url()).fetch(query).await.unwrap();
        assert_eq!(record.title.as_deref(), Some("Attention Is All You Need"));
    }

    #[tokio::test]
    async fn arxiv_key_is_tried_first() {
        let mut server = Server::new_async().await;
        let arxiv = server
            .mock("GET", "/works/doi:10.48550/arXiv.1706.03762")
            .with_status(200)
            .with_body(WORK)
            .expect(1)
            .create_async()
            .await;

        let query = OpenAlexQuery {
            doi: Some("10.1000/never-requested"),
            title: None,
            arxiv_id: Some("1706.03762"),
        };
        let record = source(&server.url()).fetch(query).await.unwrap();
        assert_eq!(record.cited_by_count, Some(90000));
        arxiv.assert_async().await;
    }

    #[tokio::test]
    async fn empty_results_give_empty_record() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"results": []}"#)
            .create_async()
            .await;

        let record = source(&server.url())
            .fetch(OpenAlexQuery::by_title("No Such Paper Exists"))
            .await
            .unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn server_error_is_returned() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works/https://doi.org/10.1000/x")
            .with_status(500)
            .create_async()
            .await;

        let err = source(&server.url())
            .fetch(OpenAlexQuery::by_doi("10.1000/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::ApiError(..)));
    }
}
