use std::time::Duration;

use reqwest::Url;

use crate::arxiv::parser::parse_atom_response;
use crate::arxiv::types::ArxivEntry;
use crate::error::{Result, ScienceError};
use crate::http::{DiskCache, RateLimitedClient, USER_AGENT};
use crate::identifiers::arxiv::ArxivId;
use crate::record::{SourceKind, SourceRecord};
use crate::sources::ExternalSource;

pub const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/api/query";

pub struct ArxivClient {
    client: RateLimitedClient,
    cache: Option<DiskCache>,
    base_url: String,
}

impl ArxivClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::new(USER_AGENT, timeout)?
                .with_min_interval(Duration::from_secs(3)),
            cache: None,
            base_url: base_url.to_string(),
        })
    }

    pub fn with_cache(mut self, cache: DiskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn fetch_entry(&self, id: &ArxivId) -> Result<ArxivEntry> {
        let key = format!("entry:{}", id.id);
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get::<ArxivEntry>(&key).await
        {
            return Ok(cached);
        }

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ScienceError::Parse(format!("invalid URL {}: {e}", self.base_url)))?;
        url.query_pairs_mut()
            .append_pair("search_query", &format!("id:{}", id.id))
            .append_pair("max_results", "1");

        let xml = self.client.get(url.as_str()).await?;
        let entry = parse_atom_response(&xml)?
            .into_iter()
            .next()
            .ok_or_else(|| ScienceError::NotFound(format!("arXiv:{}", id.id)))?;

        if let Some(cache) = &self.cache {
            cache.set(&key, &entry).await;
        }
        Ok(entry)
    }

    pub async fn fetch_record(&self, id: &ArxivId) -> Result<SourceRecord> {
        self.fetch_entry(id).await.map(ArxivEntry::into_record)
    }
}

impl ExternalSource for ArxivClient {
    fn kind(&self) -> SourceKind {
        SourceKind::ArxivApi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::DEFAULT_TIMEOUT;
    use mockito::{Matcher, Server};

    fn client(base_url: &str) -> ArxivClient {
        let mut client = ArxivClient::new(base_url, DEFAULT_TIMEOUT).unwrap();
        client.client = RateLimitedClient::new(USER_AGENT, DEFAULT_TIMEOUT).unwrap();
        client
    }

    #[tokio::test]
    async fn fetch_record_by_id() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search_query".into(), "id:1706.03762".into()),
                Matcher::UrlEncoded("max_results".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/atom+xml")
            .with_body(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v5</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All You Need</title>
    <summary>Abstract</summary>
    <author><name>Ashish Vaswani</name></author>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CL"/>
    <category term="cs.CL"/>
  </entry>
</feed>"#,
            )
            .create_async()
            .await;

        let id = ArxivId::parse("1706.03762").unwrap();
        let record = client(&format!("{}/query", server.url()))
            .fetch_record(&id)
            .await
            .unwrap();

        assert_eq!(record.source, SourceKind::ArxivApi);
        assert_eq!(record.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(record.year, Some(2017));
        assert_eq!(
            record.open_access_pdf_url.as_deref(),
            Some("https://arxiv.org/pdf/1706.03762")
        );
        assert_eq!(record.authors[0].name, "Ashish Vaswani");
    }

    #[tokio::test]
    async fn empty_feed_is_not_found() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#)
            .create_async()
            .await;

        let id = ArxivId::parse("2401.99999").unwrap();
        let err = client(&format!("{}/query", server.url()))
            .fetch_record(&id)
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::NotFound(_)));
    }
}
