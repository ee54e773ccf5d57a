use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::error::{Result, ScienceError};
use crate::grobid::HeaderExtractor;
use crate::grobid::tei::parse_tei_header;
use crate::http::{RateLimitedClient, USER_AGENT};
use crate::record::SourceRecord;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8070";

pub struct GrobidClient {
    client: RateLimitedClient,
    base_url: String,
}

impl GrobidClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::new(USER_AGENT, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_reachable(&self) -> bool {
        self.client
            .probe(&format!("{}/api/isalive", self.base_url))
            .await
    }

    /// Upload the PDF and return GROBID's TEI header document.
    pub async fn process_header(&self, pdf_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(pdf_path).await.map_err(|e| {
            ScienceError::PdfExtraction(format!("cannot read {}: {e}", pdf_path.display()))
        })?;
        let file_name = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")?;
        let form = Form::new().part("input", part);

        let url = format!("{}/api/processHeaderDocument", self.base_url);
        debug!(url = %url, path = %pdf_path.display(), "sending PDF to GROBID");
        self.client.post_multipart(&url, form).await
    }
}

#[async_trait]
impl HeaderExtractor for GrobidClient {
    fn name(&self) -> &'static str {
        "grobid"
    }

    async fn is_available(&self) -> bool {
        self.is_reachable().await
    }

    async fn extract_header(&self, pdf_path: &Path) -> Result<SourceRecord> {
        let tei = self.process_header(pdf_path).await?;
        parse_tei_header(&tei)
    }
}
