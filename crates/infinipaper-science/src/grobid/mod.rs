use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::SourceRecord;

pub mod client;
pub mod tei;

pub use client::GrobidClient;
pub use tei::parse_tei_header;

/// Service that reads title, authors and identifiers from a PDF's first page.
#[async_trait]
pub trait HeaderExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn is_available(&self) -> bool;

    async fn extract_header(&self, pdf_path: &Path) -> Result<SourceRecord>;
}
