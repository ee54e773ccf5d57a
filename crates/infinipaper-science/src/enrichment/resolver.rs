use std::path::{Path, PathBuf};
use std::sync::Arc;

use infinipaper_core::SourcesConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::arxiv::ArxivClient;
use crate::enrichment::merge::merge_records;
use crate::error::{Result, ScienceError};
use crate::grobid::{GrobidClient, HeaderExtractor};
use crate::http::DiskCache;
use crate::identifiers::{ArxivId, Doi, find_first_arxiv_id, find_first_doi, normalize_doi};
use crate::record::{ResolvedMetadata, SourceKind, SourceRecord};
use crate::sources::{
    CrossRefSource, ExternalSource, OpenAlexQuery, OpenAlexSource, SemanticScholarSource,
};
use crate::text::{
    DEFAULT_MAX_PAGES, LopdfTextExtractor, TextExtractor, guess_venue, title_from_filename,
    title_line_candidate,
};

/// What is known about a paper before resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveInput {
    /// Text of the first pages of the PDF, possibly empty.
    pub pdf_text: String,
    pub pdf_path: Option<PathBuf>,
    pub file_name: Option<String>,
    pub known_doi: Option<String>,
    pub known_arxiv_id: Option<String>,
}

impl ResolveInput {
    pub fn from_text(pdf_text: impl Into<String>) -> Self {
        Self {
            pdf_text: pdf_text.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentReport {
    /// Resolution stages that ran, in order.
    pub steps: Vec<String>,
    /// Providers that contributed a non-empty record.
    pub sources_used: Vec<SourceKind>,
    /// Lookups that failed, as `source: error`.
    pub errors: Vec<String>,
}

impl EnrichmentReport {
    fn step(&mut self, name: &str) {
        self.steps.push(name.to_string());
    }

    /// Turn a lookup result into a record. Failures are logged and become
    /// the empty record for that provider.
    fn settle(&mut self, kind: SourceKind, result: Result<SourceRecord>) -> SourceRecord {
        match result {
            Ok(record) => {
                if !record.is_empty() && !self.sources_used.contains(&kind) {
                    self.sources_used.push(kind);
                }
                record
            }
            Err(ScienceError::NotFound(what)) => {
                debug!(source = %kind, %what, "no record");
                SourceRecord::empty(kind)
            }
            Err(e) => {
                warn!(source = %kind, error = %e, "metadata lookup failed");
                self.errors.push(format!("{kind}: {e}"));
                SourceRecord::empty(kind)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub metadata: ResolvedMetadata,
    pub report: EnrichmentReport,
}

/// Combines the header extractor, bibliographic services and text
/// heuristics into one best-effort description of a paper.
pub struct MetadataResolver {
    crossref: CrossRefSource,
    openalex: OpenAlexSource,
    semantic_scholar: SemanticScholarSource,
    arxiv: ArxivClient,
    header_extractor: Option<Arc<dyn HeaderExtractor>>,
    text_extractor: Arc<dyn TextExtractor>,
    max_pages: usize,
}

impl MetadataResolver {
    pub fn new(
        crossref: CrossRefSource,
        openalex: OpenAlexSource,
        semantic_scholar: SemanticScholarSource,
        arxiv: ArxivClient,
    ) -> Self {
        Self {
            crossref,
            openalex,
            semantic_scholar,
            arxiv,
            header_extractor: None,
            text_extractor: Arc::new(LopdfTextExtractor),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Resolver wired to the endpoints in `config`. GROBID is used only when
    /// a non-blank URL is configured.
    pub fn from_config(config: &SourcesConfig) -> Result<Self> {
        let timeout = config.http_timeout();
        let email = config.polite_email.as_deref();

        let mut crossref = CrossRefSource::new(&config.crossref_url, email, timeout)?;
        let mut openalex = OpenAlexSource::new(&config.openalex_url, email, timeout)?;
        let mut semantic_scholar = SemanticScholarSource::new(
            &config.semantic_scholar_url,
            config.semantic_scholar_api_key.clone(),
            timeout,
        )?;
        let mut arxiv = ArxivClient::new(&config.arxiv_url, timeout)?;

        if config.cache_enabled {
            crossref = crossref.with_cache(cache_for(config, "crossref"));
            openalex = openalex.with_cache(cache_for(config, "openalex"));
            semantic_scholar = semantic_scholar.with_cache(cache_for(config, "semantic_scholar"));
            arxiv = arxiv.with_cache(cache_for(config, "arxiv"));
        }

        let mut resolver = Self::new(crossref, openalex, semantic_scholar, arxiv);
        if let Some(url) = config
            .grobid_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            resolver = resolver.with_header_extractor(Arc::new(GrobidClient::new(url, timeout)?));
        }
        Ok(resolver)
    }

    pub fn with_header_extractor(mut self, extractor: Arc<dyn HeaderExtractor>) -> Self {
        self.header_extractor = Some(extractor);
        self
    }

    pub fn with_text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.text_extractor = extractor;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Resolve metadata for one paper. Never fails: unreachable or failing
    /// providers are recorded in the report and contribute nothing.
    ///
    /// Precedence, highest first: header extractor, arXiv and Semantic
    /// Scholar, Crossref and OpenAlex by DOI, Crossref and OpenAlex by title,
    /// venue heuristics, file name.
    pub async fn resolve(&self, input: ResolveInput) -> Resolution {
        let mut report = EnrichmentReport::default();
        let mut records: Vec<SourceRecord> = Vec::new();

        if let (Some(extractor), Some(path)) = (&self.header_extractor, input.pdf_path.as_deref())
        {
            if extractor.is_available().await {
                report.step("header");
                let result = extractor.extract_header(path).await;
                records.push(report.settle(SourceKind::Grobid, result));
            } else {
                debug!(extractor = extractor.name(), "header extractor unreachable, skipping");
            }
        }

        let arxiv_id = input
            .known_arxiv_id
            .as_deref()
            .and_then(|raw| ArxivId::parse(raw).ok())
            .or_else(|| find_first_arxiv_id(&input.pdf_text));
        if let Some(id) = &arxiv_id {
            report.step("arxiv");
            let (arxiv, s2) = futures::join!(
                self.arxiv.fetch_record(id),
                self.semantic_scholar.fetch_by_arxiv_id(id)
            );
            records.push(report.settle(self.arxiv.kind(), arxiv));
            records.push(report.settle(self.semantic_scholar.kind(), s2));
        }

        let doi = input
            .known_doi
            .as_deref()
            .and_then(normalize_doi)
            .or_else(|| merge_records(&records).doi)
            .or_else(|| find_first_doi(&input.pdf_text).map(|d| d.normalized));
        if let Some(doi) = doi.as_deref() {
            match Doi::parse(doi) {
                Ok(parsed) => {
                    report.step("doi");
                    let query = OpenAlexQuery {
                        doi: Some(doi),
                        title: None,
                        arxiv_id: arxiv_id.as_ref().map(|id| id.id.as_str()),
                    };
                    let (crossref, openalex) = futures::join!(
                        self.crossref.fetch_by_doi(&parsed),
                        self.openalex.fetch(query)
                    );
                    records.push(report.settle(self.crossref.kind(), crossref));
                    records.push(report.settle(self.openalex.kind(), openalex));

                    let mut detected = SourceRecord::empty(SourceKind::TextHeuristic);
                    detected.doi = Some(parsed.normalized);
                    records.push(detected);
                }
                Err(e) => {
                    debug!(doi, error = %e, "ignoring malformed DOI");
                    report.errors.push(format!("doi: {e}"));
                }
            }
        }

        let merged = merge_records(&records);
        if merged.doi.is_none() {
            let title = merged
                .title
                .clone()
                .or_else(|| title_line_candidate(&input.pdf_text))
                .or_else(|| input.file_name.as_deref().and_then(title_from_filename));
            if let Some(title) = title {
                report.step("title_search");
                let (crossref, openalex) = futures::join!(
                    self.crossref.fetch_by_title(&title),
                    self.openalex.fetch(OpenAlexQuery::by_title(&title))
                );
                records.push(report.settle(self.crossref.kind(), crossref));
                records.push(report.settle(self.openalex.kind(), openalex));
            }
        }

        let merged = merge_records(&records);
        if merged.venue.is_none()
            && let Some(venue) = guess_venue(&input.pdf_text)
        {
            report.step("venue_heuristic");
            let mut guess = SourceRecord::empty(SourceKind::TextHeuristic);
            guess.venue = Some(venue);
            records.push(guess);
        }
        if merged.title.is_none()
            && let Some(title) = input.file_name.as_deref().and_then(title_from_filename)
        {
            report.step("filename_title");
            let mut fallback = SourceRecord::empty(SourceKind::Filename);
            fallback.title = Some(title);
            records.push(fallback);
            if !report.sources_used.contains(&SourceKind::Filename) {
                report.sources_used.push(SourceKind::Filename);
            }
        }

        let metadata = merge_records(&records);
        info!(
            title = ?metadata.title,
            doi = ?metadata.doi,
            sources = ?report.sources_used,
            errors = report.errors.len(),
            "metadata resolved"
        );
        Resolution { metadata, report }
    }

    /// Extract text from the PDF at `path`, then [`resolve`](Self::resolve).
    /// An unreadable PDF resolves from an empty text.
    pub async fn resolve_file(
        &self,
        path: &Path,
        known_doi: Option<String>,
        known_arxiv_id: Option<String>,
    ) -> Resolution {
        let extractor = Arc::clone(&self.text_extractor);
        let owned = path.to_path_buf();
        let max_pages = self.max_pages;
        let extracted =
            tokio::task::spawn_blocking(move || extractor.extract_first_pages(&owned, max_pages))
                .await;

        let mut extraction_error = None;
        let pdf_text = match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "text extraction failed");
                extraction_error = Some(format!("text: {e}"));
                String::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "text extraction task failed");
                extraction_error = Some(format!("text: {e}"));
                String::new()
            }
        };

        let input = ResolveInput {
            pdf_text,
            pdf_path: Some(path.to_path_buf()),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            known_doi,
            known_arxiv_id,
        };
        let mut resolution = self.resolve(input).await;
        if let Some(err) = extraction_error {
            resolution.report.errors.insert(0, err);
        }
        resolution
    }
}

fn cache_for(config: &SourcesConfig, namespace: &str) -> DiskCache {
    match config.cache_dir.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(dir) => DiskCache::in_dir(Path::new(dir).join(namespace), config.cache_ttl()),
        None => DiskCache::new(namespace, config.cache_ttl()),
    }
}
