use std::path::Path;

use lopdf::Document;

use crate::error::{Result, ScienceError};

pub mod heuristics;

pub use heuristics::{guess_venue, title_from_filename, title_line_candidate};

/// Pages read from the front of a PDF before resolving it.
pub const DEFAULT_MAX_PAGES: usize = 5;

/// Plain-text extraction from the first pages of a PDF. Implementations
/// block and are run on the blocking thread pool.
pub trait TextExtractor: Send + Sync {
    fn extract_first_pages(&self, pdf_path: &Path, max_pages: usize) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfTextExtractor;

impl TextExtractor for LopdfTextExtractor {
    fn extract_first_pages(&self, pdf_path: &Path, max_pages: usize) -> Result<String> {
        if max_pages == 0 {
            return Ok(String::new());
        }

        let document = Document::load(pdf_path).map_err(|err| {
            ScienceError::PdfExtraction(format!(
                "lopdf failed to open {}: {err}",
                pdf_path.display()
            ))
        })?;
        let page_numbers = document
            .get_pages()
            .keys()
            .copied()
            .take(max_pages)
            .collect::<Vec<u32>>();
        if page_numbers.is_empty() {
            return Ok(String::new());
        }

        document.extract_text(&page_numbers).map_err(|err| {
            ScienceError::PdfExtraction(format!(
                "lopdf failed to extract text from {}: {err}",
                pdf_path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn zero_pages_is_empty() {
        let text = LopdfTextExtractor
            .extract_first_pages(Path::new("/nonexistent.pdf"), 0)
            .unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn non_pdf_is_extraction_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, "just some text, not a PDF").unwrap();

        let err = LopdfTextExtractor
            .extract_first_pages(&path, DEFAULT_MAX_PAGES)
            .unwrap_err();
        assert!(matches!(err, ScienceError::PdfExtraction(_)));
    }
}
