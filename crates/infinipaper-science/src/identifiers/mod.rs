pub mod arxiv;
pub mod doi;
pub mod extract;

pub use arxiv::ArxivId;
pub use doi::{Doi, normalize_doi};
pub use extract::{
    extract_arxiv_ids_from_text, extract_dois_from_text, find_first_arxiv_id, find_first_doi,
};
