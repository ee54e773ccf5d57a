use once_cell::sync::Lazy;
use regex::Regex;

use crate::identifiers::{arxiv::ArxivId, doi::Doi};

static DOI_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b10\.\d{4,9}/[-._;()/:A-Z0-9]+").expect("valid regex"));

static ARXIV_REGEX_NEW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\barxiv:\s*(\d{4}\.\d{4,5}(?:v\d+)?)").expect("valid regex")
});

static ARXIV_REGEX_OLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\barxiv:\s*([a-z\-]+(?:\.[A-Z]{2})?/\d{7}(?:v\d+)?)").expect("valid regex")
});

/// Every DOI in `text`, normalized, in order of appearance, without repeats.
pub fn extract_dois_from_text(text: &str) -> Vec<Doi> {
    let mut dois: Vec<Doi> = Vec::new();
    for m in DOI_REGEX.find_iter(text) {
        if let Ok(doi) = Doi::parse(m.as_str())
            && !dois.iter().any(|seen| seen.same_as(&doi))
        {
            dois.push(doi);
        }
    }
    dois
}

/// The first DOI-shaped string in `text`, normalized.
pub fn find_first_doi(text: &str) -> Option<Doi> {
    DOI_REGEX
        .find_iter(text)
        .find_map(|m| Doi::parse(m.as_str()).ok())
}

/// arXiv identifiers written with an explicit `arXiv:` prefix, in order of
/// appearance. Bare numbers are ignored since page text is full of them.
pub fn extract_arxiv_ids_from_text(text: &str) -> Vec<ArxivId> {
    let mut found: Vec<(usize, ArxivId)> = ARXIV_REGEX_NEW
        .captures_iter(text)
        .chain(ARXIV_REGEX_OLD.captures_iter(text))
        .filter_map(|caps| {
            let m = caps.get(1)?;
            ArxivId::parse(m.as_str()).ok().map(|id| (m.start(), id))
        })
        .collect();

    found.sort_by_key(|(pos, _)| *pos);
    let mut ids: Vec<ArxivId> = Vec::new();
    for (_, id) in found {
        if !ids.iter().any(|seen| seen.id == id.id) {
            ids.push(id);
        }
    }
    ids
}

pub fn find_first_arxiv_id(text: &str) -> Option<ArxivId> {
    extract_arxiv_ids_from_text(text).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_doi_and_cleans_it() {
        let text = "Published in ACM. DOI: 10.1145/3373376.3378495ABCDxyz more text 10.1000/other";
        let doi = find_first_doi(text).unwrap();
        assert_eq!(doi.normalized, "10.1145/3373376.3378495");
    }

    #[test]
    fn doi_regex_is_case_insensitive() {
        let doi = find_first_doi("see https://doi.org/10.48550/ARXIV.1706.03762.").unwrap();
        assert_eq!(doi.normalized, "10.48550/ARXIV.1706.03762");
    }

    #[test]
    fn extract_dois_deduplicates_case_insensitively() {
        let text = "10.1000/ABC and again 10.1000/abc, then 10.1000/def";
        let dois = extract_dois_from_text(text);
        let values: Vec<_> = dois.iter().map(|d| d.normalized.as_str()).collect();
        assert_eq!(values, vec!["10.1000/ABC", "10.1000/def"]);
    }

    #[test]
    fn no_doi_in_plain_text() {
        assert!(find_first_doi("A paper about 10 things.").is_none());
    }

    #[test]
    fn arxiv_ids_need_prefix() {
        let text = "Preprint arXiv:1706.03762v5 [cs.CL]; also arXiv: hep-th/9901001 and 1801.00001";
        let ids = extract_arxiv_ids_from_text(text);
        let values: Vec<_> = ids.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(values, vec!["1706.03762", "hep-th/9901001"]);
        assert_eq!(ids[0].version, Some(5));
    }
}
