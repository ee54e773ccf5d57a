use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

const TITLE_SCAN_LINES: usize = 15;

static VENUE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)Proceedings of the ([^\n,]+)",
        r"(?i)In Proceedings of the ([^\n,]+)",
        r"(?i)International Conference on ([^\n,]+)",
        r"(?i)ACM SIGPLAN ([^\n,]+)",
        r"(?i)IEEE/ACM ([^\n,]+)",
        r"(?i)ACM ([^\n]+) Conference",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static LEADING_PROCEEDINGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:In )?Proceedings of the ").expect("valid regex"));

static SEPARATOR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\-]+").expect("valid regex"));

/// First plausible title line among the first non-blank lines of `text`:
/// longer than 8 characters, at least three words, not the abstract heading.
pub fn title_line_candidate(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(TITLE_SCAN_LINES)
        .find(|line| {
            line.chars().count() > 8
                && line.split_whitespace().count() >= 3
                && !line.to_lowercase().starts_with("abstract")
        })
        .map(ToOwned::to_owned)
}

/// Venue named in running text, e.g. "Proceedings of the 2020 ACM Conference".
pub fn guess_venue(text: &str) -> Option<String> {
    VENUE_PATTERNS.iter().find_map(|pattern| {
        let matched = pattern.find(text)?.as_str();
        let venue = LEADING_PROCEEDINGS.replace(matched, "Proceedings of the ");
        let venue = venue.trim();
        (!venue.is_empty()).then(|| venue.to_string())
    })
}

/// Title derived from a file name: extension dropped, `_`/`-` runs become
/// spaces, whitespace collapsed.
pub fn title_from_filename(file_name: &str) -> Option<String> {
    let stem = Path::new(file_name).file_stem()?.to_string_lossy();
    let spaced = SEPARATOR_RUN.replace_all(&stem, " ");
    let title = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_line_skips_short_and_abstract_lines() {
        let text = "\n  arXiv  \nABSTRACT We propose a thing\nDeep Residual Learning for Image Recognition\nKaiming He";
        assert_eq!(
            title_line_candidate(text).as_deref(),
            Some("Deep Residual Learning for Image Recognition")
        );
    }

    #[test]
    fn title_line_only_scans_first_lines() {
        let mut text = "x\n".repeat(15);
        text.push_str("A Perfectly Good Title Line\n");
        assert_eq!(title_line_candidate(&text), None);
    }

    #[test]
    fn venue_normalizes_leading_in() {
        let text = "Appeared in Proceedings of the 42nd ACM SIGPLAN Conference, pages 1-10";
        assert_eq!(
            guess_venue(text).as_deref(),
            Some("Proceedings of the 42nd ACM SIGPLAN Conference")
        );
        let text = "In proceedings of the Web Conference\n";
        assert_eq!(guess_venue(text).as_deref(), Some("Proceedings of the Web Conference"));
    }

    #[test]
    fn venue_other_patterns() {
        assert_eq!(
            guess_venue("Presented at the International Conference on Learning Representations, 2021")
                .as_deref(),
            Some("International Conference on Learning Representations")
        );
        assert_eq!(guess_venue("nothing to see here"), None);
    }

    #[test]
    fn filename_title() {
        assert_eq!(
            title_from_filename("deep_residual--learning__2016.pdf").as_deref(),
            Some("deep residual learning 2016")
        );
        assert_eq!(
            title_from_filename("/tmp/papers/Attention-Is-All-You-Need.pdf").as_deref(),
            Some("Attention Is All You Need")
        );
        assert_eq!(title_from_filename("___.pdf"), None);
    }
}
