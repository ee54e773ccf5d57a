use reqwest::Url;
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::http::USER_AGENT;
use crate::record::SourceKind;

pub mod crossref;
pub mod openalex;
pub mod semantic_scholar;

pub use crossref::CrossRefSource;
pub use openalex::{OpenAlexQuery, OpenAlexSource};
pub use semantic_scholar::SemanticScholarSource;

/// A bibliographic web service the resolver consults.
pub trait ExternalSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}

/// User agent carrying a contact address for the polite API pools.
pub(crate) fn polite_user_agent(polite_email: Option<&str>) -> String {
    match polite_email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => format!("{USER_AGENT} (mailto:{email})"),
        None => USER_AGENT.to_string(),
    }
}

/// `{base}/{path}` as a URL. `path` is appended verbatim.
pub(crate) fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| ScienceError::Parse(format!("invalid URL {joined}: {e}")))
}

/// `{base}/{path}` followed by the `/`-separated pieces of `tail`, each
/// percent-encoded so `?`, `#` and `%` inside a DOI stay in the path.
pub(crate) fn endpoint_with_tail(base_url: &str, path: &str, tail: &str) -> Result<Url> {
    let mut url = endpoint(base_url, path)?;
    url.path_segments_mut()
        .map_err(|_| ScienceError::Parse(format!("URL cannot take a path: {base_url}")))?
        .pop_if_empty()
        .extend(tail.split('/'));
    Ok(url)
}

pub(crate) fn parse_json(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| ScienceError::Parse(e.to_string()))
}

pub(crate) fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

/// First string of a JSON array field, as Crossref stores titles.
pub(crate) fn first_str<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key)
        .and_then(Value::as_array)
        .and_then(|items| items.iter().find_map(Value::as_str))
}

pub(crate) fn year_field(v: &Value, key: &str) -> Option<i32> {
    v.get(key)
        .and_then(Value::as_i64)
        .and_then(|n| i32::try_from(n).ok())
        .filter(|y| *y > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn polite_user_agent_adds_mailto() {
        assert!(polite_user_agent(Some("me@example.org")).ends_with("(mailto:me@example.org)"));
        assert_eq!(polite_user_agent(Some("  ")), USER_AGENT);
        assert_eq!(polite_user_agent(None), USER_AGENT);
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let url = endpoint("https://api.crossref.org/", "/works/10.1000/x").unwrap();
        assert_eq!(url.as_str(), "https://api.crossref.org/works/10.1000/x");
    }

    #[test]
    fn json_helpers() {
        let v = json!({"title": [null, "A Title"], "year": 2020, "zero": 0});
        assert_eq!(first_str(&v, "title"), Some("A Title"));
        assert_eq!(year_field(&v, "year"), Some(2020));
        assert_eq!(year_field(&v, "zero"), None);
        assert_eq!(str_field(&v, "missing"), None);
    }
}
