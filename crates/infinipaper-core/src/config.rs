use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Prefix for environment variables that override file settings.
pub const ENV_PREFIX: &str = "IP_";

const MIN_TIMEOUT_SECS: u64 = 15;
const MAX_TIMEOUT_SECS: u64 = 30;

/// Root application configuration, loaded from `~/.config/infinipaper/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub sources: SourcesConfig,
    pub dedup: DedupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub database_path: String,
    pub storage_dir: String,
}

/// Endpoints and client settings for the bibliographic services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub crossref_url: String,
    pub openalex_url: String,
    pub semantic_scholar_url: String,
    pub arxiv_url: String,
    /// GROBID base URL. Header extraction is skipped when unset or blank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grobid_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polite_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_api_key: Option<String>,
    pub timeout_secs: u64,
    pub cache_enabled: bool,
    pub cache_ttl_hours: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Minimum similarity (0–100) for two titles to be grouped.
    pub threshold: f64,
    /// Subtracted from the similarity when both papers have differing years.
    pub year_penalty: f64,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("infinipaper");

        Self {
            database_path: data_dir
                .join("infinipaper.db")
                .to_string_lossy()
                .to_string(),
            storage_dir: data_dir.join("storage").to_string_lossy().to_string(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            crossref_url: "https://api.crossref.org".to_string(),
            openalex_url: "https://api.openalex.org".to_string(),
            semantic_scholar_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            arxiv_url: "http://export.arxiv.org/api/query".to_string(),
            grobid_url: Some("http://localhost:8070".to_string()),
            polite_email: None,
            semantic_scholar_api_key: None,
            timeout_secs: 20,
            cache_enabled: true,
            cache_ttl_hours: 7 * 24,
            cache_dir: None,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 90.0,
            year_penalty: 10.0,
        }
    }
}

impl SourcesConfig {
    /// Per-request timeout, kept within 15–30 seconds.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600))
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/infinipaper/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("INFINIPAPER_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("infinipaper")
            .join("config.toml")
    }

    /// Load config from disk, then apply `IP_*` environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from a specific path, falling back to defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the rest of the system cannot work with.
    pub fn validate(&self) -> Result<()> {
        let dedup = &self.dedup;
        if !(0.0..=100.0).contains(&dedup.threshold) {
            return Err(CoreError::ConfigError(format!(
                "dedup.threshold must be within 0..=100, got {}",
                dedup.threshold
            )));
        }
        if dedup.year_penalty.is_nan() || dedup.year_penalty < 0.0 {
            return Err(CoreError::ConfigError(format!(
                "dedup.year_penalty must not be negative, got {}",
                dedup.year_penalty
            )));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which receives full variable names such
    /// as `IP_DATABASE_URL`. Blank values are ignored.
    pub fn apply_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get("DATABASE_URL") {
            self.core.database_path = database_path_from_url(&url);
        }
        if let Some(dir) = get("STORAGE_DIR") {
            self.core.storage_dir = dir;
        }
        if let Some(url) = get("GROBID_URL") {
            self.sources.grobid_url = Some(url);
        }
        if let Some(email) = get("POLITE_EMAIL") {
            self.sources.polite_email = Some(email);
        }
        if let Some(key) = get("SEMANTIC_SCHOLAR_API_KEY") {
            self.sources.semantic_scholar_api_key = Some(key);
        }
        if let Some(secs) = get("HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.sources.timeout_secs = secs;
        }
    }

    // ─── Derived paths ─────────────────────────────────────

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.core.database_path)
    }

    pub fn storage_dir(&self) -> PathBuf {
        PathBuf::from(&self.core.storage_dir)
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.storage_dir().join("pdfs")
    }
}

/// Accepts either a plain path or a `sqlite:///path` URL.
fn database_path_from_url(url: &str) -> String {
    url.strip_prefix("sqlite:///")
        .or_else(|| url.strip_prefix("sqlite://"))
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.sources.timeout_secs, 20);
        assert_eq!(cfg.dedup.threshold, 90.0);
        assert_eq!(cfg.dedup.year_penalty, 10.0);
        assert!(cfg.core.database_path.ends_with("infinipaper.db"));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.sources.polite_email = Some("me@example.org".to_string());
        cfg.dedup.threshold = 85.0;
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.sources.polite_email.as_deref(), Some("me@example.org"));
        assert_eq!(loaded.dedup.threshold, 85.0);
        assert_eq!(loaded.sources.crossref_url, cfg.sources.crossref_url);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dedup]\nthreshold = 80.0\n").unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.dedup.threshold, 80.0);
        assert_eq!(loaded.dedup.year_penalty, 10.0);
        assert_eq!(loaded.sources.timeout_secs, 20);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg =
            AppConfig::load_from(Path::new("/tmp/nonexistent_infinipaper_config.toml")).unwrap();
        assert_eq!(cfg.sources.openalex_url, "https://api.openalex.org");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("IP_DATABASE_URL", "sqlite:///./papers.db"),
            ("IP_GROBID_URL", "http://grobid:8070"),
            ("IP_POLITE_EMAIL", "  "),
            ("IP_HTTP_TIMEOUT_SECS", "25"),
        ]);
        let mut cfg = AppConfig::default();
        cfg.apply_overrides_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.core.database_path, "./papers.db");
        assert_eq!(cfg.sources.grobid_url.as_deref(), Some("http://grobid:8070"));
        assert!(cfg.sources.polite_email.is_none());
        assert_eq!(cfg.sources.http_timeout(), Duration::from_secs(25));
    }

    #[test]
    fn test_out_of_range_dedup_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dedup]\nthreshold = 140.0\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, CoreError::ConfigError(_)));

        std::fs::write(&path, "[dedup]\nyear_penalty = -5.0\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, CoreError::ConfigError(_)));

        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_timeout_is_clamped() {
        let mut cfg = SourcesConfig::default();
        cfg.timeout_secs = 2;
        assert_eq!(cfg.http_timeout(), Duration::from_secs(15));
        cfg.timeout_secs = 120;
        assert_eq!(cfg.http_timeout(), Duration::from_secs(30));
    }
}
