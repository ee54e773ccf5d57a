use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::multipart::Form;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Result, ScienceError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const USER_AGENT: &str = concat!("infinipaper/", env!("CARGO_PKG_VERSION"));

// ─── RateLimitedClient ────────────────────────────────────────────────────────

pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    max_retries: u32,
    budget: Duration,
}

impl RateLimitedClient {
    /// Every request made through the client is bounded by `timeout`, and so
    /// is the total time one call spends waiting out retries.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            min_interval: Duration::ZERO,
            last_request: Arc::new(Mutex::new(None)),
            max_retries: 2,
            budget: timeout,
        })
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with_headers(url, HeaderMap::new()).await
    }

    /// GET with retries: 429 responses wait for `Retry-After`, transport
    /// failures back off exponentially. Timeouts are not retried, and a wait
    /// that would overrun the call's budget fails the call instead.
    pub async fn get_with_headers(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let deadline = Instant::now() + self.budget;
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            let resp = self.client.get(url).headers(headers.clone()).send().await;
            match resp {
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(60);
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if attempt >= self.max_retries || Duration::from_secs(wait) > remaining {
                        return Err(ScienceError::RateLimit(url.to_string(), wait));
                    }
                    debug!(url, wait, "rate limited, waiting");
                    sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Ok(r) => return read_body(url, r).await,
                Err(e) if e.is_timeout() || attempt >= self.max_retries => {
                    return Err(transport_error(url, e));
                }
                Err(e) => {
                    let backoff = 2u64.pow(attempt);
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if Duration::from_secs(backoff) > remaining {
                        return Err(transport_error(url, e));
                    }
                    warn!(url, error = %e, backoff, "request failed, retrying");
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_headers(url, HeaderMap::new()).await
    }

    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T> {
        let text = self.get_with_headers(url, headers).await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }

    /// Single-shot multipart POST. Upload bodies are not replayed on failure.
    pub async fn post_multipart(&self, url: &str, form: Form) -> Result<String> {
        self.wait_for_rate_limit().await;
        let resp = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;
        read_body(url, resp).await
    }

    /// `true` when `url` answers with a success status.
    pub async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                debug!(url, error = %e, "probe failed");
                false
            }
        }
    }
}

async fn read_body(url: &str, resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ScienceError::NotFound(url.to_string()));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ScienceError::ApiError(
            url.to_string(),
            format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
        ));
    }
    resp.text().await.map_err(|e| transport_error(url, e))
}

fn transport_error(url: &str, e: reqwest::Error) -> ScienceError {
    if e.is_timeout() {
        ScienceError::SourceUnavailable(format!("{url}: request timed out"))
    } else if e.is_connect() {
        ScienceError::SourceUnavailable(format!("{url}: {e}"))
    } else {
        ScienceError::Http(e)
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ─── DiskCache ────────────────────────────────────────────────────────────────

/// JSON-file cache for successful lookups, one file per key.
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

fn cache_key_to_path(dir: &Path, key: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    dir.join(format!("{hash:016x}.json"))
}

#[derive(Serialize, serde::Deserialize)]
struct CacheEntry<T> {
    stored_at: u64, // Unix timestamp secs
    value: T,
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl DiskCache {
    /// Cache under `<user cache dir>/infinipaper/<namespace>`.
    pub fn new(namespace: &str, ttl: Duration) -> Self {
        let dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("infinipaper")
            .join(namespace);
        Self::in_dir(dir, ttl)
    }

    pub fn in_dir(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "cannot create cache directory");
        }
        Self { dir, ttl }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = cache_key_to_path(&self.dir, key);
        let data = tokio::fs::read(&path).await.ok()?;
        let entry: CacheEntry<T> = serde_json::from_slice(&data).ok()?;
        if now_secs().saturating_sub(entry.stored_at) > self.ttl.as_secs() {
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }
        Some(entry.value)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let path = cache_key_to_path(&self.dir, key);
        let entry = CacheEntry {
            stored_at: now_secs(),
            value,
        };
        if let Ok(data) = serde_json::to_vec(&entry)
            && let Err(e) = tokio::fs::write(&path, data).await
        {
            debug!(key, error = %e, "cache write failed");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let path = cache_key_to_path(&self.dir, key);
        let _ = tokio::fs::remove_file(&path).await;
    }
}
