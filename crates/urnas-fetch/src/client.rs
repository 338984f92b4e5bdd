//! Rate-limited HTTP client with bounded retries.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use urnas_core::HarvestConfig;

use crate::error::FetchError;
use crate::limiter::RateLimiter;

/// The network operations the navigator and orchestrator need.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// `Ok(None)` when the resource does not exist (HTTP 404).
    async fn fetch_json(&self, url: &str) -> Result<Option<serde_json::Value>, FetchError>;

    /// Download `url` to `dest`. A non-empty `dest` is left alone.
    async fn download_file(&self, url: &str, dest: &Path) -> Result<DownloadOutcome, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    AlreadyPresent,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    pub backoff_cap: Duration,
}

impl RetryPolicy {
    /// `min(unit * 2^attempt, cap)`, with `attempt` counted from zero.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_unit
            .checked_mul(factor)
            .map_or(self.backoff_cap, |d| d.min(self.backoff_cap))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_unit: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub rate_limit: u32,
    pub burst: Option<u32>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&HarvestConfig::default())
    }
}

impl From<&HarvestConfig> for ClientOptions {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            rate_limit: config.rate_limit,
            burst: None,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            retry: RetryPolicy {
                max_attempts: config.max_retries.max(1),
                backoff_unit: Duration::from_secs(1),
                backoff_cap: config.backoff_cap(),
            },
            user_agent: format!("urnas/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client that takes a limiter token before every request.
pub struct RateLimitedClient {
    http: reqwest::Client,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

/// What to do after a failed attempt.
enum Attempt {
    Backoff(String),
    Retry(String),
}

impl RateLimitedClient {
    pub fn new(options: ClientOptions) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(options.user_agent)
            .connect_timeout(options.connect_timeout)
            .read_timeout(options.read_timeout)
            .build()?;
        let mut limiter = RateLimiter::new(options.rate_limit);
        if let Some(burst) = options.burst {
            limiter = limiter.with_burst(burst);
        }
        Ok(Self {
            http,
            limiter,
            retry: options.retry,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fetch and deserialize a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, FetchError> {
        let Some(bytes) = self.get_bytes(url).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| FetchError::Json {
                url: url.to_string(),
                source,
            })
    }

    async fn get_bytes(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        let mut last = String::new();
        for attempt in 0..self.retry.max_attempts {
            self.limiter.acquire().await;
            let outcome = match self.http.get(url).send().await {
                Ok(resp) => match resp.status() {
                    StatusCode::NOT_FOUND => {
                        debug!(url, "not found");
                        return Ok(None);
                    }
                    status if status.is_success() => match resp.bytes().await {
                        Ok(bytes) => return Ok(Some(bytes.to_vec())),
                        Err(e) => Attempt::Backoff(e.to_string()),
                    },
                    status => classify_status(status),
                },
                Err(e) => classify_transport(&e),
            };
            last = self.after_failure(url, attempt, outcome).await;
        }
        Err(self.exhausted(url, last))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadOutcome, FetchError> {
        if let Ok(meta) = tokio::fs::metadata(dest).await
            && meta.len() > 0
        {
            debug!(path = %dest.display(), "already downloaded");
            return Ok(DownloadOutcome::AlreadyPresent);
        }
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| FetchError::Io {
                path: dir.to_path_buf(),
                source,
            })?;

        let mut last = String::new();
        for attempt in 0..self.retry.max_attempts {
            self.limiter.acquire().await;
            let outcome = match self.http.get(url).send().await {
                Ok(resp) => match resp.status() {
                    StatusCode::NOT_FOUND => {
                        debug!(url, "not found");
                        return Ok(DownloadOutcome::NotFound);
                    }
                    status if status.is_success() => {
                        // Each attempt owns its partial file; dropping it removes it.
                        let (file, tmp) = partial_file(dir, dest)?;
                        match stream_to(resp, file).await {
                            Ok(bytes) => {
                                tmp.persist(dest).map_err(|e| FetchError::Io {
                                    path: dest.to_path_buf(),
                                    source: e.error,
                                })?;
                                debug!(url, bytes, "downloaded");
                                return Ok(DownloadOutcome::Downloaded { bytes });
                            }
                            Err(StreamError::Io(source)) => {
                                return Err(FetchError::Io {
                                    path: tmp.to_path_buf(),
                                    source,
                                });
                            }
                            Err(StreamError::Http(e)) => Attempt::Backoff(e.to_string()),
                        }
                    }
                    status => classify_status(status),
                },
                Err(e) => classify_transport(&e),
            };
            last = self.after_failure(url, attempt, outcome).await;
        }
        Err(self.exhausted(url, last))
    }

    async fn after_failure(&self, url: &str, attempt: u32, outcome: Attempt) -> String {
        match outcome {
            Attempt::Backoff(reason) => {
                let wait = self.retry.backoff(attempt);
                warn!(
                    url,
                    attempt = attempt + 1,
                    max = self.retry.max_attempts,
                    wait_secs = wait.as_secs_f64(),
                    reason = %reason,
                    "request failed, backing off"
                );
                tokio::time::sleep(wait).await;
                reason
            }
            Attempt::Retry(reason) => {
                debug!(url, attempt = attempt + 1, reason = %reason, "request failed, retrying");
                reason
            }
        }
    }

    fn exhausted(&self, url: &str, last: String) -> FetchError {
        warn!(url, attempts = self.retry.max_attempts, last = %last, "giving up");
        FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.retry.max_attempts,
            last,
        }
    }
}

#[async_trait]
impl Fetcher for RateLimitedClient {
    async fn fetch_json(&self, url: &str) -> Result<Option<serde_json::Value>, FetchError> {
        self.get_json(url).await
    }

    async fn download_file(&self, url: &str, dest: &Path) -> Result<DownloadOutcome, FetchError> {
        self.download(url, dest).await
    }
}

fn classify_status(status: StatusCode) -> Attempt {
    let reason = format!("HTTP {}", status.as_u16());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Attempt::Backoff(reason)
    } else {
        Attempt::Retry(reason)
    }
}

fn classify_transport(e: &reqwest::Error) -> Attempt {
    Attempt::Backoff(e.to_string())
}

enum StreamError {
    Http(reqwest::Error),
    Io(std::io::Error),
}

async fn stream_to(resp: reqwest::Response, file: std::fs::File) -> Result<u64, StreamError> {
    let mut file = tokio::fs::File::from_std(file);
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(StreamError::Http)?;
        file.write_all(&chunk).await.map_err(StreamError::Io)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(StreamError::Io)?;
    Ok(written)
}

/// A fresh `.<name>.<random>.part` file beside `dest`.
fn partial_file(dir: &Path, dest: &Path) -> Result<(std::fs::File, TempPath), FetchError> {
    let name = dest.file_name().unwrap_or_default().to_string_lossy();
    tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".part")
        .tempfile_in(dir)
        .map(NamedTempFile::into_parts)
        .map_err(|source| FetchError::Io {
            path: dir.to_path_buf(),
            source,
        })
}
