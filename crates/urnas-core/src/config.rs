//! Harvest configuration, loadable from TOML. Every field has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::CoreError;

pub const DEFAULT_BASE_URL: &str = "https://resultados.tse.jus.br/oficial";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    /// Authority API root, without trailing slash.
    pub base_url: String,
    /// Root for `raw/` downloads and `db/` stores.
    pub data_dir: PathBuf,

    pub max_retries: u32,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub backoff_cap_secs: u64,
    /// Shared budget for in-flight files and in-flight sections.
    pub max_concurrent: usize,
    /// Requests per second across all calls of one client.
    pub rate_limit: u32,
    /// Sections scheduled together per state.
    pub section_batch: usize,
    pub progress_every: usize,

    pub compile_batch: usize,
    pub snapshot_interval: usize,
    pub dequeue_timeout_ms: u64,
    pub error_log_cap: usize,
    /// A full rebuild aborts below this many ballot files on disk.
    pub min_rebuild_files: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: PathBuf::from("data"),
            max_retries: 10,
            connect_timeout_secs: 20,
            read_timeout_secs: 30,
            backoff_cap_secs: 30,
            max_concurrent: 500,
            rate_limit: 3000,
            section_batch: 500,
            progress_every: 100,
            compile_batch: 200,
            snapshot_interval: 500,
            dequeue_timeout_ms: 2000,
            error_log_cap: 20,
            min_rebuild_files: 900_000,
        }
    }
}

impl HarvestConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db").join("urnas.duckdb")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("db").join("urnas_live.duckdb")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(self.backoff_cap_secs)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }
}
