//! Configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Batch configuration, loadable from a YAML scenario file.
///
/// `Default` reproduces the stock benchmark: a 30 x 20 tile grid at level 18
/// of `slide_1` on a local server, 50 requests in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_slide")]
    pub slide: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default = "default_col_range")]
    pub col_range: u32,
    #[serde(default = "default_row_range")]
    pub row_range: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-request timeout. Unset means the HTTP client's default (none).
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Draw a progress bar while the batch runs.
    #[serde(default)]
    pub progress: bool,
}

fn default_name() -> String {
    "dzi-grid".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_slide() -> String {
    "slide_1".to_string()
}

fn default_level() -> u32 {
    18
}

fn default_col_range() -> u32 {
    30
}

fn default_row_range() -> u32 {
    20
}

fn default_concurrency() -> usize {
    50
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            description: String::new(),
            base_url: default_base_url(),
            slide: default_slide(),
            level: default_level(),
            col_range: default_col_range(),
            row_range: default_row_range(),
            concurrency: default_concurrency(),
            request_timeout_secs: None,
            progress: false,
        }
    }
}

impl BenchConfig {
    /// Load configuration from YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BenchConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be > 0");
        }
        if self.base_url.trim().is_empty() {
            anyhow::bail!("base_url must not be empty");
        }
        if self.slide.trim().is_empty() {
            anyhow::bail!("slide must not be empty");
        }
        if self.request_timeout_secs == Some(0) {
            anyhow::bail!("request_timeout_secs must be > 0 when set");
        }
        Ok(())
    }

    /// Number of tile requests in one batch.
    pub fn total_tiles(&self) -> u64 {
        self.col_range as u64 * self.row_range as u64
    }

    /// Label the batch timing is reported under.
    pub fn batch_label(&self) -> String {
        format!("{} total requests", self.total_tiles())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Base URL with any trailing slash removed.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
