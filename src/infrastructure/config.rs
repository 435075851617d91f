//! Declarative configuration loaded from TOML.
//!
//! ```toml
//! self_domains = ["summarize.example"]
//!
//! [[rate_limits]]
//! name = "per-minute"
//! limit = 5
//! window_ms = 60000
//!
//! [[rate_limits]]
//! name = "daily"
//! limit = 50
//! window_ms = 86400000
//! max_entries = 50000
//!
//! [pipeline]
//! fetch_timeout_ms = 10000
//! min_content_chars = 200
//! ```
//!
//! Every field has a default except `name`, `limit` and `window_ms` of a window.
//! An absent `rate_limits` table means the per-minute and daily defaults above.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::limiter::{BuildError, RateLimiter, DEFAULT_MAX_ENTRIES};
use crate::application::pipeline::PipelineSettings;
use crate::application::quota::QuotaSet;
use crate::domain::host::HostGuard;

/// Error returned when configuration cannot be loaded or used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to build rate limiter: {0}")]
    Build(#[from] BuildError),
}

/// One named rate-limit window.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    pub name: String,
    pub limit: u32,
    pub window_ms: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Defaults to `window_ms`.
    #[serde(default)]
    pub cleanup_interval_ms: Option<u64>,
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl WindowConfig {
    fn new(name: &str, limit: u32, window_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            limit,
            window_ms,
            max_entries: DEFAULT_MAX_ENTRIES,
            cleanup_interval_ms: None,
        }
    }

    fn build(&self) -> Result<RateLimiter, BuildError> {
        let mut builder = RateLimiter::builder()
            .with_name(self.name.clone())
            .with_limit(self.limit)
            .with_window(Duration::from_millis(self.window_ms))
            .with_max_entries(self.max_entries);
        if let Some(ms) = self.cleanup_interval_ms {
            builder = builder.with_cleanup_interval(Duration::from_millis(ms));
        }
        builder.build()
    }
}

fn default_rate_limits() -> Vec<WindowConfig> {
    vec![
        WindowConfig::new("per-minute", 5, 60_000),
        WindowConfig::new("daily", 50, 86_400_000),
    ]
}

/// Pipeline timeouts and thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub fetch_timeout_ms: u64,
    pub summarize_timeout_ms: u64,
    pub cache_timeout_ms: u64,
    pub resolve_timeout_ms: u64,
    pub min_content_chars: usize,
    pub resolve_hosts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 10_000,
            summarize_timeout_ms: 30_000,
            cache_timeout_ms: 2_000,
            resolve_timeout_ms: 5_000,
            min_content_chars: 200,
            resolve_hosts: false,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerimeterConfig {
    /// Domains of the product itself, blocked with and without `www.`.
    #[serde(default)]
    pub self_domains: Vec<String>,
    #[serde(default = "default_rate_limits")]
    pub rate_limits: Vec<WindowConfig>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Default for PerimeterConfig {
    fn default() -> Self {
        Self {
            self_domains: Vec::new(),
            rate_limits: default_rate_limits(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl PerimeterConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        let config: PerimeterConfig = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&data)?;
        info!(
            path = %path.display(),
            windows = config.rate_limits.len(),
            self_domains = config.self_domains.len(),
            "loaded perimeter configuration"
        );
        Ok(config)
    }

    /// Check every value that would otherwise fail later at build time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        debug!("validating perimeter configuration");

        if self.self_domains.iter().any(|d| d.trim().is_empty()) {
            return Err(invalid("self_domains entries cannot be empty"));
        }

        if self.self_domains.is_empty() {
            warn!("no self_domains configured, self-referential fetches are not blocked");
        }

        if self.rate_limits.is_empty() {
            warn!("no rate limits configured, callers are not bounded");
        }

        let mut names = HashSet::new();
        for window in &self.rate_limits {
            validate_window(window)?;
            if !names.insert(window.name.as_str()) {
                return Err(invalid(format!("duplicate rate limit window '{}'", window.name)));
            }
        }

        let pipeline = &self.pipeline;
        if pipeline.fetch_timeout_ms == 0 {
            return Err(invalid("pipeline.fetch_timeout_ms must be greater than 0"));
        }
        if pipeline.summarize_timeout_ms == 0 {
            return Err(invalid("pipeline.summarize_timeout_ms must be greater than 0"));
        }
        if pipeline.cache_timeout_ms == 0 {
            return Err(invalid("pipeline.cache_timeout_ms must be greater than 0"));
        }
        if pipeline.resolve_timeout_ms == 0 {
            return Err(invalid("pipeline.resolve_timeout_ms must be greater than 0"));
        }

        Ok(())
    }

    pub fn build_guard(&self) -> HostGuard {
        self.self_domains
            .iter()
            .fold(HostGuard::new(), |guard, domain| guard.with_self_domain(domain))
    }

    /// Build one limiter per window, in configured order.
    ///
    /// Each limiter spawns its sweeper, so this must run inside a tokio runtime.
    pub fn build_quotas(&self) -> Result<QuotaSet, ConfigError> {
        let mut quotas = QuotaSet::new();
        for window in &self.rate_limits {
            quotas = quotas.with_limiter(window.build()?);
        }
        Ok(quotas)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            fetch_timeout: Duration::from_millis(self.pipeline.fetch_timeout_ms),
            summarize_timeout: Duration::from_millis(self.pipeline.summarize_timeout_ms),
            cache_timeout: Duration::from_millis(self.pipeline.cache_timeout_ms),
            resolve_timeout: Duration::from_millis(self.pipeline.resolve_timeout_ms),
            min_content_chars: self.pipeline.min_content_chars,
            resolve_hosts: self.pipeline.resolve_hosts,
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn validate_window(window: &WindowConfig) -> Result<(), ConfigError> {
    if window.name.trim().is_empty() {
        return Err(invalid("rate limit window name cannot be empty"));
    }
    if window.limit == 0 {
        return Err(invalid(format!("window '{}': limit must be greater than 0", window.name)));
    }
    if window.window_ms == 0 {
        return Err(invalid(format!(
            "window '{}': window_ms must be greater than 0",
            window.name
        )));
    }
    if window.max_entries == 0 {
        return Err(invalid(format!(
            "window '{}': max_entries must be greater than 0",
            window.name
        )));
    }
    if window.cleanup_interval_ms == Some(0) {
        return Err(invalid(format!(
            "window '{}': cleanup_interval_ms must be greater than 0",
            window.name
        )));
    }
    Ok(())
}
