//! Request pipeline: from raw user input to a served summary or a stable
//! rejection.
//!
//! ```text
//! received -> normalizing -> validated -> rate-checking -> admitted
//!   -> cache-lookup -> (served from cache) | cache-miss
//!   -> fetching -> fetched -> length-check -> summarizing -> served -> cache-write
//! ```
//!
//! Normalization and the SSRF guard run before the quota is touched, and the
//! quota is consumed before any outbound work. Quota consumed at admission is
//! never refunded, including when the caller drops the future mid-fetch.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::application::ports::{ContentCache, FetchError, Fetcher, SummarizationError, Summarizer};
use crate::application::quota::{QuotaSet, RateLimitError};
use crate::domain::host::HostGuard;
use crate::domain::url::{normalize_url, NormalizedUrl, ValidationError};
use crate::infrastructure::resolve::resolve_within;

/// Stable machine-readable outcome code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidUrl,
    BlockedUrl,
    RateLimited,
    FetchFailed,
    ContentTooShort,
    SummarizationFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidUrl => "invalid_url",
            ErrorCode::BlockedUrl => "blocked_url",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::FetchFailed => "fetch_failed",
            ErrorCode::ContentTooShort => "content_too_short",
            ErrorCode::SummarizationFailed => "summarization_failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way a pipeline run can fail.
///
/// `Display` carries internal detail for logs. Callers facing end users should
/// use [`code`](Self::code) and [`user_message`](Self::user_message) instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("content too short to summarize ({length} < {minimum} characters)")]
    ContentTooShort { length: usize, minimum: usize },
    #[error(transparent)]
    Summarization(#[from] SummarizationError),
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::Validation(e) if e.is_blocked_host() => ErrorCode::BlockedUrl,
            PipelineError::Validation(_) => ErrorCode::InvalidUrl,
            PipelineError::RateLimited(_) => ErrorCode::RateLimited,
            PipelineError::Fetch(_) => ErrorCode::FetchFailed,
            PipelineError::ContentTooShort { .. } => ErrorCode::ContentTooShort,
            PipelineError::Summarization(_) => ErrorCode::SummarizationFailed,
        }
    }

    /// Message safe to show to the submitting user.
    ///
    /// Only validation and quota failures are specific; downstream failures
    /// collapse to one fixed message each.
    pub fn user_message(&self) -> Cow<'static, str> {
        match self {
            PipelineError::Validation(e) => Cow::Owned(e.to_string()),
            PipelineError::RateLimited(e) => Cow::Owned(format!(
                "Too many requests: the {} limit of {} was reached. Please try again in {} seconds.",
                e.window,
                e.limit,
                e.reset_after.as_secs().max(1)
            )),
            PipelineError::Fetch(_) => Cow::Borrowed("Could not retrieve content from this URL."),
            PipelineError::ContentTooShort { .. } => {
                Cow::Borrowed("This page does not have enough text to summarize.")
            }
            PipelineError::Summarization(_) => {
                Cow::Borrowed("Summarization failed. Please try again later.")
            }
        }
    }
}

/// State reported to a [`StageObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Normalizing,
    Validated,
    RateChecking,
    Admitted,
    CacheLookup,
    CacheMiss,
    Fetching,
    Fetched,
    LengthCheck,
    Summarizing,
    Served { from_cache: bool },
    CacheWrite,
    Rejected(ErrorCode),
}

/// Optional diagnostic hook called on every stage transition.
pub type StageObserver = Arc<dyn Fn(Stage) + Send + Sync>;

/// Timeouts and thresholds for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub fetch_timeout: Duration,
    pub summarize_timeout: Duration,
    /// Deadline for each cache read and write. Expiry counts as a cache failure.
    pub cache_timeout: Duration,
    /// Deadline for host resolution when `resolve_hosts` is set.
    pub resolve_timeout: Duration,
    /// Characters of trimmed content below which summarization is skipped.
    pub min_content_chars: usize,
    /// Resolve the host after admission and refuse blocked addresses.
    pub resolve_hosts: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            summarize_timeout: Duration::from_secs(30),
            cache_timeout: Duration::from_secs(2),
            resolve_timeout: Duration::from_secs(5),
            min_content_chars: 200,
            resolve_hosts: false,
        }
    }
}

/// Successful pipeline outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub url: NormalizedUrl,
    pub summary: String,
    pub from_cache: bool,
}

/// Orchestrates normalization, host guard, quotas and the three collaborators.
///
/// Collaborators are injected and owned by the caller; the pipeline only owns
/// its quotas, which [`close`](Self::close) destroys.
pub struct Pipeline {
    guard: HostGuard,
    quotas: QuotaSet,
    cache: Arc<dyn ContentCache>,
    fetcher: Arc<dyn Fetcher>,
    summarizer: Arc<dyn Summarizer>,
    settings: PipelineSettings,
    observer: Option<StageObserver>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("guard", &self.guard)
            .field("quotas", &self.quotas)
            .field("cache", &self.cache)
            .field("fetcher", &self.fetcher)
            .field("summarizer", &self.summarizer)
            .field("settings", &self.settings)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Pipeline {
    /// A pipeline with the default guard, no quotas and default settings.
    pub fn new(
        cache: Arc<dyn ContentCache>,
        fetcher: Arc<dyn Fetcher>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            guard: HostGuard::default(),
            quotas: QuotaSet::new(),
            cache,
            fetcher,
            summarizer,
            settings: PipelineSettings::default(),
            observer: None,
        }
    }

    pub fn with_guard(mut self, guard: HostGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_quotas(mut self, quotas: QuotaSet) -> Self {
        self.quotas = quotas;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_observer(mut self, observer: StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn quotas(&self) -> &QuotaSet {
        &self.quotas
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn observe(&self, stage: Stage) {
        if let Some(observer) = &self.observer {
            observer(stage);
        }
    }

    fn reject(&self, err: PipelineError) -> PipelineError {
        self.observe(Stage::Rejected(err.code()));
        err
    }

    /// Normalize, guard and charge the quota of `caller`, without any I/O.
    ///
    /// # Errors
    /// [`PipelineError::Validation`] or [`PipelineError::RateLimited`]. A URL
    /// that fails validation never consumes quota.
    pub fn admit(&self, raw: &str, caller: &str) -> Result<NormalizedUrl, PipelineError> {
        self.observe(Stage::Received);
        self.observe(Stage::Normalizing);

        let url = match normalize_url(raw) {
            Ok(url) => url,
            Err(e) => {
                debug!(reason = %e, "rejected invalid url");
                return Err(self.reject(e.into()));
            }
        };
        if let Err(e) = self.guard.check(&url) {
            debug!(url = %url, reason = %e, "rejected blocked url");
            return Err(self.reject(e.into()));
        }
        self.observe(Stage::Validated);

        self.observe(Stage::RateChecking);
        if let Err(e) = self.quotas.check(caller) {
            debug!(caller, window = %e.window, "rejected over quota");
            return Err(self.reject(e.into()));
        }
        self.observe(Stage::Admitted);

        Ok(url)
    }

    /// Run the whole pipeline for one request.
    ///
    /// Every await after admission has a deadline from [`PipelineSettings`].
    /// Dropping the returned future cancels the in-flight fetch or
    /// summarization call.
    ///
    /// # Errors
    /// Any [`PipelineError`]. Cache failures are logged and never returned.
    pub async fn run(&self, raw: &str, caller: &str) -> Result<Served, PipelineError> {
        let url = self.admit(raw, caller)?;

        if self.settings.resolve_hosts {
            let limit = self.settings.resolve_timeout;
            if let Err(e) = resolve_within(&url, &self.guard, limit).await {
                debug!(url = %url, reason = %e, "rejected after resolution");
                return Err(self.reject(e.into()));
            }
        }

        self.observe(Stage::CacheLookup);
        match timeout(self.settings.cache_timeout, self.cache.get(url.as_str())).await {
            Ok(Ok(Some(summary))) => {
                self.observe(Stage::Served { from_cache: true });
                return Ok(Served {
                    url,
                    summary,
                    from_cache: true,
                });
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!(url = %url, error = %e, "cache read failed, treating as miss"),
            Err(_) => warn!(
                url = %url,
                timeout_ms = self.settings.cache_timeout.as_millis() as u64,
                "cache read timed out, treating as miss"
            ),
        }
        self.observe(Stage::CacheMiss);

        let content = self.fetch(&url).await?;

        self.observe(Stage::LengthCheck);
        let length = content.trim().chars().count();
        let minimum = self.settings.min_content_chars;
        if length < minimum {
            debug!(url = %url, length, minimum, "content too short to summarize");
            return Err(self.reject(PipelineError::ContentTooShort { length, minimum }));
        }

        let summary = self.summarize(&url, &content).await?;
        self.observe(Stage::Served { from_cache: false });

        self.observe(Stage::CacheWrite);
        self.write_back(&url, &summary).await;

        Ok(Served {
            url,
            summary,
            from_cache: false,
        })
    }

    /// Best-effort cache write, bounded by `cache_timeout`. Never fails the request.
    async fn write_back(&self, url: &NormalizedUrl, summary: &str) {
        let limit = self.settings.cache_timeout;
        match timeout(limit, self.cache.set(url.as_str(), summary)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(url = %url, error = %e, "cache write failed"),
            Err(_) => warn!(
                url = %url,
                timeout_ms = limit.as_millis() as u64,
                "cache write timed out"
            ),
        }
    }

    async fn fetch(&self, url: &NormalizedUrl) -> Result<String, PipelineError> {
        self.observe(Stage::Fetching);
        let limit = self.settings.fetch_timeout;

        let result = match timeout(limit, self.fetcher.fetch(url, limit)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(limit)),
        };

        match result {
            Ok(content) => {
                self.observe(Stage::Fetched);
                Ok(content)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "fetch failed");
                Err(self.reject(e.into()))
            }
        }
    }

    async fn summarize(&self, url: &NormalizedUrl, content: &str) -> Result<String, PipelineError> {
        self.observe(Stage::Summarizing);
        let limit = self.settings.summarize_timeout;

        let result = match timeout(limit, self.summarizer.summarize(content)).await {
            Ok(Ok(summary)) if summary.trim().is_empty() => Err(SummarizationError::Empty),
            Ok(result) => result,
            Err(_) => Err(SummarizationError::Timeout(limit)),
        };

        result.map_err(|e| {
            warn!(url = %url, error = %e, "summarization failed");
            self.reject(e.into())
        })
    }

    /// Destroy the quotas owned by this pipeline.
    pub fn close(&self) {
        self.quotas.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::BlockReason;

    #[test]
    fn test_error_codes() {
        let invalid = PipelineError::from(ValidationError::Empty);
        assert_eq!(invalid.code(), ErrorCode::InvalidUrl);

        let blocked = PipelineError::from(ValidationError::BlockedHost {
            host: "localhost".into(),
            reason: BlockReason::Loopback,
        });
        assert_eq!(blocked.code(), ErrorCode::BlockedUrl);
        assert_eq!(blocked.code().to_string(), "blocked_url");

        let short = PipelineError::ContentTooShort {
            length: 10,
            minimum: 200,
        };
        assert_eq!(short.code().as_str(), "content_too_short");
    }

    #[test]
    fn test_downstream_messages_hide_detail() {
        let fetch = PipelineError::from(FetchError::Network("connection reset by 10.1.2.3".into()));
        assert_eq!(fetch.user_message(), "Could not retrieve content from this URL.");
        assert!(fetch.to_string().contains("10.1.2.3"));

        let model = PipelineError::from(SummarizationError::Model("quota exhausted".into()));
        assert!(!model.user_message().contains("quota"));
    }

    #[test]
    fn test_rate_limit_message_names_window() {
        let err = PipelineError::from(RateLimitError {
            window: "daily".into(),
            limit: 50,
            reset_after: Duration::from_secs(3600),
        });
        assert_eq!(err.code(), ErrorCode::RateLimited);
        assert_eq!(
            err.user_message(),
            "Too many requests: the daily limit of 50 was reached. Please try again in 3600 seconds."
        );
    }

    #[test]
    fn test_validation_message_is_specific() {
        let err = PipelineError::from(ValidationError::Credentials);
        assert_eq!(err.user_message(), "URL must not contain credentials");
    }
}
