//! # fetch-perimeter
//!
//! The perimeter in front of a "give me a URL and I'll fetch and summarize it"
//! service. User-supplied URLs are attacker-controlled and every accepted one
//! costs an outbound request and a paid model call, so this crate:
//!
//! - normalizes free-form input into a canonical `http`/`https` URL, or rejects it
//! - refuses hosts that point back into the deployment (loopback, private ranges,
//!   link-local, cloud metadata, cluster-internal names, the product's own domain)
//! - bounds how often each caller may trigger work, with a counting-window rate
//!   limiter whose memory is capped
//! - orchestrates cache lookup, fetch and summarization behind stable error codes
//!
//! ## Quick Start
//!
//! ```rust
//! use fetch_perimeter::{is_blocked_host, normalize_url, RateLimiter};
//! use std::time::Duration;
//!
//! let url = normalize_url("example.com/article").unwrap();
//! assert_eq!(url.as_str(), "https://example.com/article");
//! assert!(!is_blocked_host(url.host()));
//!
//! let metadata = normalize_url("http://169.254.169.254/latest/meta-data").unwrap();
//! assert!(is_blocked_host(metadata.host()));
//!
//! let limiter = RateLimiter::builder()
//!     .with_name("per-minute")
//!     .with_limit(5)
//!     .with_window(Duration::from_secs(60))
//!     .with_background_sweep(false)
//!     .build()
//!     .unwrap();
//! assert_eq!(limiter.check("203.0.113.7").remaining, 4);
//! limiter.destroy();
//! ```
//!
//! ## Pipeline
//!
//! [`Pipeline`] wires the pieces together with three injected collaborators:
//! a [`ContentCache`], a [`Fetcher`] and a [`Summarizer`]. URL validation and
//! the host guard always run before any quota is consumed, and quotas always run
//! before any outbound request.
//!
//! ```rust,no_run
//! # use fetch_perimeter::*;
//! # use std::sync::Arc;
//! # async fn example(
//! #     fetcher: Arc<dyn Fetcher>,
//! #     summarizer: Arc<dyn Summarizer>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = PerimeterConfig::load("perimeter.toml")?;
//! let pipeline = Pipeline::new(
//!     Arc::new(InMemoryContentCache::new(10_000)),
//!     fetcher,
//!     summarizer,
//! )
//! .with_guard(config.build_guard())
//! .with_quotas(config.build_quotas()?)
//! .with_settings(config.pipeline_settings());
//!
//! match pipeline.run("example.com/article", "203.0.113.7").await {
//!     Ok(served) => println!("{}", served.summary),
//!     Err(e) => println!("{}: {}", e.code(), e.user_message()),
//! }
//! pipeline.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Limitations
//!
//! - The host guard is lexical. A name that resolves to a private address passes
//!   it unless [`PipelineSettings::resolve_hosts`] is enabled, and even then the
//!   fetcher should pin the address it connects to and refuse redirects.
//! - Rate limit state is per process. Behind a load balancer each instance
//!   enforces its own limit.
//!
//! ## Logging
//!
//! Everything is reported through `tracing`. The crate never installs a
//! subscriber. Rejections log at `debug`, collaborator failures at `warn`, and
//! limiter teardown at `info`.

// Domain layer - pure perimeter logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - adapters
pub mod infrastructure;

pub use domain::{
    host::{is_blocked_host, BlockReason, HostClassification, HostGuard},
    url::{normalize_url, NormalizedUrl, ValidationError, MAX_URL_LENGTH},
    window::{CountingWindow, RateLimitDecision, RateLimitRecord, WindowError},
};

pub use application::{
    limiter::{BuildError, RateLimiter, RateLimiterBuilder, DEFAULT_MAX_ENTRIES},
    metrics::{Metrics, MetricsSnapshot},
    pipeline::{
        ErrorCode, Pipeline, PipelineError, PipelineSettings, Served, Stage, StageObserver,
    },
    ports::{
        CacheError, Clock, ContentCache, FetchError, Fetcher, Storage, SummarizationError,
        Summarizer,
    },
    quota::{QuotaSet, RateLimitError},
    sweeper::{ShutdownError, SweeperHandle},
};

pub use infrastructure::{
    cache::InMemoryContentCache,
    clock::SystemClock,
    config::{ConfigError, PerimeterConfig, PipelineConfig, WindowConfig},
    resolve::{resolve_and_check, resolve_within},
    storage::FifoStorage,
};
