//! Ports (interfaces) for the application layer.
//!
//! The limiter depends on [`Clock`] and [`Storage`]; the pipeline depends on the
//! three external collaborators [`ContentCache`], [`Fetcher`] and [`Summarizer`].
//! Infrastructure adapters and test doubles implement them.

use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::domain::url::NormalizedUrl;

/// Port for obtaining current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Port for a concurrent key-value store with a size bound.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Run `accessor` with mutable access to the value for `key`, creating it with
    /// `factory` if absent. Access to a single key is serialized.
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool;

    fn clear(&self);

    /// Remove entries for which the predicate returns false and return how many
    /// were removed.
    fn retain<F>(&self, f: F) -> usize
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Failure of the content cache collaborator. Never fatal to a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cache unavailable: {0}")]
pub struct CacheError(pub String);

/// Downstream content cache, keyed by normalized URL.
#[async_trait]
pub trait ContentCache: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Failure of the fetch collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream responded with status {0}")]
    Status(u16),
}

/// Timed retrieval of a page's text content.
///
/// The pipeline applies its own deadline around this call and drops the future
/// when it expires, so an implementation only needs to be cancel-safe.
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    async fn fetch(&self, url: &NormalizedUrl, timeout: Duration) -> Result<String, FetchError>;
}

/// Failure of the summarization collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizationError {
    #[error("summarization timed out after {0:?}")]
    Timeout(Duration),
    #[error("model error: {0}")]
    Model(String),
    #[error("model returned an empty summary")]
    Empty,
}

/// Summarization of text already known to clear the minimum length.
#[async_trait]
pub trait Summarizer: Send + Sync + Debug {
    async fn summarize(&self, text: &str) -> Result<String, SummarizationError>;
}
