//! Scripted doubles for the pipeline's external collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{
    CacheError, ContentCache, FetchError, Fetcher, SummarizationError, Summarizer,
};
use crate::domain::url::NormalizedUrl;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .expect("mock mutex poisoned - a test thread panicked while holding the lock")
}

/// Counts a call as cancelled if its future is dropped before completing.
struct InFlight<'a> {
    cancelled: &'a AtomicUsize,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Fixed response plus timing shared by the fetcher and summarizer doubles.
#[derive(Debug, Clone)]
struct Script<T, E> {
    response: Result<T, E>,
    delay: Option<Duration>,
    hang: bool,
    calls: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<String>>>,
}

impl<T: Clone, E: Clone> Script<T, E> {
    fn new(response: Result<T, E>) -> Self {
        Self {
            response,
            delay: None,
            hang: false,
            calls: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn play(&self, input: &str) -> Result<T, E> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.inputs).push(input.to_string());

        let mut in_flight = InFlight {
            cancelled: &self.cancelled,
            done: false,
        };
        if self.hang {
            std::future::pending::<()>().await;
        } else if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        in_flight.done = true;

        self.response.clone()
    }
}

/// [`Fetcher`] returning a fixed result.
///
/// Clones share call counters, so keep a clone to inspect after handing one
/// to a pipeline.
#[derive(Debug, Clone)]
pub struct MockFetcher {
    script: Script<String, FetchError>,
}

impl MockFetcher {
    pub fn returning(content: impl Into<String>) -> Self {
        Self {
            script: Script::new(Ok(content.into())),
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            script: Script::new(Err(error)),
        }
    }

    /// A fetcher whose calls never complete.
    pub fn hanging() -> Self {
        let mut fetcher = Self::returning("");
        fetcher.script.hang = true;
        fetcher
    }

    /// Wait `delay` before responding.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    /// Calls whose future was dropped before they completed.
    pub fn cancelled(&self) -> usize {
        self.script.cancelled.load(Ordering::SeqCst)
    }

    /// URLs passed to `fetch`, in call order.
    pub fn requested(&self) -> Vec<String> {
        lock(&self.script.inputs).clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &NormalizedUrl, _timeout: Duration) -> Result<String, FetchError> {
        self.script.play(url.as_str()).await
    }
}

/// [`Summarizer`] returning a fixed result.
#[derive(Debug, Clone)]
pub struct MockSummarizer {
    script: Script<String, SummarizationError>,
}

impl MockSummarizer {
    pub fn returning(summary: impl Into<String>) -> Self {
        Self {
            script: Script::new(Ok(summary.into())),
        }
    }

    pub fn failing(error: SummarizationError) -> Self {
        Self {
            script: Script::new(Err(error)),
        }
    }

    pub fn hanging() -> Self {
        let mut summarizer = Self::returning("");
        summarizer.script.hang = true;
        summarizer
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.script.cancelled.load(Ordering::SeqCst)
    }

    /// Texts passed to `summarize`, in call order.
    pub fn inputs(&self) -> Vec<String> {
        lock(&self.script.inputs).clone()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizationError> {
        self.script.play(text).await
    }
}

/// [`ContentCache`] backed by a shared map, with switchable failures.
#[derive(Debug, Clone, Default)]
pub struct MockCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_reads: bool,
    fail_writes: bool,
    hang_reads: bool,
    hang_writes: bool,
    gets: Arc<AtomicUsize>,
    sets: Arc<AtomicUsize>,
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload an entry.
    pub fn with_entry(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        lock(&self.entries).insert(key.into(), value.into());
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Reads that never complete.
    pub fn hanging_reads(mut self) -> Self {
        self.hang_reads = true;
        self
    }

    /// Writes that never complete.
    pub fn hanging_writes(mut self) -> Self {
        self.hang_writes = true;
        self
    }

    pub fn entry(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentCache for MockCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.hang_reads {
            std::future::pending::<()>().await;
        }
        if self.fail_reads {
            return Err(CacheError("read refused".into()));
        }
        Ok(self.entry(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.hang_writes {
            std::future::pending::<()>().await;
        }
        if self.fail_writes {
            return Err(CacheError("write refused".into()));
        }
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }
}
