//! In-process content cache.

use async_trait::async_trait;

use crate::application::ports::{CacheError, ContentCache, Storage};
use crate::infrastructure::storage::FifoStorage;

/// [`ContentCache`] held in memory with a size bound.
///
/// Entries never expire; when full, the oldest-inserted entry is dropped.
/// Construct one per process and share it between pipelines.
#[derive(Debug)]
pub struct InMemoryContentCache {
    entries: FifoStorage<String, String>,
}

impl InMemoryContentCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: FifoStorage::new(max_entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl ContentCache for InMemoryContentCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(&key.to_owned()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries.with_entry_mut(
            key.to_owned(),
            String::new,
            |stored| value.clone_into(stored),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = InMemoryContentCache::new(8);
        assert_eq!(cache.get("https://example.com/").await, Ok(None));

        cache.set("https://example.com/", "first").await.unwrap();
        cache.set("https://example.com/", "second").await.unwrap();
        assert_eq!(
            cache.get("https://example.com/").await,
            Ok(Some("second".to_string()))
        );
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_bounded() {
        let cache = InMemoryContentCache::new(2);
        for i in 0..5 {
            cache.set(&format!("k{}", i), "v").await.unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("k0").await, Ok(None));
        assert_eq!(cache.get("k4").await, Ok(Some("v".to_string())));

        cache.clear();
        assert!(cache.is_empty());
    }
}
