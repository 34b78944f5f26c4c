use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;

use super::CacheStore;
use crate::error::Result;

/// In-process store with optional LRU bound.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<(String, String), Entry>,
    max_entries: Option<usize>,
}

struct Entry {
    bytes: Vec<u8>,
    last_accessed: Instant,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_entries`, evicting the least recently used.
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                entries: HashMap::new(),
                max_entries: Some(max_entries.max(1)),
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clear();
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn lookup(&self, key: &str, format: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .entries
            .get_mut(&(key.to_string(), format.to_string()))
            .map(|entry| {
                entry.last_accessed = Instant::now();
                entry.bytes.clone()
            }))
    }

    async fn store(&self, key: &str, format: &str, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = (key.to_string(), format.to_string());

        if let Some(max) = inner.max_entries {
            if !inner.entries.contains_key(&id) && inner.entries.len() >= max {
                if let Some(lru) = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_accessed)
                    .map(|(id, _)| id.clone())
                {
                    inner.entries.remove(&lru);
                }
            }
        }

        inner.entries.insert(
            id,
            Entry {
                bytes: bytes.to_vec(),
                last_accessed: Instant::now(),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str, format: &str) -> Result<()> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(&(key.to_string(), format.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_are_keyed_by_format() {
        let store = MemoryCacheStore::new();
        store.store("k", "mp3", &[1]).await.unwrap();

        assert_eq!(store.lookup("k", "mp3").await.unwrap(), Some(vec![1]));
        assert_eq!(store.lookup("k", "pcm").await.unwrap(), None);
        assert_eq!(store.location("k", "mp3"), None);
    }

    #[tokio::test]
    async fn bounded_store_evicts_least_recently_used() {
        let store = MemoryCacheStore::bounded(2);
        store.store("a", "mp3", &[1]).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.store("b", "mp3", &[2]).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.lookup("a", "mp3").await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.store("c", "mp3", &[3]).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.lookup("a", "mp3").await.unwrap().is_some());
        assert!(store.lookup("b", "mp3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwriting_does_not_evict() {
        let store = MemoryCacheStore::bounded(1);
        store.store("a", "mp3", &[1]).await.unwrap();
        store.store("a", "mp3", &[2]).await.unwrap();

        assert_eq!(store.lookup("a", "mp3").await.unwrap(), Some(vec![2]));
        store.clear();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn remove_drops_only_the_named_entry() {
        let store = MemoryCacheStore::new();
        store.store("k", "mp3", &[1]).await.unwrap();
        store.store("k", "pcm", &[2]).await.unwrap();

        store.remove("k", "mp3").await.unwrap();
        store.remove("absent", "mp3").await.unwrap();

        assert_eq!(store.lookup("k", "mp3").await.unwrap(), None);
        assert_eq!(store.lookup("k", "pcm").await.unwrap(), Some(vec![2]));
    }
}
