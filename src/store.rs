// src/store.rs
//
// Storage boundary for the persisted feed. The core only needs three
// operations; anything heavier (a real database, migrations) lives behind
// this trait. `replace_all` is all-or-nothing: a failure must never leave
// the feed deleted-but-not-reinserted.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::{FeedError, Result};
use crate::item::ContentItem;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Transactional delete-all + insert of the new feed.
    async fn replace_all(&self, items: Vec<ContentItem>) -> Result<()>;

    async fn headline(&self) -> Result<Option<ContentItem>>;

    async fn supporting(&self, limit: usize) -> Result<Vec<ContentItem>>;
}

/// In-process store. The whole vector is swapped under one lock, so the
/// replace is atomic by construction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<ContentItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().expect("store lock poisoned").len()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn replace_all(&self, items: Vec<ContentItem>) -> Result<()> {
        let mut guard = self
            .items
            .lock()
            .map_err(|_| FeedError::Persistence("store lock poisoned".to_string()))?;
        *guard = items;
        Ok(())
    }

    async fn headline(&self) -> Result<Option<ContentItem>> {
        let guard = self
            .items
            .lock()
            .map_err(|_| FeedError::Persistence("store lock poisoned".to_string()))?;
        Ok(guard.iter().find(|it| it.is_headline).cloned())
    }

    async fn supporting(&self, limit: usize) -> Result<Vec<ContentItem>> {
        let guard = self
            .items
            .lock()
            .map_err(|_| FeedError::Persistence("store lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|it| !it.is_headline)
            .take(limit)
            .cloned()
            .collect())
    }
}
