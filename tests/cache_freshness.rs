// tests/cache_freshness.rs
//
// Cache reads vs. storage: an unexpired entry is served from memory with
// zero storage traffic; expiry repopulates from storage (never from the
// network); an empty store yields an empty entry instead of an error.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use headliner::config::{ImageConfig, ScheduleConfig};
use headliner::dedup::DedupLedger;
use headliner::error::Result;
use headliner::feed::FeedCache;
use headliner::images::{ImageResolver, RemoteFetcher};
use headliner::item::ContentItem;
use headliner::source::{ContentSource, RawItem};
use headliner::store::{ContentStore, MemoryStore};

struct OfflineFetcher;

#[async_trait]
impl RemoteFetcher for OfflineFetcher {
    async fn get_text(&self, _url: &str) -> anyhow::Result<String> {
        anyhow::bail!("offline")
    }

    async fn get_bytes(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("offline")
    }
}

struct OneShotSource {
    items: Vec<RawItem>,
}

#[async_trait]
impl ContentSource for OneShotSource {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
        Ok(self.items.clone())
    }

    fn name(&self) -> &'static str {
        "one-shot"
    }
}

/// Store wrapper that counts read traffic.
struct CountingStore {
    inner: MemoryStore,
    reads: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            reads: AtomicUsize::new(0),
        }
    }

    fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for CountingStore {
    async fn replace_all(&self, items: Vec<ContentItem>) -> Result<()> {
        self.inner.replace_all(items).await
    }

    async fn headline(&self) -> Result<Option<ContentItem>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.headline().await
    }

    async fn supporting(&self, limit: usize) -> Result<Vec<ContentItem>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.supporting(limit).await
    }
}

fn raw(title: &str) -> RawItem {
    RawItem {
        title: title.to_string(),
        description: format!("{title} body"),
        link: String::new(),
        image_url: None,
        published_at: DateTime::<Utc>::from_timestamp(1_756_500_000, 0).unwrap(),
        source_id: "wire".to_string(),
    }
}

fn feed_with_ttl(store: Arc<dyn ContentStore>, ttl_secs: u64, tmp: &TempDir) -> FeedCache {
    let schedule = ScheduleConfig {
        cache_ttl_secs: ttl_secs,
        min_refresh_secs: 0,
        ..Default::default()
    };
    let images = ImageResolver::new(
        ImageConfig {
            cache_dir: tmp.path().to_path_buf(),
            ..Default::default()
        },
        Arc::new(OfflineFetcher),
        None,
    );
    let source = Arc::new(OneShotSource {
        items: vec![raw("Fresh headline")],
    });
    FeedCache::new(schedule, source, store, DedupLedger::new(), images)
}

#[tokio::test]
async fn unexpired_entry_is_served_without_storage_reads() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(CountingStore::new());
    let mut feed = feed_with_ttl(store.clone(), 3_600, &tmp);

    assert!(feed.refresh(true).await);
    let baseline = store.read_count();

    for _ in 0..3 {
        let entry = feed.get_cached().await;
        assert_eq!(entry.headline.as_ref().unwrap().title, "Fresh headline");
    }
    assert_eq!(store.read_count(), baseline);
}

#[tokio::test]
async fn expired_entry_repopulates_from_storage() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(CountingStore::new());
    // TTL of zero: every populated entry is immediately stale.
    let mut feed = feed_with_ttl(store.clone(), 0, &tmp);

    assert!(feed.refresh(true).await);
    let baseline = store.read_count();

    let entry = feed.get_cached().await;
    assert_eq!(entry.headline.as_ref().unwrap().title, "Fresh headline");
    assert!(store.read_count() > baseline);
}

#[tokio::test]
async fn empty_store_yields_empty_entry() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(CountingStore::new());
    let mut feed = feed_with_ttl(store.clone(), 3_600, &tmp);

    let entry = feed.get_cached().await;
    assert!(entry.headline.is_none());
    assert!(entry.supporting.is_empty());
}
