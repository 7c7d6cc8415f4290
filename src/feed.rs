// src/feed.rs
//
// The content cache and its refresh engine. Cache expiry is cheap and
// storage-backed; content refresh is expensive and network-backed, and only
// the orchestrator (or an explicit force) triggers it. A failed refresh
// never blanks the served feed.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, gauge};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::config::ScheduleConfig;
use crate::dedup::DedupLedger;
use crate::error::{FeedError, Result};
use crate::images::ImageResolver;
use crate::item::{CacheEntry, ContentItem, SUPPORTING_CAP};
use crate::source::{ContentSource, RawItem};
use crate::store::ContentStore;

/// Read-only snapshot of the current cache entry for the render path and
/// the ops surface. Reading never touches storage or the network.
#[derive(Clone, Default)]
pub struct CacheHandle(Arc<RwLock<Option<CacheEntry>>>);

impl CacheHandle {
    pub fn get(&self) -> Option<CacheEntry> {
        self.0.read().expect("cache handle poisoned").clone()
    }

    fn set(&self, entry: CacheEntry) {
        *self.0.write().expect("cache handle poisoned") = Some(entry);
    }
}

pub struct FeedCache {
    schedule: ScheduleConfig,
    source: Arc<dyn ContentSource>,
    store: Arc<dyn ContentStore>,
    dedup: DedupLedger,
    images: ImageResolver,
    entry: Option<CacheEntry>,
    handle: CacheHandle,
    last_fetch: Option<DateTime<Utc>>,
}

impl FeedCache {
    pub fn new(
        schedule: ScheduleConfig,
        source: Arc<dyn ContentSource>,
        store: Arc<dyn ContentStore>,
        dedup: DedupLedger,
        images: ImageResolver,
    ) -> Self {
        Self {
            schedule,
            source,
            store,
            dedup,
            images,
            entry: None,
            handle: CacheHandle::default(),
            last_fetch: None,
        }
    }

    pub fn handle(&self) -> CacheHandle {
        self.handle.clone()
    }

    pub fn images(&self) -> &ImageResolver {
        &self.images
    }

    /// Run one refresh cycle. Returns true when the served feed is valid
    /// afterwards (including "nothing newer, kept as-is"), false on failure.
    pub async fn refresh(&mut self, force: bool) -> bool {
        counter!("refresh_runs_total").increment(1);
        match self.try_refresh(force).await {
            Ok(replaced) => {
                if replaced {
                    gauge!("feed_last_refresh_ts").set(Utc::now().timestamp() as f64);
                }
                true
            }
            Err(e) => {
                counter!("refresh_failures_total").increment(1);
                warn!(error = %e, "refresh failed, serving previous content");
                false
            }
        }
    }

    async fn try_refresh(&mut self, force: bool) -> Result<bool> {
        let now = Utc::now();

        // Unforced refreshes invoked outside the orchestrator are spaced out.
        if !force {
            if let Some(last) = self.last_fetch {
                if now - last < ChronoDuration::seconds(self.schedule.min_refresh_secs as i64) {
                    debug!("refresh skipped, within min interval");
                    return Ok(false);
                }
            }
        }
        self.last_fetch = Some(now);
        self.images.begin_cycle();

        let raw = self.source.fetch_latest().await?;
        if raw.is_empty() {
            return Err(FeedError::EmptyFeed);
        }

        // Distinct-fingerprint items not seen in any earlier cycle.
        let mut batch_fps = HashSet::new();
        let mut fresh: Vec<RawItem> = Vec::with_capacity(raw.len());
        for item in raw {
            let fp = item.fingerprint();
            if self.dedup.seen(&fp) || !batch_fps.insert(fp) {
                continue;
            }
            fresh.push(item);
        }
        if fresh.is_empty() {
            debug!("all fetched items already seen, keeping current feed");
            return Ok(false);
        }

        // Headline = most recent by published timestamp among survivors.
        fresh.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        let headline_raw = fresh.remove(0);

        if !force {
            if let Some(current) = self.current_headline().await {
                if headline_raw.published_at <= current.published_at {
                    debug!("no newer headline, keeping current feed");
                    return Ok(false);
                }
            }
        }

        // Supporting items with titles distinct from the headline and
        // from each other.
        let mut seen_titles: HashSet<String> = HashSet::new();
        seen_titles.insert(headline_raw.title.clone());
        let supporting_raw: Vec<RawItem> = fresh
            .into_iter()
            .filter(|it| seen_titles.insert(it.title.clone()))
            .take(SUPPORTING_CAP)
            .collect();

        let headline = self.build_item(&headline_raw, true, now).await;
        let mut supporting = Vec::with_capacity(supporting_raw.len());
        for raw_item in &supporting_raw {
            supporting.push(self.build_item(raw_item, false, now).await);
        }

        // One transactional replace; a failure leaves the previous feed
        // (and the previous cache entry) authoritative.
        let mut persisted = vec![headline.clone()];
        persisted.extend(supporting.iter().cloned());
        self.store
            .replace_all(persisted)
            .await
            .map_err(|e| FeedError::Persistence(e.to_string()))?;

        // Only after the commit: the ledger must not suppress items a
        // failed transaction never stored.
        self.dedup.mark_seen(headline.fingerprint());
        for item in &supporting {
            self.dedup.mark_seen(item.fingerprint());
        }

        let entry = CacheEntry {
            headline: Some(headline),
            supporting,
            populated_at: now,
            expires_at: now + ChronoDuration::seconds(self.schedule.cache_ttl_secs as i64),
        };
        self.handle.set(entry.clone());
        info!(
            supporting = entry.supporting.len(),
            "feed replaced with fresh content"
        );
        self.entry = Some(entry);
        Ok(true)
    }

    async fn build_item(&mut self, raw: &RawItem, is_headline: bool, now: DateTime<Utc>) -> ContentItem {
        let image_path = self
            .images
            .resolve(raw)
            .await
            .map(|p| p.to_string_lossy().to_string());
        ContentItem {
            id: raw.fingerprint().to_string(),
            title: raw.title.clone(),
            description: raw.description.clone(),
            source_url: raw.link.clone(),
            image_path,
            published_at: raw.published_at,
            source: raw.source_id.clone(),
            is_headline,
            fetched_at: now,
        }
    }

    async fn current_headline(&self) -> Option<ContentItem> {
        if let Some(entry) = &self.entry {
            if entry.headline.is_some() {
                return entry.headline.clone();
            }
        }
        self.store.headline().await.ok().flatten()
    }

    /// Serve the current view. Unexpired: in-memory, no storage access.
    /// Expired: repopulated from storage with a fresh expiry (never from
    /// the network). Storage empty or failing: the stale entry stands.
    pub async fn get_cached(&mut self) -> CacheEntry {
        let now = Utc::now();
        if let Some(entry) = &self.entry {
            if entry.is_fresh(now) {
                return entry.clone();
            }
        }

        match self.reload_from_store(now).await {
            Some(entry) => {
                self.handle.set(entry.clone());
                self.entry = Some(entry.clone());
                entry
            }
            None => self.entry.clone().unwrap_or(CacheEntry {
                headline: None,
                supporting: Vec::new(),
                populated_at: now,
                expires_at: now,
            }),
        }
    }

    async fn reload_from_store(&self, now: DateTime<Utc>) -> Option<CacheEntry> {
        let headline = match self.store.headline().await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "cache reload: headline query failed");
                return None;
            }
        };
        let supporting = match self.store.supporting(SUPPORTING_CAP).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "cache reload: supporting query failed");
                return None;
            }
        };
        if headline.is_none() && supporting.is_empty() {
            return None;
        }
        Some(CacheEntry {
            headline,
            supporting,
            populated_at: now,
            expires_at: now + ChronoDuration::seconds(self.schedule.cache_ttl_secs as i64),
        })
    }

    /// Image-cache retention sweep, driven by the orchestrator.
    pub fn cleanup_images(&self) -> usize {
        self.images.cleanup(self.images.retention())
    }
}
