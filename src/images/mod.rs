// src/images/mod.rs
//
// Image resolution and the content-addressed disk cache. For each item the
// resolver tries, in order: an existing cache file, the item's own image
// URL, social-preview meta tags scraped from the source page, and finally
// an external keyword search. The same source hash never causes a second
// network fetch or disk write within the process lifetime.

pub mod encode;
pub mod search;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ImageConfig;
use crate::item::sha256_hex;
use crate::source::RawItem;
use search::ImageSearch;

#[derive(Debug, Clone)]
pub struct ImageCacheRecord {
    pub source_hash: String,
    pub file_path: PathBuf,
    pub cached_at: DateTime<Utc>,
}

/// Network seam for the resolver so tests run fixture-only.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn get_text(&self, url: &str) -> anyhow::Result<String>;
    async fn get_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; headliner/0.1)")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn get_text(&self, url: &str) -> anyhow::Result<String> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }

    async fn get_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

pub struct ImageResolver {
    cfg: ImageConfig,
    fetcher: Arc<dyn RemoteFetcher>,
    search: Option<Arc<dyn ImageSearch>>,
    records: HashMap<String, ImageCacheRecord>,
    /// Image URLs already illustrated in the current refresh cycle; keeps
    /// unrelated items in one batch from sharing a stock photo.
    used_images: HashSet<String>,
}

impl ImageResolver {
    pub fn new(
        cfg: ImageConfig,
        fetcher: Arc<dyn RemoteFetcher>,
        search: Option<Arc<dyn ImageSearch>>,
    ) -> Self {
        Self {
            cfg,
            fetcher,
            search,
            records: HashMap::new(),
            used_images: HashSet::new(),
        }
    }

    /// Called at the start of every refresh cycle.
    pub fn begin_cycle(&mut self) {
        self.used_images.clear();
    }

    /// Resolve an illustrative image for the item onto disk. `None` is not
    /// an error: the item still ships, just without an image.
    pub async fn resolve(&mut self, item: &RawItem) -> Option<PathBuf> {
        let key = sha256_hex(item.image_url.as_deref().unwrap_or(&item.title));
        let path = self.cfg.cache_dir.join(format!("{key}.jpg"));

        // Cache hit: same source never downloads twice.
        if let Some(rec) = self.records.get(&key) {
            if rec.file_path.exists() {
                counter!("images_cache_hits_total").increment(1);
                return Some(rec.file_path.clone());
            }
        }
        if path.exists() {
            counter!("images_cache_hits_total").increment(1);
            self.record(key, path.clone());
            return Some(path);
        }

        if let Err(e) = std::fs::create_dir_all(&self.cfg.cache_dir) {
            warn!(error = %e, dir = %self.cfg.cache_dir.display(), "image cache dir");
            return None;
        }

        // 1) The item carries a direct image URL.
        if let Some(url) = item.image_url.clone() {
            if let Some(p) = self.cache_from_url(&url, &key, &path).await {
                return Some(p);
            }
        }

        // 2) Scrape the source page for social-preview meta tags.
        if !item.link.is_empty() {
            match self.fetcher.get_text(&item.link).await {
                Ok(html) => {
                    if let Some(url) = meta_image(&html) {
                        if let Some(p) = self.cache_from_url(&url, &key, &path).await {
                            return Some(p);
                        }
                    }
                }
                Err(e) => debug!(error = %e, url = %item.link, "source page fetch"),
            }
        }

        // 3) Keyword search, skipping images already used this cycle.
        if let Some(search) = self.search.clone() {
            let query = keyword_query(&item.title);
            match search.search(&query).await {
                Ok(candidates) => {
                    for url in candidates {
                        if self.used_images.contains(&url) {
                            continue;
                        }
                        if let Some(p) = self.cache_from_url(&url, &key, &path).await {
                            self.used_images.insert(url);
                            return Some(p);
                        }
                    }
                }
                Err(e) => warn!(error = %e, query = %query, "image search"),
            }
        }

        counter!("images_unresolved_total").increment(1);
        None
    }

    async fn cache_from_url(&mut self, url: &str, key: &str, path: &Path) -> Option<PathBuf> {
        let bytes = match self.fetcher.get_bytes(url).await {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, url, "image download");
                return None;
            }
        };
        let jpeg = match encode::normalize_jpeg(&bytes, self.cfg.max_edge, self.cfg.jpeg_quality) {
            Ok(j) => j,
            Err(e) => {
                debug!(error = %e, url, "image normalize");
                return None;
            }
        };
        if let Err(e) = std::fs::write(path, jpeg) {
            warn!(error = %e, path = %path.display(), "image cache write");
            return None;
        }
        counter!("images_cached_total").increment(1);
        self.record(key.to_string(), path.to_path_buf());
        Some(path.to_path_buf())
    }

    fn record(&mut self, key: String, file_path: PathBuf) {
        self.records.insert(
            key.clone(),
            ImageCacheRecord {
                source_hash: key,
                file_path,
                cached_at: Utc::now(),
            },
        );
    }

    /// Watermark an already-cached file for outbound posting. The caller
    /// deletes the derived file after use.
    pub fn watermark(&self, path: &Path) -> anyhow::Result<PathBuf> {
        encode::watermark_copy(path, self.cfg.jpeg_quality)
    }

    /// Delete cache files older than the retention window; returns the count.
    pub fn cleanup(&self, retention: Duration) -> usize {
        let mut removed = 0usize;
        let entries = match std::fs::read_dir(&self.cfg.cache_dir) {
            Ok(e) => e,
            Err(_) => return 0,
        };
        let now = std::time::SystemTime::now();
        for entry in entries.flatten() {
            let p = entry.path();
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, path = %p.display(), "cleanup stat");
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age > retention {
                match std::fs::remove_file(&p) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(error = %e, path = %p.display(), "cleanup remove"),
                }
            }
        }
        counter!("images_cleaned_total").increment(removed as u64);
        removed
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.cfg.retention_hours * 3600)
    }
}

/// Extract a social-preview image URL from page HTML. Checks og:image,
/// og:image:secure_url, twitter:image and itemprop=image, both attribute
/// orders.
pub fn meta_image(html: &str) -> Option<String> {
    static RE_FWD: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_fwd = RE_FWD.get_or_init(|| {
        regex::Regex::new(
            r#"(?i)<meta[^>]+(?:property|name|itemprop)=["'](?:og:image(?::secure_url)?|twitter:image|image)["'][^>]*content=["']([^"']+)["']"#,
        )
        .unwrap()
    });
    if let Some(caps) = re_fwd.captures(html) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    static RE_REV: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_rev = RE_REV.get_or_init(|| {
        regex::Regex::new(
            r#"(?i)<meta[^>]+content=["']([^"']+)["'][^>]*(?:property|name|itemprop)=["'](?:og:image(?::secure_url)?|twitter:image|image)["']"#,
        )
        .unwrap()
    });
    re_rev
        .captures(html)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
}

const STOPWORDS: &[&str] = &["the", "and", "for", "that", "with", "this", "from"];

/// Top three significant title words plus a "news" qualifier.
pub fn keyword_query(title: &str) -> String {
    let words: Vec<String> = title
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(&w.as_str()))
        .take(3)
        .collect();
    if words.is_empty() {
        "news".to_string()
    } else {
        format!("{} news", words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_image_handles_both_attribute_orders() {
        let fwd = r#"<head><meta property="og:image" content="https://i/1.jpg"></head>"#;
        assert_eq!(meta_image(fwd).as_deref(), Some("https://i/1.jpg"));

        let rev = r#"<meta content="https://i/2.jpg" name="twitter:image">"#;
        assert_eq!(meta_image(rev).as_deref(), Some("https://i/2.jpg"));

        assert_eq!(meta_image("<p>no tags</p>"), None);
    }

    #[test]
    fn keyword_query_filters_stopwords_and_short_words() {
        let q = keyword_query("The Markets Rally From a Slow Start");
        assert_eq!(q, "markets rally slow news");
        assert_eq!(keyword_query("a an of"), "news");
    }
}
