// src/publish/mod.rs
//
// Rate-limited posting of the current headline to the external platform.
// One call = one bounded attempt loop; retry depth is carried explicitly,
// never by recursion. A provider-reported rate limit ends the call and
// reschedules via the provider's own hint, capped at the configured
// ceiling.

pub mod platform;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PublishConfig;
use crate::error::FeedError;
use crate::images::encode;
use crate::item::{truncate_chars, ContentItem};
use platform::{PlatformError, PublishPlatform};

/// Per-publisher posting state. `next_allowed_at` only ever moves forward:
/// a successful post advances it by the fixed interval, a rate-limit
/// response by the provider's hint (capped).
#[derive(Debug, Clone, Default)]
pub struct PublishState {
    pub last_post_at: Option<DateTime<Utc>>,
    pub next_allowed_at: Option<DateTime<Utc>>,
}

/// Optional caption generation; the publisher falls back to a
/// deterministic template when absent or failing.
#[async_trait]
pub trait CaptionWriter: Send + Sync {
    async fn caption(&self, item: &ContentItem) -> anyhow::Result<String>;
}

pub struct Publisher {
    cfg: PublishConfig,
    platform: Arc<dyn PublishPlatform>,
    captions: Option<Arc<dyn CaptionWriter>>,
    jpeg_quality: u8,
    state: PublishState,
    check_cache: Option<(DateTime<Utc>, bool)>,
}

impl Publisher {
    pub fn new(
        cfg: PublishConfig,
        platform: Arc<dyn PublishPlatform>,
        captions: Option<Arc<dyn CaptionWriter>>,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            cfg,
            platform,
            captions,
            jpeg_quality,
            state: PublishState::default(),
            check_cache: None,
        }
    }

    pub fn state(&self) -> &PublishState {
        &self.state
    }

    /// Post the headline item. Returns false without any side effect while
    /// the inter-post interval (or a rate-limit hold) is still running.
    pub async fn post_headline(&mut self, item: &ContentItem) -> bool {
        let now = Utc::now();
        if let Some(next) = self.state.next_allowed_at {
            if now < next {
                debug!(next_allowed = %next, "publish gated by interval");
                return false;
            }
        }

        match self.try_post(item, now).await {
            Ok(()) => {
                counter!("publish_posts_total").increment(1);
                info!(title = %item.title, "posted headline");
                true
            }
            Err(e) => {
                counter!("publish_failures_total").increment(1);
                warn!(error = %e, title = %item.title, "publish failed");
                false
            }
        }
    }

    async fn try_post(&mut self, item: &ContentItem, now: DateTime<Utc>) -> crate::error::Result<()> {
        let mut text = self.compose(item).await;

        // Watermarked throwaway copy; removed again whatever the outcome.
        let media = self.watermarked_media(item);

        let attempt_budget = Duration::from_secs(self.cfg.attempt_timeout_secs);
        let mut mutated_for_duplicate = false;
        let mut attempt: u32 = 0;
        let outcome = loop {
            let call = self.platform.create_post(&text, media.as_deref());
            let result = match timeout(attempt_budget, call).await {
                Ok(r) => r,
                Err(_) => Err(PlatformError::Unavailable(format!(
                    "attempt timed out after {}s",
                    self.cfg.attempt_timeout_secs
                ))),
            };

            match result {
                Ok(()) => {
                    self.state.last_post_at = Some(now);
                    self.state.next_allowed_at =
                        Some(now + ChronoDuration::seconds(self.cfg.post_interval_secs as i64));
                    break Ok(());
                }
                Err(PlatformError::RateLimited { reset_secs }) => {
                    let hold = reset_secs.min(self.cfg.reset_ceiling_secs);
                    self.state.next_allowed_at =
                        Some(now + ChronoDuration::seconds(hold as i64));
                    counter!("publish_rate_limited_total").increment(1);
                    break Err(FeedError::RateLimited { reset_secs: hold });
                }
                Err(PlatformError::Duplicate) => {
                    if mutated_for_duplicate {
                        counter!("publish_duplicates_total").increment(1);
                        break Err(FeedError::DuplicateRejected);
                    }
                    // One in-call retry with a mutated message.
                    mutated_for_duplicate = true;
                    text = format!("{text} {}", now.format("%H:%M:%S"));
                    continue;
                }
                Err(PlatformError::Unavailable(msg)) => {
                    if attempt >= self.cfg.max_retries {
                        // Short retry window so the next scheduled pass may try again.
                        self.state.next_allowed_at = Some(
                            now + ChronoDuration::seconds(self.cfg.backoff_cap_secs as i64),
                        );
                        break Err(FeedError::SourceUnavailable(msg));
                    }
                    let backoff = 2u64
                        .saturating_pow(attempt)
                        .min(self.cfg.backoff_cap_secs);
                    debug!(attempt, backoff_secs = backoff, error = %msg, "publish retry");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        };

        if let Some(path) = media {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(error = %e, path = %path.display(), "watermark cleanup");
            }
        }

        outcome
    }

    async fn compose(&self, item: &ContentItem) -> String {
        if let Some(writer) = &self.captions {
            match writer.caption(item).await {
                Ok(caption) if !caption.trim().is_empty() => {
                    return truncate_chars(caption.trim(), self.cfg.max_post_chars);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "caption generation failed, using fallback"),
            }
        }
        self.fallback_caption(item)
    }

    fn fallback_caption(&self, item: &ContentItem) -> String {
        let suffix = format!("\n\nRead more: {}", self.cfg.site_url);
        let room = self.cfg.max_post_chars.saturating_sub(suffix.chars().count());
        format!("{}{suffix}", truncate_chars(&item.title, room))
    }

    fn watermarked_media(&self, item: &ContentItem) -> Option<PathBuf> {
        let path = item.image_path.as_deref().map(PathBuf::from)?;
        if !path.exists() {
            return None;
        }
        match encode::watermark_copy(&path, self.jpeg_quality) {
            Ok(p) => Some(p),
            Err(e) => {
                // Post without the image rather than not at all.
                warn!(error = %e, path = %path.display(), "watermark failed");
                None
            }
        }
    }

    /// Cached connection verdict while still inside the TTL window.
    pub fn cached_connection(&self) -> Option<bool> {
        let (at, verdict) = self.check_cache?;
        ((Utc::now() - at).num_seconds() < self.cfg.check_ttl_secs as i64).then_some(verdict)
    }

    pub fn note_connection(&mut self, verdict: bool) {
        self.check_cache = Some((Utc::now(), verdict));
    }

    pub fn platform(&self) -> Arc<dyn PublishPlatform> {
        self.platform.clone()
    }

    pub fn attempt_budget(&self) -> Duration {
        Duration::from_secs(self.cfg.attempt_timeout_secs)
    }

    /// Cheap connection check cached for a TTL window so a status page
    /// cannot trip platform rate limits. Callers sharing this publisher
    /// behind a lock should use `cached_connection` + `probe_platform` +
    /// `note_connection` instead, keeping the network call outside it.
    pub async fn check_connection(&mut self) -> bool {
        if let Some(verdict) = self.cached_connection() {
            return verdict;
        }
        let verdict = probe_platform(self.platform.as_ref(), self.attempt_budget()).await;
        self.note_connection(verdict);
        verdict
    }
}

/// Timeout-bounded credential probe. A rate-limit answer counts as
/// connected.
pub async fn probe_platform(platform: &dyn PublishPlatform, budget: Duration) -> bool {
    match timeout(budget, platform.verify()).await {
        Ok(Ok(())) => true,
        Ok(Err(PlatformError::RateLimited { .. })) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "connection check failed");
            false
        }
        Err(_) => {
            warn!("connection check timed out");
            false
        }
    }
}
