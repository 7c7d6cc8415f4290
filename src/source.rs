// src/source.rs
//
// Stateless client for the external content API. Returns normalized raw
// items; non-200 responses and empty result arrays are fetch failures so
// the caller's backoff kicks in.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use crate::config::SourceConfig;
use crate::error::{FeedError, Result};
use crate::item::{normalize_text, Fingerprint};

/// One raw item as delivered by the content source, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub description: String,
    pub link: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub source_id: String,
}

impl RawItem {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.title, &self.description)
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct SourceResponse {
    #[serde(default)]
    results: Vec<SourceArticle>,
}

#[derive(Debug, Deserialize)]
struct SourceArticle {
    title: Option<String>,
    description: Option<String>,
    link: Option<String>,
    image_url: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    source_id: Option<String>,
}

/// The source reports timestamps either as RFC 3339 or as a bare
/// `YYYY-MM-DD HH:MM:SS` UTC string; unparseable dates sort last.
fn parse_pub_date(ts: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc();
    }
    DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default()
}

fn items_from_response(resp: SourceResponse) -> Vec<RawItem> {
    let mut out = Vec::with_capacity(resp.results.len());
    for art in resp.results {
        let title = normalize_text(&art.title.unwrap_or_default());
        if title.is_empty() {
            continue;
        }
        out.push(RawItem {
            title,
            description: normalize_text(&art.description.unwrap_or_default()),
            link: art.link.unwrap_or_default(),
            image_url: art.image_url.filter(|u| !u.is_empty()),
            published_at: art
                .pub_date
                .as_deref()
                .map(parse_pub_date)
                .unwrap_or_default(),
            source_id: art.source_id.unwrap_or_else(|| "unknown".to_string()),
        });
    }
    counter!("source_items_total").increment(out.len() as u64);
    out
}

pub struct NewsApiClient {
    cfg: SourceConfig,
    client: reqwest::Client,
}

impl NewsApiClient {
    pub fn new(cfg: SourceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { cfg, client }
    }
}

#[async_trait]
impl ContentSource for NewsApiClient {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
        let resp = self
            .client
            .get(&self.cfg.endpoint)
            .query(&[
                ("apikey", self.cfg.api_key.as_str()),
                ("country", self.cfg.country.as_str()),
                ("language", self.cfg.language.as_str()),
                ("category", self.cfg.category.as_str()),
                ("size", &self.cfg.page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                counter!("source_errors_total").increment(1);
                FeedError::SourceUnavailable(format!("content api request failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            counter!("source_errors_total").increment(1);
            return Err(FeedError::SourceUnavailable(format!(
                "content api returned {status}"
            )));
        }

        let parsed: SourceResponse = resp.json().await.map_err(|e| {
            counter!("source_errors_total").increment(1);
            FeedError::SourceUnavailable(format!("content api body unreadable: {e}"))
        })?;

        let items = items_from_response(parsed);
        if items.is_empty() {
            return Err(FeedError::EmptyFeed);
        }
        let take = self.cfg.page_size.min(items.len());
        Ok(items.into_iter().take(take).collect())
    }

    fn name(&self) -> &'static str {
        "news-api"
    }
}

/// Fixture-backed source for tests and offline runs; holds the JSON body
/// the HTTP client would have received.
pub struct FixtureSource {
    body: String,
}

impl FixtureSource {
    pub fn from_json(body: &str) -> Self {
        Self {
            body: body.to_string(),
        }
    }
}

#[async_trait]
impl ContentSource for FixtureSource {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
        let parsed: SourceResponse = serde_json::from_str(&self.body)
            .map_err(|e| FeedError::SourceUnavailable(format!("fixture parse: {e}")))?;
        let items = items_from_response(parsed);
        if items.is_empty() {
            return Err(FeedError::EmptyFeed);
        }
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_date_accepts_both_source_formats() {
        let a = parse_pub_date("2026-08-30T10:15:00Z");
        let b = parse_pub_date("2026-08-30 10:15:00");
        assert_eq!(a, b);
        assert_eq!(parse_pub_date("garbage").timestamp(), 0);
    }

    #[tokio::test]
    async fn fixture_source_normalizes_and_skips_untitled() {
        let body = r#"{"results":[
            {"title":"A &amp; B","description":"<p>desc</p>","link":"https://x/1",
             "pubDate":"2026-08-30 10:00:00","source_id":"wire"},
            {"description":"no title","link":"https://x/2"}
        ]}"#;
        let items = FixtureSource::from_json(body).fetch_latest().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "A & B");
        assert_eq!(items[0].description, "desc");
        assert_eq!(items[0].source_id, "wire");
    }

    #[tokio::test]
    async fn empty_results_are_a_fetch_failure() {
        let err = FixtureSource::from_json(r#"{"results":[]}"#)
            .fetch_latest()
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::EmptyFeed));
    }
}
