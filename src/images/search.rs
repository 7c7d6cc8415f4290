// src/images/search.rs
//
// External image-search provider: keyword query in, ranked candidate URLs
// out. The resolver treats it as the last attempt in its chain.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// Ranked candidate image URLs for a keyword query.
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    urls: SearchUrls,
}

#[derive(Debug, Deserialize)]
struct SearchUrls {
    regular: String,
}

pub struct StockPhotoClient {
    endpoint: String,
    key: String,
    client: reqwest::Client,
}

impl StockPhotoClient {
    pub fn new(endpoint: String, key: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            endpoint,
            key,
            client,
        }
    }
}

#[async_trait]
impl ImageSearch for StockPhotoClient {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(&self.endpoint)
            .header("Authorization", format!("Client-ID {}", self.key))
            .query(&[
                ("query", query),
                ("orientation", "landscape"),
                ("per_page", "5"),
            ])
            .send()
            .await
            .context("image search request")?
            .error_for_status()
            .context("image search status")?;

        let parsed: SearchResponse = resp.json().await.context("image search body")?;
        Ok(parsed.results.into_iter().map(|r| r.urls.regular).collect())
    }
}
