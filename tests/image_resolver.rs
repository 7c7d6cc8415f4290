// tests/image_resolver.rs
//
// Resolution chain against a fixture fetcher: direct URL, og:image scrape,
// keyword search with the per-cycle used-image set, plus cache hits and
// the retention sweep. No sockets are opened.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use headliner::config::ImageConfig;
use headliner::images::search::ImageSearch;
use headliner::images::{ImageResolver, RemoteFetcher};
use headliner::source::RawItem;

/// Serves canned pages and images, recording every URL it was asked for.
#[derive(Default)]
struct FixtureFetcher {
    pages: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    fn with_page(url: &str, html: &str) -> Self {
        let mut pages = HashMap::new();
        pages.insert(url.to_string(), html.to_string());
        Self {
            pages,
            requested: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(32, 24, image::Rgb([200, 60, 30]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[async_trait]
impl RemoteFetcher for FixtureFetcher {
    async fn get_text(&self, url: &str) -> anyhow::Result<String> {
        self.requested.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no fixture page for {url}"))
    }

    async fn get_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        self.requested.lock().unwrap().push(url.to_string());
        Ok(png_bytes())
    }
}

struct FixedSearch {
    results: Vec<String>,
}

#[async_trait]
impl ImageSearch for FixedSearch {
    async fn search(&self, _query: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.results.clone())
    }
}

fn raw(title: &str, link: &str, image_url: Option<&str>) -> RawItem {
    RawItem {
        title: title.to_string(),
        description: format!("{title} body"),
        link: link.to_string(),
        image_url: image_url.map(str::to_string),
        published_at: DateTime::<Utc>::from_timestamp(1_756_500_000, 0).unwrap(),
        source_id: "wire".to_string(),
    }
}

fn cfg(tmp: &TempDir) -> ImageConfig {
    ImageConfig {
        cache_dir: tmp.path().to_path_buf(),
        ..Default::default()
    }
}

#[tokio::test]
async fn direct_url_is_cached_once() {
    let tmp = TempDir::new().unwrap();
    let fetcher = Arc::new(FixtureFetcher::default());
    let mut resolver = ImageResolver::new(cfg(&tmp), fetcher.clone(), None);

    let item = raw("Direct", "", Some("https://cdn/a.png"));
    let first = resolver.resolve(&item).await.unwrap();
    assert!(first.exists());
    assert_eq!(first.extension().unwrap(), "jpg");
    assert_eq!(fetcher.requests().len(), 1);

    // Same source hash: no second download, same path.
    let second = resolver.resolve(&item).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fetcher.requests().len(), 1);
}

#[tokio::test]
async fn page_scrape_finds_the_social_preview() {
    let tmp = TempDir::new().unwrap();
    let html = r#"<head><meta property="og:image" content="https://cdn/preview.jpg"></head>"#;
    let fetcher = Arc::new(FixtureFetcher::with_page("https://site/story", html));
    let mut resolver = ImageResolver::new(cfg(&tmp), fetcher.clone(), None);

    let item = raw("Scraped", "https://site/story", None);
    let path = resolver.resolve(&item).await.unwrap();
    assert!(path.exists());

    let requests = fetcher.requests();
    assert_eq!(
        requests,
        vec![
            "https://site/story".to_string(),
            "https://cdn/preview.jpg".to_string()
        ]
    );
}

#[tokio::test]
async fn search_results_are_not_reused_within_a_cycle() {
    let tmp = TempDir::new().unwrap();
    let fetcher = Arc::new(FixtureFetcher::default());
    let search = Arc::new(FixedSearch {
        results: vec![
            "https://stock/1.jpg".to_string(),
            "https://stock/2.jpg".to_string(),
        ],
    });
    let mut resolver = ImageResolver::new(cfg(&tmp), fetcher.clone(), Some(search));
    resolver.begin_cycle();

    let a = resolver.resolve(&raw("First story", "", None)).await.unwrap();
    let b = resolver.resolve(&raw("Second story", "", None)).await.unwrap();
    assert_ne!(a, b);

    let requests = fetcher.requests();
    assert!(requests.contains(&"https://stock/1.jpg".to_string()));
    assert!(requests.contains(&"https://stock/2.jpg".to_string()));
}

#[tokio::test]
async fn unresolvable_item_ships_without_an_image() {
    let tmp = TempDir::new().unwrap();
    let fetcher = Arc::new(FixtureFetcher::default());
    let mut resolver = ImageResolver::new(cfg(&tmp), fetcher, None);

    assert!(resolver.resolve(&raw("Nothing", "", None)).await.is_none());
}

#[tokio::test]
async fn cleanup_sweeps_only_files_past_retention() {
    let tmp = TempDir::new().unwrap();
    let fetcher = Arc::new(FixtureFetcher::default());
    let mut resolver = ImageResolver::new(cfg(&tmp), fetcher, None);

    resolver
        .resolve(&raw("Keep or sweep", "", Some("https://cdn/x.png")))
        .await
        .unwrap();

    // Generous retention: nothing is old enough yet.
    assert_eq!(resolver.cleanup(std::time::Duration::from_secs(3_600)), 0);

    // Zero retention: everything already written is past due.
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(resolver.cleanup(std::time::Duration::from_secs(0)), 1);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}
