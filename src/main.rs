//! Headliner — Binary Entrypoint
//! Boots the background orchestrator and the Axum ops/metrics server,
//! wiring configuration, shared state, and middleware.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use headliner::api::{self, AppState};
use headliner::config::AppConfig;
use headliner::dedup::DedupLedger;
use headliner::feed::FeedCache;
use headliner::images::search::{ImageSearch, StockPhotoClient};
use headliner::images::{HttpFetcher, ImageResolver};
use headliner::metrics::Metrics;
use headliner::publish::platform::PlatformClient;
use headliner::publish::Publisher;
use headliner::scheduler::{AppCore, Orchestrator};
use headliner::source::NewsApiClient;
use headliner::store::MemoryStore;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("headliner=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op without the file.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = AppConfig::load_default()?;
    info!(
        refresh = cfg.schedule.refresh_interval_secs,
        publish = cfg.schedule.publish_interval_secs,
        cleanup = cfg.schedule.cleanup_interval_secs,
        "configuration loaded"
    );

    let metrics = Metrics::init(&cfg.schedule);

    // --- Wire the pipeline ---
    let source = Arc::new(NewsApiClient::new(cfg.source.clone()));
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(HttpFetcher::new(cfg.images.fetch_timeout_secs));

    let search: Option<Arc<dyn ImageSearch>> = if cfg.images.search_key.is_empty() {
        warn!("no image search key configured; keyword image lookup disabled");
        None
    } else {
        Some(Arc::new(StockPhotoClient::new(
            cfg.images.search_endpoint.clone(),
            cfg.images.search_key.clone(),
            cfg.images.fetch_timeout_secs,
        )))
    };

    let images = ImageResolver::new(cfg.images.clone(), fetcher, search);
    let dedup = DedupLedger::with_capacity(cfg.schedule.dedup_capacity);
    let feed = FeedCache::new(cfg.schedule.clone(), source, store, dedup, images);
    let cache = feed.handle();

    let platform = Arc::new(PlatformClient::new(
        cfg.publish.endpoint.clone(),
        cfg.publish.media_endpoint.clone(),
        cfg.publish.verify_endpoint.clone(),
        cfg.publish.token.clone(),
        cfg.publish.attempt_timeout_secs,
    ));
    let publisher = Publisher::new(cfg.publish.clone(), platform, None, cfg.images.jpeg_quality);

    let core = Arc::new(AppCore::new(feed, publisher));
    let mut orchestrator = Orchestrator::new(cfg.schedule.clone(), core.clone());
    orchestrator.start();

    // --- Ops + metrics server ---
    let state = AppState { cache, core };
    let router = api::router(state).merge(metrics.router());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], 8000));
    info!(%addr, "ops server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    orchestrator.stop().await;
    info!("orchestrator stopped, exiting");
    Ok(())
}
