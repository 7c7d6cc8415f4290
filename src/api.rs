// src/api.rs
//
// Operator-facing surface. The schedule owns the pipeline; these routes
// only expose health/status and the two explicit overrides: force a
// refresh cycle, force a publish of the cached headline.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::feed::CacheHandle;
use crate::publish;
use crate::scheduler::AppCore;

#[derive(Clone)]
pub struct AppState {
    pub cache: CacheHandle,
    pub core: Arc<AppCore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/status", get(status))
        .route("/ops/refresh", post(force_refresh))
        .route("/ops/publish", post(force_publish))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct StatusResp {
    headline: Option<String>,
    supporting: usize,
    populated_at: Option<String>,
    expires_at: Option<String>,
    last_post_at: Option<String>,
    next_allowed_at: Option<String>,
    platform_connected: bool,
}

async fn status(State(state): State<AppState>) -> Json<StatusResp> {
    // The snapshot handle keeps this read off the refresh path entirely.
    let entry = state.cache.get();

    // The network probe runs outside the publisher lock so a slow platform
    // cannot stall the scheduled publish task.
    let (cached, platform, budget, pub_state) = {
        let publisher = state.core.publisher.lock().await;
        (
            publisher.cached_connection(),
            publisher.platform(),
            publisher.attempt_budget(),
            publisher.state().clone(),
        )
    };
    let connected = match cached {
        Some(verdict) => verdict,
        None => {
            let verdict = publish::probe_platform(platform.as_ref(), budget).await;
            state.core.publisher.lock().await.note_connection(verdict);
            verdict
        }
    };

    Json(StatusResp {
        headline: entry
            .as_ref()
            .and_then(|e| e.headline.as_ref().map(|h| h.title.clone())),
        supporting: entry.as_ref().map(|e| e.supporting.len()).unwrap_or(0),
        populated_at: entry.as_ref().map(|e| e.populated_at.to_rfc3339()),
        expires_at: entry.as_ref().map(|e| e.expires_at.to_rfc3339()),
        last_post_at: pub_state.last_post_at.map(|t| t.to_rfc3339()),
        next_allowed_at: pub_state.next_allowed_at.map(|t| t.to_rfc3339()),
        platform_connected: connected,
    })
}

#[derive(serde::Serialize)]
struct OpsResp {
    ok: bool,
}

async fn force_refresh(State(state): State<AppState>) -> Json<OpsResp> {
    let ok = state.core.feed.lock().await.refresh(true).await;
    Json(OpsResp { ok })
}

async fn force_publish(State(state): State<AppState>) -> Json<OpsResp> {
    let entry = state.core.feed.lock().await.get_cached().await;
    let ok = match entry.headline {
        Some(headline) => {
            state
                .core
                .publisher
                .lock()
                .await
                .post_headline(&headline)
                .await
        }
        None => false,
    };
    Json(OpsResp { ok })
}
