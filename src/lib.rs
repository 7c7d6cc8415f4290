// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod dedup;
pub mod error;
pub mod feed;
pub mod images;
pub mod item;
pub mod metrics;
pub mod publish;
pub mod scheduler;
pub mod source;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{FeedError, Result};
pub use crate::feed::{CacheHandle, FeedCache};
pub use crate::item::{CacheEntry, ContentItem, Fingerprint};
pub use crate::scheduler::{AppCore, Orchestrator};
