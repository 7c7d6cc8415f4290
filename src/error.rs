// src/error.rs
//
// Error taxonomy for the refresh/publish core. Nothing here is fatal to the
// orchestrator: every variant is caught at the task-execution boundary and
// converted into a FAILED transition feeding the backoff schedule.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Content/image/publish API unreachable or non-2xx.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The content source answered but returned zero items.
    #[error("source returned an empty feed")]
    EmptyFeed,

    /// Provider-reported rate limit; `reset_secs` is its own hint.
    #[error("rate limited, reset in {reset_secs}s")]
    RateLimited { reset_secs: u64 },

    /// The platform rejected the post as duplicate content.
    #[error("duplicate content rejected by platform")]
    DuplicateRejected,

    /// Storage transaction failure; the previous cache stays authoritative.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A single network attempt exceeded its wall-clock budget.
    #[error("attempt timed out after {0}s")]
    Timeout(u64),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FeedError>;
