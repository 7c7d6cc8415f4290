// src/item.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hard cap on supporting items kept alongside the headline.
pub const SUPPORTING_CAP: usize = 5;

/// Deterministic hash of `title ++ description`, used only by the
/// deduplication ledger and as the opaque item id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(title: &str, description: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(description.as_bytes());
        Self(hex(&hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex digest of arbitrary bytes; also used for content-addressed image names.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write as _;
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// One piece of fetched content. Created by a refresh cycle, replaced
/// wholesale by the next successful one; never mutated in between.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub source_url: String,
    pub image_path: Option<String>,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub is_headline: bool,
    pub fetched_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.title, &self.description)
    }
}

/// The in-memory "headline + supporting" view, replaced wholesale on
/// refresh. A stale entry keeps being served until a refresh succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub headline: Option<ContentItem>,
    pub supporting: Vec<ContentItem>,
    pub populated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Normalize text coming from the source API: decode HTML entities, strip
/// tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Truncate to at most `max` characters, appending an ellipsis when cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = Fingerprint::of("Title", "Body");
        let b = Fingerprint::of("Title", "Body");
        let c = Fingerprint::of("Title", "Other body");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn normalize_strips_tags_and_entities() {
        let s = "  Markets <b>rally</b>&nbsp;&nbsp; after the vote ";
        assert_eq!(normalize_text(s), "Markets rally after the vote");
    }

    #[test]
    fn truncate_appends_ellipsis_only_when_cut() {
        assert_eq!(truncate_chars("short", 10), "short");
        let cut = truncate_chars("abcdefghij", 5);
        assert_eq!(cut.chars().count(), 5);
        assert!(cut.ends_with('…'));
    }
}
