// src/config.rs
//
// All intervals are configuration, not contract. Defaults follow the most
// defensive constants the service has shipped with; a TOML file and a few
// env vars override them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_CONFIG_PATH: &str = "HEADLINER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/headliner.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub schedule: ScheduleConfig,
    pub source: SourceConfig,
    pub images: ImageConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Content refresh cadence (2 h).
    pub refresh_interval_secs: u64,
    /// Outbound publish cadence (30 min).
    pub publish_interval_secs: u64,
    /// Image-cache cleanup sweep (12 h).
    pub cleanup_interval_secs: u64,
    /// Loop wake-up tick; bounds scheduling jitter.
    pub tick_secs: u64,
    /// Re-due delay after a failed refresh/publish attempt.
    pub retry_delay_secs: u64,
    /// How long a populated cache entry stays fresh.
    pub cache_ttl_secs: u64,
    /// Minimum spacing between unforced refreshes invoked outside the loop.
    pub min_refresh_secs: u64,
    /// Bounded capacity for the dedup ledger; 0 keeps it unbounded.
    pub dedup_capacity: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 7_200,
            publish_interval_secs: 1_800,
            cleanup_interval_secs: 43_200,
            tick_secs: 30,
            retry_delay_secs: 300,
            cache_ttl_secs: 3_600,
            min_refresh_secs: 300,
            dedup_capacity: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub endpoint: String,
    pub api_key: String,
    pub country: String,
    pub language: String,
    pub category: String,
    /// Raw items requested per fetch.
    pub page_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://newsdata.io/api/1/latest".to_string(),
            api_key: String::new(),
            country: "us,gb".to_string(),
            language: "en".to_string(),
            category: "top".to_string(),
            page_size: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub cache_dir: PathBuf,
    pub max_edge: u32,
    pub jpeg_quality: u8,
    pub search_endpoint: String,
    pub search_key: String,
    /// Cache files older than this are swept.
    pub retention_hours: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache/images"),
            max_edge: 800,
            jpeg_quality: 85,
            search_endpoint: "https://api.unsplash.com/search/photos".to_string(),
            search_key: String::new(),
            retention_hours: 12,
            fetch_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub endpoint: String,
    pub media_endpoint: String,
    pub verify_endpoint: String,
    pub token: String,
    /// Minimum spacing between successful posts.
    pub post_interval_secs: u64,
    /// Ceiling applied to provider-reported rate-limit resets.
    pub reset_ceiling_secs: u64,
    /// Wall-clock budget per network attempt.
    pub attempt_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_cap_secs: u64,
    /// TTL for the cached connection check.
    pub check_ttl_secs: u64,
    /// Platform character limit for post text.
    pub max_post_chars: usize,
    /// Public site link appended to captions.
    pub site_url: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            media_endpoint: String::new(),
            verify_endpoint: String::new(),
            token: String::new(),
            post_interval_secs: 1_800,
            reset_ceiling_secs: 1_800,
            attempt_timeout_secs: 15,
            max_retries: 3,
            backoff_cap_secs: 60,
            check_ttl_secs: 300,
            max_post_chars: 280,
            site_url: "https://example.org/news".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config from {}", path.display()))?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $HEADLINER_CONFIG
    /// 2) config/headliner.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            anyhow::bail!("HEADLINER_CONFIG points to non-existent path");
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Secrets never live in the TOML file; env wins when set.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("NEWS_API_KEY") {
            self.source.api_key = v;
        }
        if let Ok(v) = std::env::var("IMAGE_SEARCH_KEY") {
            self.images.search_key = v;
        }
        if let Ok(v) = std::env::var("PLATFORM_TOKEN") {
            self.publish.token = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_defensive() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.schedule.refresh_interval_secs, 7_200);
        assert_eq!(cfg.schedule.publish_interval_secs, 1_800);
        assert_eq!(cfg.schedule.cleanup_interval_secs, 43_200);
        assert!(cfg.schedule.retry_delay_secs < cfg.schedule.refresh_interval_secs);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml = r#"
            [schedule]
            refresh_interval_secs = 600

            [source]
            page_size = 15
        "#;
        let cfg: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.schedule.refresh_interval_secs, 600);
        assert_eq!(cfg.schedule.publish_interval_secs, 1_800);
        assert_eq!(cfg.source.page_size, 15);
        assert_eq!(cfg.images.max_edge, 800);
    }

    #[serial_test::serial]
    #[test]
    fn env_key_overrides_file_value() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("headliner.toml");
        std::fs::write(&p, "[source]\napi_key = \"from-file\"\n").unwrap();

        std::env::set_var("NEWS_API_KEY", "from-env");
        let cfg = AppConfig::load_from(&p).unwrap();
        std::env::remove_var("NEWS_API_KEY");

        assert_eq!(cfg.source.api_key, "from-env");
    }
}
