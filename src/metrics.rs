// src/metrics.rs

use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::ScheduleConfig;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the configured cadences
    /// as static gauges, so dashboards can plot "next due" counters against
    /// the intervals that produced them.
    pub fn init(schedule: &ScheduleConfig) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        gauge!("headliner_cache_ttl_secs").set(schedule.cache_ttl_secs as f64);
        gauge!("headliner_refresh_interval_secs").set(schedule.refresh_interval_secs as f64);
        gauge!("headliner_publish_interval_secs").set(schedule.publish_interval_secs as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
