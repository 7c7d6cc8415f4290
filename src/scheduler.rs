// src/scheduler.rs
//
// Single long-lived loop driving the three scheduled tasks on independent
// due-times: content refresh, headline publish, image-cache cleanup. The
// loop wakes on a short fixed tick and runs whatever is due; a failed
// attempt re-dues its own task sooner than the normal cadence.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ScheduleConfig;
use crate::feed::FeedCache;
use crate::publish::Publisher;

/// Everything the scheduled tasks (and the ops overrides) mutate. One lock
/// per component; locking per operation structurally gives at-most-one
/// active cycle per task kind.
pub struct AppCore {
    pub feed: Mutex<FeedCache>,
    pub publisher: Mutex<Publisher>,
}

impl AppCore {
    pub fn new(feed: FeedCache, publisher: Publisher) -> Self {
        Self {
            feed: Mutex::new(feed),
            publisher: Mutex::new(publisher),
        }
    }
}

/// Next due-time after a task attempt: full interval on success, the
/// shorter retry delay on failure. Both are strictly in the future, so a
/// failing task can neither spin nor go quiet.
pub fn plan_next(
    succeeded: bool,
    now: DateTime<Utc>,
    interval_secs: u64,
    retry_secs: u64,
) -> DateTime<Utc> {
    let delay = if succeeded { interval_secs } else { retry_secs };
    now + ChronoDuration::seconds(delay as i64)
}

pub struct Orchestrator {
    schedule: ScheduleConfig,
    core: Arc<AppCore>,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(schedule: ScheduleConfig, core: Arc<AppCore>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            schedule,
            core,
            shutdown,
            handle: None,
        }
    }

    /// Spawn the background loop. Refresh and publish are due immediately
    /// (cold start); cleanup waits a full interval. Calling `start` twice
    /// is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            warn!("orchestrator already running");
            return;
        }
        let schedule = self.schedule.clone();
        let core = self.core.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        self.handle = Some(tokio::spawn(async move {
            info!(
                refresh_secs = schedule.refresh_interval_secs,
                publish_secs = schedule.publish_interval_secs,
                cleanup_secs = schedule.cleanup_interval_secs,
                "orchestrator started"
            );

            let now = Utc::now();
            let mut refresh_due = now;
            let mut publish_due = now;
            let mut cleanup_due =
                now + ChronoDuration::seconds(schedule.cleanup_interval_secs as i64);

            let mut ticker = tokio::time::interval(Duration::from_secs(schedule.tick_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => {}
                }
                if *shutdown_rx.borrow() {
                    break;
                }

                let now = Utc::now();

                if now >= refresh_due {
                    // Scheduled cycles are unforced: the newer-headline
                    // gate applies, and only the operator override may
                    // push older content through.
                    let ok = core.feed.lock().await.refresh(false).await;
                    refresh_due = plan_next(
                        ok,
                        now,
                        schedule.refresh_interval_secs,
                        schedule.retry_delay_secs,
                    );
                    if ok {
                        debug!(next = %refresh_due, "refresh cycle done");
                    } else {
                        counter!("scheduler_task_failures_total", "task" => "refresh")
                            .increment(1);
                        error!(next = %refresh_due, "refresh cycle failed, retrying sooner");
                    }
                    gauge!("scheduler_refresh_next_due_ts").set(refresh_due.timestamp() as f64);
                }

                if now >= publish_due {
                    let entry = core.feed.lock().await.get_cached().await;
                    let ok = match entry.headline {
                        Some(headline) => {
                            core.publisher.lock().await.post_headline(&headline).await
                        }
                        None => {
                            debug!("no headline cached yet, nothing to publish");
                            false
                        }
                    };
                    publish_due = plan_next(
                        ok,
                        now,
                        schedule.publish_interval_secs,
                        schedule.retry_delay_secs,
                    );
                    if !ok {
                        counter!("scheduler_task_failures_total", "task" => "publish")
                            .increment(1);
                    }
                    gauge!("scheduler_publish_next_due_ts").set(publish_due.timestamp() as f64);
                }

                if now >= cleanup_due {
                    let removed = core.feed.lock().await.cleanup_images();
                    info!(removed, "image cache cleanup");
                    cleanup_due =
                        now + ChronoDuration::seconds(schedule.cleanup_interval_secs as i64);
                }
            }

            info!("orchestrator stopped");
        }));
    }

    /// Signal the loop to exit and wait for it. Safe to call with nothing
    /// running, and idempotent.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "orchestrator join");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}
