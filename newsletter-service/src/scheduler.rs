//! Periodic cycle trigger.
//!
//! Ticks at a fixed interval and runs one dispatch cycle per tick. A shutdown
//! request is only observed between cycles, so a cycle that has started
//! always commits its statuses.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dispatch::{CycleError, DispatchEngine};

/// Human-readable description of the periodic trigger.
pub fn status_message(config: &Config) -> String {
    if config.scheduler_enabled {
        format!(
            "Scheduler is active and runs every {} seconds.",
            config.scheduler_interval_secs
        )
    } else {
        "Scheduler is disabled; use POST /newsletter/send to dispatch due content.".to_string()
    }
}

pub struct Scheduler {
    engine: Arc<DispatchEngine>,
    period: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<DispatchEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// The first cycle runs immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = self.period.as_secs(), "scheduler_started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler_stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.engine.run_cycle().await {
                        Ok(summary) => info!(
                            attempted = summary.attempted,
                            sent = summary.sent,
                            failed = summary.failed,
                            "scheduled_cycle_finished"
                        ),
                        Err(CycleError::AlreadyRunning) => {
                            warn!("scheduled_cycle_skipped");
                        }
                        Err(e) => {
                            error!(error = %e, "scheduled_cycle_failed");
                        }
                    }
                }
            }
        }

        info!("scheduler_stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    use crate::dispatch::EngineSettings;
    use crate::mail::LogTransport;
    use crate::model::ContentStatus;
    use crate::store::MemoryStore;

    #[test]
    fn test_status_message() {
        let config = Config::default();
        assert_eq!(
            status_message(&config),
            "Scheduler is active and runs every 60 seconds."
        );

        let disabled = Config {
            scheduler_enabled: false,
            ..Config::default()
        };
        assert!(status_message(&disabled).contains("disabled"));
    }

    #[tokio::test]
    async fn test_scheduler_runs_cycle_and_stops() {
        let store = MemoryStore::new();
        let topic = store.add_topic("rust", None).await.unwrap();
        let sub = store.add_subscriber("a@example.com").await.unwrap();
        store.subscribe(sub.id, topic.id).await.unwrap();
        let content = store
            .schedule_content(topic.id, "t", "b", Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        let engine = Arc::new(DispatchEngine::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(LogTransport),
            EngineSettings::default(),
        ));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Scheduler::new(engine, Duration::from_millis(20)).run(rx));

        let mut status = ContentStatus::Pending;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = store.content(content.id).await.unwrap().status;
            if status == ContentStatus::Sent {
                break;
            }
        }
        assert_eq!(status, ContentStatus::Sent);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
