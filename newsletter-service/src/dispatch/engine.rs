//! Due-content dispatch engine.
//!
//! One cycle:
//! 1. Lists `PENDING` content scheduled at or before now
//! 2. For each item, pages through the topic's active recipients
//! 3. Submits one delivery task per recipient to the worker pool
//! 4. Waits for the item's tasks, then commits `SENT` (or `FAILED` when the
//!    recipient listing broke part-way)
//!
//! Cycles are mutually exclusive per engine and run on their own task, so a
//! caller that stops waiting does not stop the cycle before its status writes.
//! Delivery is at-least-once: if the final status write fails the item stays
//! `PENDING` and is picked up again.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::pool::{PoolSettings, WorkerPool};
use crate::config::Config;
use crate::mail::{render_body, MailTransport};
use crate::model::{
    Content, ContentId, ContentStatus, CycleSummary, DeliveryOutcome, Recipient, SubscriberId,
};
use crate::store::{ContentStore, StoreError, SubscriptionIndex};

/// Errors that abort a whole cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a dispatch cycle is already running")]
    AlreadyRunning,

    #[error("failed to list due content: {0}")]
    DueQuery(#[source] StoreError),

    #[error("dispatch cycle task failed: {0}")]
    Aborted(#[source] JoinError),
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub page_size: usize,
    pub content_base_url: Option<String>,
    pub pool: PoolSettings,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.subscriber_page_size.max(1),
            content_base_url: config.content_base_url.clone(),
            pool: PoolSettings::from_config(config),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct DispatchEngine {
    inner: Arc<EngineInner>,
    cycle_guard: Arc<Mutex<()>>,
}

struct EngineInner {
    contents: Arc<dyn ContentStore>,
    index: Arc<dyn SubscriptionIndex>,
    transport: Arc<dyn MailTransport>,
    pool: WorkerPool,
    page_size: usize,
    content_base_url: Option<Arc<str>>,
}

impl DispatchEngine {
    pub fn new(
        contents: Arc<dyn ContentStore>,
        index: Arc<dyn SubscriptionIndex>,
        transport: Arc<dyn MailTransport>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                contents,
                index,
                transport,
                pool: WorkerPool::new(settings.pool),
                page_size: settings.page_size.max(1),
                content_base_url: settings.content_base_url.map(Arc::from),
            }),
            cycle_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Run one dispatch cycle.
    ///
    /// Returns [`CycleError::AlreadyRunning`] without touching the store when
    /// another cycle holds the guard. Once started, the cycle runs to its last
    /// status write even if the returned future is dropped; the guard stays
    /// held until then.
    pub async fn run_cycle(&self) -> Result<CycleSummary, CycleError> {
        let guard = Arc::clone(&self.cycle_guard)
            .try_lock_owned()
            .map_err(|_| {
                warn!("dispatch_cycle_skipped_already_running");
                CycleError::AlreadyRunning
            })?;

        let inner = Arc::clone(&self.inner);
        let cycle = tokio::spawn(async move {
            let _guard = guard;
            inner.cycle().await
        });

        cycle.await.map_err(|e| {
            error!(error = %e, "dispatch_cycle_task_failed");
            CycleError::Aborted(e)
        })?
    }

    /// Wait until no cycle is running, including one whose caller went away.
    pub async fn wait_idle(&self) {
        let _guard = self.cycle_guard.lock().await;
    }
}

impl EngineInner {
    async fn cycle(&self) -> Result<CycleSummary, CycleError> {
        let started = Instant::now();
        let now = Utc::now();
        info!(now = %now, "dispatch_cycle_start");

        let due = self.contents.find_due(now).await.map_err(|e| {
            error!(error = %e, "dispatch_due_query_failed");
            CycleError::DueQuery(e)
        })?;

        info!(due_count = due.len(), "dispatch_due_content_found");

        let mut summary = CycleSummary::default();
        for content in due {
            summary.merge(self.dispatch_content(content).await);
        }

        info!(
            attempted = summary.attempted,
            sent = summary.sent,
            failed = summary.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "dispatch_cycle_complete"
        );

        Ok(summary)
    }

    /// Fan out one content item and commit its terminal status.
    ///
    /// Finished deliveries are folded into the counts while paging continues,
    /// so memory is bounded by the pool's capacity rather than the audience.
    async fn dispatch_content(&self, content: Content) -> CycleSummary {
        let content = Arc::new(content);
        info!(
            content_id = %content.id,
            topic_id = %content.topic_id,
            title = %content.title,
            "dispatch_content_start"
        );

        let mut summary = CycleSummary::default();
        let mut in_flight = FuturesUnordered::new();
        let mut after = None;
        let mut pages = 0usize;

        let listing: Result<(), StoreError> = loop {
            let recipients = match self
                .index
                .active_recipients(content.topic_id, after, self.page_size)
                .await
            {
                Ok(recipients) => recipients,
                Err(e) => break Err(e),
            };

            let Some(last) = recipients.last() else {
                break Ok(());
            };
            after = Some(last.position);

            debug!(
                content_id = %content.id,
                page = pages,
                recipients = recipients.len(),
                pool_running = self.pool.running(),
                pool_queued = self.pool.queued(),
                "dispatch_page_fetched"
            );

            for recipient in recipients {
                let subscriber_id = recipient.subscriber_id;
                let task = deliver(
                    Arc::clone(&self.transport),
                    Arc::clone(&content),
                    recipient,
                    self.content_base_url.clone(),
                );

                match self.pool.submit(task).await {
                    Ok(handle) => in_flight.push(async move { (subscriber_id, handle.await) }),
                    Err(e) => {
                        warn!(
                            content_id = %content.id,
                            subscriber_id = %subscriber_id,
                            error = %e,
                            "delivery_rejected"
                        );
                        summary.record(&DeliveryOutcome::Failed(e.to_string()));
                    }
                }

                while let Some(Some((subscriber_id, joined))) = in_flight.next().now_or_never() {
                    summary.record(&settle(content.id, subscriber_id, joined));
                }
            }

            pages += 1;
        };

        // Every submitted task finishes before the status write.
        while let Some((subscriber_id, joined)) = in_flight.next().await {
            summary.record(&settle(content.id, subscriber_id, joined));
        }

        let (status, sent_at) = match &listing {
            Ok(()) => (ContentStatus::Sent, Some(Utc::now())),
            Err(e) => {
                error!(
                    content_id = %content.id,
                    pages_completed = pages,
                    error = %e,
                    "dispatch_recipient_listing_failed"
                );
                (ContentStatus::Failed, None)
            }
        };

        match self.contents.commit_status(content.id, status, sent_at).await {
            Ok(()) => info!(
                content_id = %content.id,
                status = %status,
                attempted = summary.attempted,
                sent = summary.sent,
                failed = summary.failed,
                "dispatch_content_committed"
            ),
            Err(e) => error!(
                content_id = %content.id,
                status = %status,
                error = %e,
                "dispatch_status_write_failed_content_may_be_resent"
            ),
        }

        summary
    }
}

/// Outcome of a joined delivery task; a panicked or cancelled task counts as failed.
fn settle(
    content_id: ContentId,
    subscriber_id: SubscriberId,
    joined: Result<DeliveryOutcome, JoinError>,
) -> DeliveryOutcome {
    joined.unwrap_or_else(|e| {
        error!(
            content_id = %content_id,
            subscriber_id = %subscriber_id,
            error = %e,
            "delivery_task_aborted"
        );
        DeliveryOutcome::Failed(format!("task aborted: {e}"))
    })
}

/// Deliver one content item to one recipient.
async fn deliver(
    transport: Arc<dyn MailTransport>,
    content: Arc<Content>,
    recipient: Recipient,
    base_url: Option<Arc<str>>,
) -> DeliveryOutcome {
    let body = render_body(&recipient.email, &content, base_url.as_deref());

    match transport.send(&recipient.email, &content.title, &body).await {
        Ok(()) => DeliveryOutcome::Delivered,
        Err(e) => {
            warn!(
                content_id = %content.id,
                subscriber_id = %recipient.subscriber_id,
                to = %recipient.email,
                error = %e,
                "delivery_failed"
            );
            DeliveryOutcome::Failed(e.to_string())
        }
    }
}
