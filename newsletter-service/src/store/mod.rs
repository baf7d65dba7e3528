//! Storage seams used by the dispatch engine.
//!
//! The engine only needs two narrow capabilities:
//! - [`ContentStore`]: list due content and commit status transitions
//! - [`SubscriptionIndex`]: page through the eligible recipients of a topic
//!
//! [`MemoryStore`] implements both and is what the service binary runs with.

pub mod memory;
pub mod seed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Content, ContentId, ContentStatus, PageCursor, Recipient, TopicId};

pub use memory::MemoryStore;
pub use seed::{load_seed, Seed};

/// Errors reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or failed internally.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint would be violated.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// The record is not in a state that allows the requested change.
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Content records as seen by the dispatch engine.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All `PENDING` content whose scheduled time is at or before `now`.
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Content>>;

    /// Move a `PENDING` item to a terminal status.
    ///
    /// Implementations must refuse the write with [`StoreError::Conflict`] when
    /// the item already left `PENDING`.
    async fn commit_status(
        &self,
        id: ContentId,
        status: ContentStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Active-recipient lookup for a topic.
#[async_trait]
pub trait SubscriptionIndex: Send + Sync {
    /// Up to `page_size` recipients for which both the subscriber and the
    /// subscription are active, ordered by [`PageCursor`] and starting strictly
    /// after `after` (from the beginning when `None`). An empty page marks the
    /// end.
    ///
    /// Pass the `position` of the last recipient of a page to get the next one.
    async fn active_recipients(
        &self,
        topic_id: TopicId,
        after: Option<PageCursor>,
        page_size: usize,
    ) -> Result<Vec<Recipient>>;
}
