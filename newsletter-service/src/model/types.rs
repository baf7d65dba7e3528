//! Domain records for topics, subscribers, subscriptions and content.
//!
//! These are the shapes exchanged with the store and serialized in seed files.
//! Timestamps are UTC and serialize as RFC 3339.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_type!(
    /// Identifier of a [`Topic`].
    TopicId
);
id_type!(
    /// Identifier of a [`Subscriber`].
    SubscriberId
);
id_type!(
    /// Identifier of a [`Subscription`].
    SubscriptionId
);
id_type!(
    /// Identifier of a [`Content`] item.
    ContentId
);

// =============================================================================
// Audience
// =============================================================================

/// A named newsletter topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    /// Unique across all topics
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A mail recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    /// Unique across all subscribers
    pub email: String,
    /// Inactive subscribers never receive mail
    pub active: bool,
    pub subscribed_at: DateTime<Utc>,
}

/// Link between one subscriber and one topic.
///
/// At most one subscription exists per (subscriber, topic) pair. Its `active`
/// flag is independent of the subscriber's own flag; both must be set for the
/// subscriber to be eligible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub subscriber_id: SubscriberId,
    pub topic_id: TopicId,
    pub active: bool,
    pub subscribed_at: DateTime<Utc>,
}

// =============================================================================
// Content
// =============================================================================

/// Lifecycle of a content item.
///
/// `Pending` moves to exactly one of `Sent` or `Failed`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    Pending,
    Sent,
    Failed,
}

impl ContentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ContentStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentStatus::Pending => "PENDING",
            ContentStatus::Sent => "SENT",
            ContentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled newsletter issue for one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    pub topic_id: TopicId,
    pub title: String,
    pub body: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: ContentStatus,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Content {
    /// Whether this item should be picked up by a cycle running at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ContentStatus::Pending && self.scheduled_time <= now
    }
}

/// Position of a subscription in its topic's recipient order.
///
/// Recipients are ordered by `(subscribed_at, subscription_id)`; a page
/// requested after a cursor starts strictly past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageCursor {
    pub subscribed_at: DateTime<Utc>,
    pub subscription_id: SubscriptionId,
}

/// An active subscriber resolved for a topic, as yielded by the subscription index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub subscriber_id: SubscriberId,
    pub email: String,
    pub position: PageCursor,
}

// =============================================================================
// Cycle results
// =============================================================================

/// Outcome of one delivery attempt to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

/// Aggregate counts returned by a dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
}

impl CycleSummary {
    /// Fold one attempt into the counts.
    pub fn record(&mut self, outcome: &DeliveryOutcome) {
        self.attempted += 1;
        match outcome {
            DeliveryOutcome::Delivered => self.sent += 1,
            DeliveryOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: CycleSummary) {
        self.attempted += other.attempted;
        self.sent += other.sent;
        self.failed += other.failed;
    }
}
