//! In-memory store implementing both [`ContentStore`] and [`SubscriptionIndex`].
//!
//! All records live behind a single `RwLock`, so every operation sees a
//! consistent snapshot. Constraint checks mirror what a relational schema
//! would enforce: unique topic names, unique subscriber emails, one
//! subscription per (subscriber, topic), content bound to an existing topic.
//!
//! Each topic keeps its subscriptions in a `BTreeMap` keyed by [`PageCursor`],
//! so a recipient page is a range scan from the cursor rather than a full sort.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{ContentStore, Result, StoreError, SubscriptionIndex};
use crate::model::{
    Content, ContentId, ContentStatus, PageCursor, Recipient, Subscriber, SubscriberId,
    Subscription, SubscriptionId, Topic, TopicId,
};

/// Cheaply cloneable handle to a shared in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Records>>,
}

#[derive(Default)]
struct Records {
    topics: HashMap<TopicId, Topic>,
    subscribers: HashMap<SubscriberId, Subscriber>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    contents: HashMap<ContentId, Content>,
    /// Per-topic recipient order
    by_topic: HashMap<TopicId, BTreeMap<PageCursor, SubscriptionId>>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topic with a unique name.
    pub async fn add_topic(&self, name: &str, description: Option<&str>) -> Result<Topic> {
        let name = name.trim();
        let mut records = self.inner.write().await;

        if records.topics.values().any(|t| t.name == name) {
            return Err(StoreError::Duplicate(format!("topic '{name}'")));
        }

        let topic = Topic {
            id: TopicId::new(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        records.topics.insert(topic.id, topic.clone());

        debug!(topic_id = %topic.id, name = %topic.name, "store_topic_added");
        Ok(topic)
    }

    /// Register an active subscriber with a unique (case-insensitive) email.
    pub async fn add_subscriber(&self, email: &str) -> Result<Subscriber> {
        let email = normalize_email(email);
        let mut records = self.inner.write().await;

        if records.subscribers.values().any(|s| s.email == email) {
            return Err(StoreError::Duplicate(format!("subscriber '{email}'")));
        }

        let subscriber = Subscriber {
            id: SubscriberId::new(),
            email,
            active: true,
            subscribed_at: Utc::now(),
        };
        records.subscribers.insert(subscriber.id, subscriber.clone());

        debug!(subscriber_id = %subscriber.id, "store_subscriber_added");
        Ok(subscriber)
    }

    /// Subscribe an existing subscriber to an existing topic.
    pub async fn subscribe(
        &self,
        subscriber_id: SubscriberId,
        topic_id: TopicId,
    ) -> Result<Subscription> {
        let mut records = self.inner.write().await;

        if !records.subscribers.contains_key(&subscriber_id) {
            return Err(StoreError::NotFound(format!("subscriber {subscriber_id}")));
        }
        if !records.topics.contains_key(&topic_id) {
            return Err(StoreError::NotFound(format!("topic {topic_id}")));
        }
        if records
            .subscriptions
            .values()
            .any(|s| s.subscriber_id == subscriber_id && s.topic_id == topic_id)
        {
            return Err(StoreError::Duplicate(format!(
                "subscription of {subscriber_id} to {topic_id}"
            )));
        }

        let subscription = Subscription {
            id: SubscriptionId::new(),
            subscriber_id,
            topic_id,
            active: true,
            subscribed_at: Utc::now(),
        };
        records
            .subscriptions
            .insert(subscription.id, subscription.clone());
        records.by_topic.entry(topic_id).or_default().insert(
            PageCursor {
                subscribed_at: subscription.subscribed_at,
                subscription_id: subscription.id,
            },
            subscription.id,
        );

        debug!(
            subscription_id = %subscription.id,
            subscriber_id = %subscriber_id,
            topic_id = %topic_id,
            "store_subscription_added"
        );
        Ok(subscription)
    }

    /// Schedule a `PENDING` content item for a topic.
    ///
    /// A topic cannot have two items scheduled for the same instant.
    pub async fn schedule_content(
        &self,
        topic_id: TopicId,
        title: &str,
        body: &str,
        scheduled_time: DateTime<Utc>,
    ) -> Result<Content> {
        let mut records = self.inner.write().await;

        if !records.topics.contains_key(&topic_id) {
            return Err(StoreError::NotFound(format!("topic {topic_id}")));
        }
        if records
            .contents
            .values()
            .any(|c| c.topic_id == topic_id && c.scheduled_time == scheduled_time)
        {
            return Err(StoreError::Duplicate(format!(
                "content for topic {topic_id} at {scheduled_time}"
            )));
        }

        let content = Content {
            id: ContentId::new(),
            topic_id,
            title: title.to_string(),
            body: body.to_string(),
            scheduled_time,
            status: ContentStatus::Pending,
            sent_at: None,
        };
        records.contents.insert(content.id, content.clone());

        info!(
            content_id = %content.id,
            topic_id = %topic_id,
            scheduled_time = %scheduled_time,
            "store_content_scheduled"
        );
        Ok(content)
    }

    /// Toggle a subscriber's own active flag (deactivate-in-place).
    pub async fn set_subscriber_active(&self, id: SubscriberId, active: bool) -> Result<()> {
        let mut records = self.inner.write().await;
        let subscriber = records
            .subscribers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("subscriber {id}")))?;
        subscriber.active = active;
        Ok(())
    }

    /// Toggle a subscription's active flag.
    pub async fn set_subscription_active(&self, id: SubscriptionId, active: bool) -> Result<()> {
        let mut records = self.inner.write().await;
        let subscription = records
            .subscriptions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("subscription {id}")))?;
        subscription.active = active;
        Ok(())
    }

    pub async fn content(&self, id: ContentId) -> Option<Content> {
        self.inner.read().await.contents.get(&id).cloned()
    }

    pub async fn topic_by_name(&self, name: &str) -> Option<Topic> {
        let records = self.inner.read().await;
        records.topics.values().find(|t| t.name == name).cloned()
    }

    pub async fn subscriber_by_email(&self, email: &str) -> Option<Subscriber> {
        let email = normalize_email(email);
        let records = self.inner.read().await;
        records
            .subscribers
            .values()
            .find(|s| s.email == email)
            .cloned()
    }

    /// Number of content items per status, for startup logging.
    pub async fn content_counts(&self) -> HashMap<ContentStatus, usize> {
        let records = self.inner.read().await;
        let mut counts = HashMap::new();
        for content in records.contents.values() {
            *counts.entry(content.status).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Content>> {
        let records = self.inner.read().await;
        let mut due: Vec<Content> = records
            .contents
            .values()
            .filter(|c| c.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|c| (c.scheduled_time, c.id));
        Ok(due)
    }

    async fn commit_status(
        &self,
        id: ContentId,
        status: ContentStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut records = self.inner.write().await;
        let content = records
            .contents
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("content {id}")))?;

        if content.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "content {id} is already {}",
                content.status
            )));
        }

        content.status = status;
        content.sent_at = sent_at;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionIndex for MemoryStore {
    async fn active_recipients(
        &self,
        topic_id: TopicId,
        after: Option<PageCursor>,
        page_size: usize,
    ) -> Result<Vec<Recipient>> {
        let records = self.inner.read().await;

        let Some(order) = records.by_topic.get(&topic_id) else {
            return Ok(Vec::new());
        };

        let start = match after {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Unbounded,
        };

        Ok(order
            .range((start, Bound::Unbounded))
            .filter_map(|(position, id)| {
                let subscription = records.subscriptions.get(id).filter(|s| s.active)?;
                let subscriber = records
                    .subscribers
                    .get(&subscription.subscriber_id)
                    .filter(|s| s.active)?;
                Some(Recipient {
                    subscriber_id: subscriber.id,
                    email: subscriber.email.clone(),
                    position: *position,
                })
            })
            .take(page_size)
            .collect())
    }
}
