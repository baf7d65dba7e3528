//! JSON seed file for populating a [`MemoryStore`] at startup.
//!
//! Records reference each other by natural keys (topic name, subscriber
//! email) so the file can be written by hand:
//!
//! ```json
//! {
//!   "topics": [{ "name": "rust", "description": "Rust weekly" }],
//!   "subscribers": [{ "email": "reader@example.com" }],
//!   "subscriptions": [{ "email": "reader@example.com", "topic": "rust" }],
//!   "contents": [{
//!     "topic": "rust",
//!     "title": "Issue #1",
//!     "body": "Hello",
//!     "scheduled_time": "2024-01-01T09:00:00Z"
//!   }]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::MemoryStore;

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub topics: Vec<SeedTopic>,
    #[serde(default)]
    pub subscribers: Vec<SeedSubscriber>,
    #[serde(default)]
    pub subscriptions: Vec<SeedSubscription>,
    #[serde(default)]
    pub contents: Vec<SeedContent>,
}

#[derive(Debug, Deserialize)]
pub struct SeedTopic {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedSubscriber {
    pub email: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeedSubscription {
    pub email: String,
    pub topic: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeedContent {
    pub topic: String,
    pub title: String,
    pub body: String,
    pub scheduled_time: DateTime<Utc>,
}

impl Seed {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse seed JSON")
    }

    /// Insert every record into `store`, resolving names to ids.
    pub async fn apply(&self, store: &MemoryStore) -> Result<()> {
        for topic in &self.topics {
            store
                .add_topic(&topic.name, topic.description.as_deref())
                .await
                .with_context(|| format!("Failed to add topic '{}'", topic.name))?;
        }

        for subscriber in &self.subscribers {
            let created = store
                .add_subscriber(&subscriber.email)
                .await
                .with_context(|| format!("Failed to add subscriber '{}'", subscriber.email))?;
            if !subscriber.active {
                store.set_subscriber_active(created.id, false).await?;
            }
        }

        for subscription in &self.subscriptions {
            let subscriber = store
                .subscriber_by_email(&subscription.email)
                .await
                .with_context(|| format!("Unknown subscriber '{}'", subscription.email))?;
            let topic = store
                .topic_by_name(&subscription.topic)
                .await
                .with_context(|| format!("Unknown topic '{}'", subscription.topic))?;

            let created = store.subscribe(subscriber.id, topic.id).await?;
            if !subscription.active {
                store.set_subscription_active(created.id, false).await?;
            }
        }

        for content in &self.contents {
            let topic = store
                .topic_by_name(&content.topic)
                .await
                .with_context(|| format!("Unknown topic '{}'", content.topic))?;
            store
                .schedule_content(topic.id, &content.title, &content.body, content.scheduled_time)
                .await
                .with_context(|| format!("Failed to schedule '{}'", content.title))?;
        }

        info!(
            topics = self.topics.len(),
            subscribers = self.subscribers.len(),
            subscriptions = self.subscriptions.len(),
            contents = self.contents.len(),
            "seed_applied"
        );

        Ok(())
    }
}

/// Read a seed file from disk and apply it to `store`.
pub async fn load_seed(path: &Path, store: &MemoryStore) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    Seed::from_json(&raw)?.apply(store).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentStatus;
    use crate::store::{ContentStore, SubscriptionIndex};

    const SEED: &str = r#"{
        "topics": [{ "name": "rust", "description": "Rust weekly" }, { "name": "go" }],
        "subscribers": [
            { "email": "a@example.com" },
            { "email": "b@example.com", "active": false },
            { "email": "c@example.com" }
        ],
        "subscriptions": [
            { "email": "a@example.com", "topic": "rust" },
            { "email": "b@example.com", "topic": "rust" },
            { "email": "c@example.com", "topic": "rust", "active": false },
            { "email": "c@example.com", "topic": "go" }
        ],
        "contents": [
            { "topic": "rust", "title": "Issue #1", "body": "Hello", "scheduled_time": "2024-01-01T09:00:00Z" }
        ]
    }"#;

    #[tokio::test]
    async fn test_seed_apply() {
        let store = MemoryStore::new();
        Seed::from_json(SEED).unwrap().apply(&store).await.unwrap();

        let rust = store.topic_by_name("rust").await.unwrap();
        assert_eq!(rust.description.as_deref(), Some("Rust weekly"));

        let recipients = store.active_recipients(rust.id, None, 10).await.unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].email, "a@example.com");

        let due = store.find_due(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].status, ContentStatus::Pending);
    }

    #[tokio::test]
    async fn test_seed_unknown_topic_fails() {
        let store = MemoryStore::new();
        let seed = Seed::from_json(
            r#"{ "contents": [{ "topic": "nope", "title": "t", "body": "b", "scheduled_time": "2024-01-01T00:00:00Z" }] }"#,
        )
        .unwrap();

        assert!(seed.apply(&store).await.is_err());
    }

    #[test]
    fn test_seed_empty_object() {
        let seed = Seed::from_json("{}").unwrap();
        assert!(seed.topics.is_empty());
        assert!(seed.contents.is_empty());
    }
}
