//! Domain model shared by the store, the dispatch engine and the web layer.

pub mod types;

pub use types::{
    Content, ContentId, ContentStatus, CycleSummary, DeliveryOutcome, PageCursor, Recipient,
    Subscriber, SubscriberId, Subscription, SubscriptionId, Topic, TopicId,
};
