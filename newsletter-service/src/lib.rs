//! Newsletter dispatch service.
//!
//! Delivers scheduled newsletter content to the active subscribers of its
//! topic. A periodic scheduler and a manual HTTP trigger both run the same
//! dispatch cycle; cycles never overlap.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler / POST /newsletter/send
//!         → DispatchEngine::run_cycle
//!         → ContentStore (due content) → SubscriptionIndex (paged recipients)
//!         → WorkerPool → MailTransport
//!         → ContentStore (SENT / FAILED)
//! ```

pub mod config;
pub mod dispatch;
pub mod mail;
pub mod model;
pub mod scheduler;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{CycleError, DispatchEngine, EngineSettings};
pub use mail::{DeliveryError, HttpMailTransport, LogTransport, MailTransport};
pub use model::{Content, ContentStatus, CycleSummary};
pub use scheduler::Scheduler;
pub use store::{ContentStore, MemoryStore, StoreError, SubscriptionIndex};
pub use web::AppState;
