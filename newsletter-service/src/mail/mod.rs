//! Outbound mail transports.
//!
//! The dispatch engine only talks to [`MailTransport`]. Two implementations
//! ship with the service:
//! - [`HttpMailTransport`]: Mailgun-compatible HTTP messages API
//! - [`LogTransport`]: logs instead of sending, for local runs

pub mod http;
pub mod render;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use http::HttpMailTransport;
pub use render::render_body;

/// Why a single message could not be delivered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The provider refused the message (bad address, policy, auth).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The provider did not answer in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Connection or server-side failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Sends one message to one recipient.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Transport that only logs messages. Always succeeds.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        info!(
            to = %to,
            subject = %subject,
            body_length = body.len(),
            "mail_logged"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_transport_succeeds() {
        let transport = LogTransport;
        assert!(transport.send("a@example.com", "Hi", "Body").await.is_ok());
    }

    #[test]
    fn test_delivery_error_display() {
        let err = DeliveryError::Rejected("mailbox unavailable".to_string());
        assert_eq!(err.to_string(), "rejected: mailbox unavailable");
    }
}
