//! Mailgun-compatible HTTP mail transport.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{error, info, warn};

use super::{DeliveryError, MailTransport};

/// Posts each message as a form to `{api_url}` with basic auth `api:{api_key}`.
#[derive(Clone)]
pub struct HttpMailTransport {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
    timeout: Duration,
}

impl HttpMailTransport {
    pub fn new(api_url: String, api_key: String, from: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(50)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url,
            api_key,
            from,
            timeout,
        })
    }
}

/// Map a non-success HTTP status to a delivery error.
fn classify_status(status: StatusCode, detail: String) -> DeliveryError {
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        DeliveryError::Timeout(format!("{status}: {detail}"))
    } else if status.is_client_error() {
        DeliveryError::Rejected(format!("{status}: {detail}"))
    } else {
        DeliveryError::Transport(format!("{status}: {detail}"))
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let form = [
            ("from", self.from.as_str()),
            ("to", to),
            ("subject", subject),
            ("text", body),
        ];

        let response = self
            .client
            .post(&self.api_url)
            .basic_auth("api", Some(&self.api_key))
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!(to = %to, status_code = resp.status().as_u16(), "mail_sent");
                Ok(())
            }
            Ok(resp) => {
                let status = resp.status();
                let detail = resp.text().await.unwrap_or_default();
                warn!(
                    to = %to,
                    status_code = status.as_u16(),
                    detail = %detail,
                    "mail_send_rejected"
                );
                Err(classify_status(status, detail))
            }
            Err(e) if e.is_timeout() => {
                error!(
                    to = %to,
                    timeout_seconds = self.timeout.as_secs_f64(),
                    error = %e,
                    "mail_send_timeout"
                );
                Err(DeliveryError::Timeout(e.to_string()))
            }
            Err(e) => {
                error!(to = %to, error = %e, "mail_send_error");
                Err(DeliveryError::Transport(e.to_string()))
            }
        }
    }
}
