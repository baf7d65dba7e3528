//! HTTP endpoint handlers.
//!
//! The dispatch endpoints are thin: they delegate to the shared
//! [`DispatchEngine`] and shape its result into JSON.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::dispatch::{CycleError, DispatchEngine};
use crate::scheduler::status_message;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<DispatchEngine>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<DispatchEngine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
        }
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Manual Send
// =============================================================================

/// Result of a manually triggered cycle.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub message: String,
    pub attempted_count: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub timestamp: String,
}

/// Error body for the dispatch endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    pub timestamp: String,
}

/// `POST /newsletter/send`: run one cycle now.
///
/// Responds 409 while another cycle is in flight and 500 when due content
/// could not be listed.
pub async fn send_now(
    State(state): State<AppState>,
) -> Result<Json<SendResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("manual_send_requested");

    match state.engine.run_cycle().await {
        Ok(summary) => {
            info!(
                attempted = summary.attempted,
                sent = summary.sent,
                failed = summary.failed,
                "manual_send_complete"
            );
            Ok(Json(SendResponse {
                message: "Manual send executed successfully".to_string(),
                attempted_count: summary.attempted,
                sent_count: summary.sent,
                failed_count: summary.failed,
                timestamp: rfc3339(Utc::now()),
            }))
        }
        Err(e @ CycleError::AlreadyRunning) => {
            warn!("manual_send_conflict");
            Err((
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: "cycle_in_progress",
                    message: e.to_string(),
                    timestamp: rfc3339(Utc::now()),
                }),
            ))
        }
        Err(e) => {
            error!(error = %e, "manual_send_failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "cycle_failed",
                    message: e.to_string(),
                    timestamp: rfc3339(Utc::now()),
                }),
            ))
        }
    }
}

// =============================================================================
// Scheduler Status
// =============================================================================

/// `GET /newsletter/status`: plain-text description of the periodic trigger.
pub async fn scheduler_status(State(state): State<AppState>) -> String {
    status_message(&state.config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::response::IntoResponse;
    use chrono::Duration as ChronoDuration;
    use serde_json::Value;
    use tokio::sync::Notify;

    use crate::dispatch::EngineSettings;
    use crate::mail::{DeliveryError, LogTransport, MailTransport};
    use crate::model::ContentStatus;
    use crate::store::MemoryStore;

    /// Blocks every send until released.
    struct GateTransport {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl MailTransport for GateTransport {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), DeliveryError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        let topic = store.add_topic("rust", None).await.unwrap();
        for email in ["a@example.com", "b@example.com"] {
            let sub = store.add_subscriber(email).await.unwrap();
            store.subscribe(sub.id, topic.id).await.unwrap();
        }
        store
            .schedule_content(topic.id, "Issue #1", "Body", Utc::now() - ChronoDuration::minutes(1))
            .await
            .unwrap();
        store
    }

    fn state_with(store: &MemoryStore, transport: Arc<dyn MailTransport>) -> AppState {
        let engine = DispatchEngine::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            transport,
            EngineSettings::default(),
        );
        AppState::new(Config::default(), Arc::new(engine))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_send_now_reports_counts() {
        let store = seeded_store().await;
        let state = state_with(&store, Arc::new(LogTransport));

        let response = send_now(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Manual send executed successfully");
        assert_eq!(json["sentCount"], 2);
        assert_eq!(json["failedCount"], 0);
        assert!(DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_send_now_conflicts_while_cycle_running() {
        let store = seeded_store().await;
        let gate = Arc::new(GateTransport {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let state = state_with(&store, gate.clone());

        let running = tokio::spawn(send_now(State(state.clone())));
        gate.entered.notified().await;

        let response = send_now(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"], "cycle_in_progress");

        gate.release.notify_waiters();
        // The second send may not have parked yet; keep releasing until done.
        let first = loop {
            if running.is_finished() {
                break running.await.unwrap().into_response();
            }
            gate.release.notify_one();
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(first.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_send_now_finishes_after_client_disconnect() {
        let store = seeded_store().await;
        let gate = Arc::new(GateTransport {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let state = state_with(&store, gate.clone());

        let request = tokio::spawn(send_now(State(state.clone())));
        gate.entered.notified().await;
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());

        while tokio::time::timeout(Duration::from_millis(5), state.engine.wait_idle())
            .await
            .is_err()
        {
            gate.release.notify_one();
        }

        let counts = store.content_counts().await;
        assert_eq!(counts.get(&ContentStatus::Sent), Some(&1));
        assert_eq!(counts.get(&ContentStatus::Pending), None);

        let response = send_now(State(state)).await.into_response();
        let json = body_json(response).await;
        assert_eq!(json["attemptedCount"], 0);
    }

    #[tokio::test]
    async fn test_scheduler_status_text() {
        let store = MemoryStore::new();
        let state = state_with(&store, Arc::new(LogTransport));

        let text = scheduler_status(State(state)).await;
        assert_eq!(text, "Scheduler is active and runs every 60 seconds.");
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
    }
}
