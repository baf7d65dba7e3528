//! Newsletter Service - scheduled newsletter dispatch.
//!
//! This binary:
//! - Loads configuration and an optional seed file into the in-memory store
//! - Runs the periodic dispatch scheduler
//! - Serves the manual trigger and status endpoints
//!
//! On SIGINT/SIGTERM the HTTP server drains, the scheduler stops, and the pool
//! closes only after any in-flight cycle has committed.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use newsletter::store::load_seed;
use newsletter::web::router;
use newsletter::{
    AppState, Config, DispatchEngine, EngineSettings, HttpMailTransport, LogTransport,
    MailTransport, MemoryStore, Scheduler,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("newsletter_service_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        port = config.port,
        scheduler_enabled = config.scheduler_enabled,
        interval_secs = config.scheduler_interval_secs,
        page_size = config.subscriber_page_size,
        worker_core_size = config.worker_core_size,
        worker_max_size = config.worker_max_size,
        worker_queue_capacity = config.worker_queue_capacity,
        mail_api_configured = config.mail_api_url.is_some(),
        seed_path = ?config.seed_path,
        "config_loaded"
    );

    let store = MemoryStore::new();
    if let Some(path) = &config.seed_path {
        load_seed(path, &store).await?;
        info!(counts = ?store.content_counts().await, "store_seeded");
    }

    let transport = build_transport(&config)?;

    let engine = Arc::new(DispatchEngine::new(
        Arc::new(store.clone()),
        Arc::new(store),
        transport,
        EngineSettings::from_config(&config),
    ));

    // Start the periodic trigger
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.scheduler_enabled {
        let scheduler = Scheduler::new(Arc::clone(&engine), config.scheduler_interval());
        Some(tokio::spawn(scheduler.run(shutdown_rx)))
    } else {
        info!("scheduler_disabled");
        None
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(config, Arc::clone(&engine)));

    // Bind to address
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop the scheduler once its current cycle (if any) has finished
    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            warn!(error = %e, "scheduler_join_failed");
        }
    }
    engine.wait_idle().await;
    engine.pool().close();

    info!("newsletter_service_shutdown_complete");

    Ok(())
}

/// Pick the HTTP transport when a mail API is configured, else log-only.
fn build_transport(config: &Config) -> Result<Arc<dyn MailTransport>> {
    match (&config.mail_api_url, &config.mail_api_key) {
        (Some(url), Some(key)) => {
            let transport = HttpMailTransport::new(
                url.clone(),
                key.clone(),
                config.mail_from.clone(),
                config.mail_timeout(),
            )?;
            info!(from = %config.mail_from, "mail_transport_http");
            Ok(Arc::new(transport))
        }
        (Some(_), None) => {
            warn!("mail_api_key_missing, falling back to log transport");
            Ok(Arc::new(LogTransport))
        }
        _ => {
            warn!("mail_transport_log_only");
            Ok(Arc::new(LogTransport))
        }
    }
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
