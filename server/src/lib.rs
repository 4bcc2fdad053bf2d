//! Process wiring shared by the `plan-registry` API and the
//! `plan-consumer` binaries.

#![forbid(unsafe_code)]

pub mod config;

pub use config::Config;

use anyhow::Context;
use plan_registry_redpanda::RedpandaConnector;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,plan_registry=debug";

/// Load `.env` (if present) and install the `fmt` subscriber.
pub fn init_tracing() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Queue connector for the configured brokers and topic.
///
/// # Errors
///
/// Fails when no brokers are configured.
pub fn redpanda_connector(config: &Config) -> anyhow::Result<RedpandaConnector> {
    RedpandaConnector::builder()
        .brokers(&config.redpanda_brokers)
        .topic(&config.plan_events_topic)
        .consumer_group(&config.consumer_group)
        .build()
        .context("invalid Redpanda configuration")
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(error = %error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
