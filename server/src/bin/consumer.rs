//! Plan event consumer.
//!
//! Connects to the event topic with the same bounded retry policy as the
//! API, then logs every change event until the process is stopped.
//! Messages that cannot be handled are forwarded to the dead-letter topic.

use anyhow::Context;
use plan_registry_runtime::{EventConsumer, LoggingListener};
use plan_registry_server::{Config, init_tracing, redpanda_connector, shutdown_signal};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env();
    let connector = redpanda_connector(&config)?;
    tracing::info!(
        brokers = %config.redpanda_brokers,
        topic = connector.topic(),
        dead_letters = %connector.dead_letter_topic(),
        group = %config.consumer_group,
        "Starting plan consumer"
    );

    let consumer = EventConsumer::new(
        Arc::new(connector),
        config.queue_retry(),
        Arc::new(LoggingListener),
    );

    tokio::select! {
        result = consumer.run() => result.context("plan consumer stopped")?,
        () = shutdown_signal() => tracing::info!("Shut down"),
    }
    Ok(())
}
