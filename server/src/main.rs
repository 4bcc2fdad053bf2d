//! Plan registry API server.
//!
//! Startup order:
//! 1. primary store (Redis), pinged
//! 2. index store (Elasticsearch), plan index created if missing
//! 3. queue (Redpanda), connected with bounded retries; exhausting them is fatal
//! 4. Prometheus scrape endpoint on `METRICS_PORT`
//! 5. HTTP API on `HOST:PORT`

use anyhow::Context;
use axum::{Router, routing::get};
use plan_registry_core::environment::SystemClock;
use plan_registry_core::validation::PlanSchemaValidator;
use plan_registry_elasticsearch::ElasticsearchIndexStore;
use plan_registry_redis::RedisPrimaryStore;
use plan_registry_runtime::metrics::MetricsServer;
use plan_registry_runtime::{ConsistencyOrchestrator, EventPublisher};
use plan_registry_server::{Config, init_tracing, redpanda_connector, shutdown_signal};
use plan_registry_web::{AppState, app};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env();
    tracing::info!(
        redis = %config.redis_url,
        elasticsearch = %config.elasticsearch_url,
        brokers = %config.redpanda_brokers,
        "Configuration loaded"
    );

    let primary = RedisPrimaryStore::new(&config.redis_url)
        .await
        .context("failed to connect to Redis")?;
    primary.ping().await.context("Redis did not answer PING")?;
    tracing::info!("Primary store ready");

    let index = ElasticsearchIndexStore::new(&config.elasticsearch())
        .context("invalid Elasticsearch configuration")?;
    index
        .ensure_index()
        .await
        .context("failed to prepare the plan index")?;
    tracing::info!(index = index.index(), "Index store ready");

    let publisher = Arc::new(EventPublisher::new(
        Arc::new(redpanda_connector(&config)?),
        config.queue_retry(),
    ));
    publisher
        .connect()
        .await
        .context("could not reach the event queue")?;
    tracing::info!(topic = %config.plan_events_topic, "Event queue ready");

    serve_metrics(&config).await?;

    let orchestrator = Arc::new(ConsistencyOrchestrator::new(
        Arc::new(primary),
        Arc::new(index),
        publisher,
        Arc::new(PlanSchemaValidator),
        Arc::new(SystemClock),
    ));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "Plan registry listening");

    axum::serve(listener, app(AppState::new(orchestrator)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Shut down");
    Ok(())
}

/// Install the Prometheus recorder and serve `/metrics` in the background.
async fn serve_metrics(config: &Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .metrics_addr()
        .parse()
        .with_context(|| format!("invalid metrics address {}", config.metrics_addr()))?;
    let mut metrics = MetricsServer::new(addr);
    metrics.start()?;

    let Some(handle) = metrics.handle().cloned() else {
        return Ok(());
    };
    let router = Router::new().route("/metrics", get(move || async move { handle.render() }));
    let listener = tokio::net::TcpListener::bind(metrics.addr())
        .await
        .with_context(|| format!("failed to bind metrics on {addr}"))?;
    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router).await {
            tracing::error!(error = %error, "Metrics endpoint stopped");
        }
    });
    tracing::info!(addr = %addr, "Metrics endpoint listening");
    Ok(())
}
