//! Configuration loaded from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `HOST` / `PORT` | `0.0.0.0` / `3000` |
//! | `METRICS_PORT` | `9090` |
//! | `REDIS_URL` | `redis://127.0.0.1:6379` |
//! | `ELASTICSEARCH_URL` | `http://localhost:9200` |
//! | `PLAN_INDEX` | `plan_index` |
//! | `ELASTICSEARCH_TIMEOUT_SECS` | `10` |
//! | `REDPANDA_BROKERS` | `localhost:9092` |
//! | `PLAN_EVENTS_TOPIC` | `plan_events` |
//! | `CONSUMER_GROUP` | `plan-consumer` |
//! | `QUEUE_CONNECT_MAX_ATTEMPTS` | `10` |
//! | `QUEUE_CONNECT_DELAY_MS` | `5000` |
//!
//! Unparseable numbers fall back to their default.

use plan_registry_elasticsearch::ElasticsearchConfig;
use plan_registry_runtime::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Process configuration shared by both binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the API binds to.
    pub host: String,
    /// API port.
    pub port: u16,
    /// Prometheus scrape port.
    pub metrics_port: u16,
    /// Primary store URL.
    pub redis_url: String,
    /// Index cluster URL.
    pub elasticsearch_url: String,
    /// Index name.
    pub plan_index: String,
    /// Per-request index timeout, in seconds.
    pub elasticsearch_timeout_secs: u64,
    /// Comma-separated broker list.
    pub redpanda_brokers: String,
    /// Change-event topic.
    pub plan_events_topic: String,
    /// Consumer group of `plan-consumer`.
    pub consumer_group: String,
    /// Queue connection attempts before giving up.
    pub queue_connect_max_attempts: usize,
    /// Delay between queue connection attempts, in milliseconds.
    pub queue_connect_delay_ms: u64,
}

impl Config {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        Self {
            host: text("HOST", "0.0.0.0"),
            port: parsed(&lookup, "PORT", 3000),
            metrics_port: parsed(&lookup, "METRICS_PORT", 9090),
            redis_url: text("REDIS_URL", "redis://127.0.0.1:6379"),
            elasticsearch_url: text("ELASTICSEARCH_URL", "http://localhost:9200"),
            plan_index: text("PLAN_INDEX", "plan_index"),
            elasticsearch_timeout_secs: parsed(&lookup, "ELASTICSEARCH_TIMEOUT_SECS", 10),
            redpanda_brokers: text("REDPANDA_BROKERS", "localhost:9092"),
            plan_events_topic: text("PLAN_EVENTS_TOPIC", "plan_events"),
            consumer_group: text("CONSUMER_GROUP", "plan-consumer"),
            queue_connect_max_attempts: parsed(&lookup, "QUEUE_CONNECT_MAX_ATTEMPTS", 10),
            queue_connect_delay_ms: parsed(&lookup, "QUEUE_CONNECT_DELAY_MS", 5000),
        }
    }

    /// `host:port` of the API listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `host:port` of the metrics listener.
    #[must_use]
    pub fn metrics_addr(&self) -> String {
        format!("{}:{}", self.host, self.metrics_port)
    }

    /// Index store settings.
    #[must_use]
    pub fn elasticsearch(&self) -> ElasticsearchConfig {
        ElasticsearchConfig {
            url: self.elasticsearch_url.clone(),
            index: self.plan_index.clone(),
            timeout: Duration::from_secs(self.elasticsearch_timeout_secs),
        }
    }

    /// Bounded, fixed-delay policy for queue connections.
    #[must_use]
    pub const fn queue_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.queue_connect_max_attempts,
            Duration::from_millis(self.queue_connect_delay_ms),
        )
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.metrics_addr(), "0.0.0.0:9090");
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.plan_events_topic, "plan_events");
        assert_eq!(config.consumer_group, "plan-consumer");
        assert_eq!(config.queue_retry(), RetryPolicy::fixed(10, Duration::from_secs(5)));

        let es = config.elasticsearch();
        assert_eq!(es.url, "http://localhost:9200");
        assert_eq!(es.index, "plan_index");
        assert_eq!(es.timeout, Duration::from_secs(10));
    }

    #[test]
    fn variables_override_defaults() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("PLAN_INDEX", "plans_v2"),
            ("QUEUE_CONNECT_MAX_ATTEMPTS", "3"),
            ("QUEUE_CONNECT_DELAY_MS", "250"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.elasticsearch().index, "plans_v2");
        assert_eq!(config.queue_retry(), RetryPolicy::fixed(3, Duration::from_millis(250)));
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = config_from(&[("PORT", "http"), ("ELASTICSEARCH_TIMEOUT_SECS", "-1")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.elasticsearch_timeout_secs, 10);
    }
}
