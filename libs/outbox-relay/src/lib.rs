//! The outbox relay: drains `new` outbox rows to the broker.
//!
//! Every tick the relay claims a batch (atomically marking it `processing`),
//! publishes each event with the correlation id as the message key, then
//! finalizes: published rows become `processed`, failed rows go back to
//! `new` for the next tick. Finalize is deliberately not transactional with
//! the publish; a crash in between re-publishes on restart, and consumers
//! absorb the duplicate through their inbox.
//!
//! Rows stranded in `processing` by a crash are swept back to `new` once
//! they age past a threshold, on startup and periodically afterwards.

mod error;
mod metrics;

pub use error::{RelayError, RelayResult};
pub use metrics::RelayMetrics;

use std::time::Duration;

use chrono::Utc;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use saga_config::KafkaSettings;
use saga_events::EventEnvelope;
use saga_store::{OutboxEvent, OutboxRepository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Tuning knobs for the relay loop.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Rows claimed per tick.
    pub batch_size: i64,
    /// Sleep between ticks.
    pub poll_interval: Duration,
    /// Upper bound on a single broker send.
    pub publish_timeout: Duration,
    /// Age after which a `processing` row is considered stranded.
    pub recover_after: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(2),
            publish_timeout: Duration::from_secs(5),
            recover_after: Duration::from_secs(60),
        }
    }
}

impl RelayConfig {
    /// Defaults overridable through `RELAY_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        fn env_u64(key: &str, default: u64) -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        Self {
            batch_size: env_u64("RELAY_BATCH_SIZE", defaults.batch_size as u64) as i64,
            poll_interval: Duration::from_secs(env_u64(
                "RELAY_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )),
            publish_timeout: Duration::from_secs(env_u64(
                "RELAY_PUBLISH_TIMEOUT_SECS",
                defaults.publish_timeout.as_secs(),
            )),
            recover_after: Duration::from_secs(env_u64(
                "RELAY_RECOVER_AFTER_SECS",
                defaults.recover_after.as_secs(),
            )),
        }
    }
}

/// Ticks between the periodic stale-`processing` sweeps.
const RECOVERY_SWEEP_TICKS: u64 = 100;

pub struct OutboxRelay {
    repository: OutboxRepository,
    producer: FutureProducer,
    topic: String,
    config: RelayConfig,
    metrics: RelayMetrics,
}

impl OutboxRelay {
    /// Build the relay and its Kafka producer. The producer runs idempotent
    /// with full acks so a broker-side retry cannot reorder or drop within a
    /// partition.
    pub fn new(
        repository: OutboxRepository,
        kafka: &KafkaSettings,
        config: RelayConfig,
    ) -> RelayResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", kafka.broker_list())
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .create()?;

        Ok(Self {
            repository,
            producer,
            topic: kafka.topic.clone(),
            config,
            metrics: RelayMetrics::new("outbox-worker"),
        })
    }

    /// Run until the token is cancelled. DB errors skip the tick; nothing
    /// here is fatal.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            topic = %self.topic,
            batch_size = self.config.batch_size,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Outbox relay starting"
        );

        self.sweep_stale().await;

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Outbox relay shutting down");
                    return;
                }
                _ = ticker.tick() => {}
            }

            ticks += 1;
            if ticks % RECOVERY_SWEEP_TICKS == 0 {
                self.sweep_stale().await;
            }

            match self.process_batch().await {
                Ok(published) if published > 0 => {
                    info!(published_count = published, "Published outbox events");
                }
                Ok(_) => {
                    debug!("No outbox events to publish");
                }
                Err(e) => {
                    error!(error = ?e, "Outbox batch failed, retrying next tick");
                }
            }
        }
    }

    /// One tick: claim, publish, finalize. Returns the published count.
    pub async fn process_batch(&self) -> RelayResult<usize> {
        let events = self.repository.claim_batch(self.config.batch_size).await?;
        if events.is_empty() {
            return Ok(0);
        }

        let mut published: Vec<Uuid> = Vec::with_capacity(events.len());
        let mut failed: Vec<Uuid> = Vec::new();

        for event in &events {
            match self.publish(event).await {
                Ok(()) => {
                    debug!(event_id = %event.id, event_type = %event.event_type, "Event published");
                    self.metrics.published.inc();
                    published.push(event.id);
                }
                Err(e) => {
                    error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        error = ?e,
                        "Failed to publish event"
                    );
                    self.metrics.publish_errors.inc();
                    failed.push(event.id);
                }
            }
        }

        // Finalize failures leave rows in 'processing'; the stale sweep picks
        // them up and the inbox absorbs the resulting duplicates.
        if let Err(e) = self.repository.mark_processed(&published).await {
            error!(error = ?e, count = published.len(), "Failed to mark events processed");
        }
        if let Err(e) = self.repository.release_failed(&failed).await {
            error!(error = ?e, count = failed.len(), "Failed to release events back to new");
        }

        Ok(published.len())
    }

    async fn publish(&self, event: &OutboxEvent) -> RelayResult<()> {
        let envelope = envelope_for(event);
        let key = envelope.message_key();
        let payload = serde_json::to_string(&envelope)?;

        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        self.producer
            .send(record, self.config.publish_timeout)
            .await
            .map_err(|(err, _)| RelayError::Publish(err.to_string()))?;

        Ok(())
    }

    async fn sweep_stale(&self) {
        match self.repository.recover_stale(self.config.recover_after).await {
            Ok(0) => {}
            Ok(count) => {
                warn!(count = count, "Recovered stranded processing rows back to new");
            }
            Err(e) => {
                error!(error = ?e, "Stale row recovery failed");
            }
        }
    }
}

/// The wire envelope for an outbox row. `occurred_at` is stamped at publish
/// time, matching the at-least-once contract: a re-publish is a new
/// observation of the same event id.
fn envelope_for(event: &OutboxEvent) -> EventEnvelope {
    EventEnvelope {
        id: event.id,
        event_type: event.event_type.clone(),
        correlation_id: event.correlation_id,
        causation_id: event.causation_id,
        producer: event.producer.clone(),
        occurred_at: Utc::now(),
        payload: event.payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    fn envelope_carries_outbox_identity() {
        let correlation = Uuid::new_v4();
        let causation = Uuid::new_v4();
        let event = OutboxEvent::new(
            "PaymentAuthorized",
            Some(correlation),
            Some(causation),
            "payment-service",
            json!({"order_id": correlation}),
        );

        let envelope = envelope_for(&event);

        assert_eq!(envelope.id, event.id);
        assert_eq!(envelope.event_type, "PaymentAuthorized");
        assert_eq!(envelope.correlation_id, Some(correlation));
        assert_eq!(envelope.causation_id, Some(causation));
        assert_eq!(envelope.producer, "payment-service");
        assert_eq!(envelope.payload, event.payload);
        assert_eq!(envelope.message_key(), correlation.to_string());
    }

    #[test]
    fn envelope_key_falls_back_to_event_id() {
        let event = OutboxEvent::new("RefundInitiated", None, None, "order-service", json!({}));
        let envelope = envelope_for(&event);
        assert_eq!(envelope.message_key(), event.id.to_string());
    }

    #[test]
    #[serial]
    fn relay_config_defaults() {
        for key in [
            "RELAY_BATCH_SIZE",
            "RELAY_POLL_INTERVAL_SECS",
            "RELAY_PUBLISH_TIMEOUT_SECS",
            "RELAY_RECOVER_AFTER_SECS",
        ] {
            std::env::remove_var(key);
        }

        let config = RelayConfig::from_env();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.publish_timeout, Duration::from_secs(5));
        assert_eq!(config.recover_after, Duration::from_secs(60));
    }

    #[test]
    #[serial]
    fn relay_config_reads_env_overrides() {
        std::env::set_var("RELAY_BATCH_SIZE", "50");
        std::env::set_var("RELAY_RECOVER_AFTER_SECS", "120");

        let config = RelayConfig::from_env();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.recover_after, Duration::from_secs(120));

        std::env::remove_var("RELAY_BATCH_SIZE");
        std::env::remove_var("RELAY_RECOVER_AFTER_SECS");
    }
}
