//! The consumer runtime shared by every downstream service.
//!
//! A service supplies an [`EventHandler`] (its inbox namespace, the event
//! types it applies, and the transactional step); the runtime owns everything
//! else: the broker subscription, envelope parsing, inbox deduplication,
//! retries, offset commits, and metrics.
//!
//! The delivery contract:
//! - The inbox row and the handler's side effects commit in one transaction.
//! - The broker offset is committed only after that transaction commits, so a
//!   crash in between redelivers the event and the inbox row absorbs it.
//! - A corrupt envelope is acked and dropped immediately; it can never block
//!   the partition.
//! - A failing event is retried with exponential backoff (2^attempt seconds)
//!   up to five times, then acked and dropped.

mod error;
mod metrics;

pub use error::{ConsumerError, ConsumerResult};
pub use metrics::ConsumerMetrics;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use saga_config::KafkaSettings;
use saga_events::EventEnvelope;
use saga_store::InboxRepository;
use sqlx::{PgPool, Postgres, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Retry attempts before a message is dropped.
const MAX_RETRIES: u32 = 5;

/// A service's saga step.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Inbox namespace; also the producer name on any follow-up outbox rows.
    fn consumer_name(&self) -> &'static str;

    /// Event types this step applies. Anything else is acked untouched.
    fn accepted_types(&self) -> &'static [&'static str];

    /// Apply the event. Runs inside the same transaction as the inbox insert;
    /// returning an error rolls everything back and triggers a retry.
    async fn handle(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        envelope: &EventEnvelope,
    ) -> anyhow::Result<()>;
}

pub struct EventConsumer<H: EventHandler> {
    consumer: StreamConsumer,
    pool: PgPool,
    inbox: InboxRepository,
    handler: H,
    metrics: ConsumerMetrics,
}

impl<H: EventHandler> EventConsumer<H> {
    pub fn new(
        pool: PgPool,
        kafka: &KafkaSettings,
        group_id: &str,
        handler: H,
    ) -> ConsumerResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", group_id)
            .set("bootstrap.servers", kafka.broker_list())
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &kafka.auto_offset_reset)
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000")
            .set("enable.partition.eof", "false")
            .create()?;

        consumer.subscribe(&[&kafka.topic])?;

        info!(
            consumer = handler.consumer_name(),
            group_id = group_id,
            topic = %kafka.topic,
            "Consumer subscribed"
        );

        let metrics = ConsumerMetrics::new(handler.consumer_name());
        let inbox = InboxRepository::new(pool.clone());

        Ok(Self {
            consumer,
            pool,
            inbox,
            handler,
            metrics,
        })
    }

    /// Run until the token is cancelled. An in-flight message is never acked
    /// on cancellation; it redelivers on restart and dedups through the inbox.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(consumer = self.handler.consumer_name(), "Consumer loop starting");

        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(consumer = self.handler.consumer_name(), "Consumer shutting down");
                    return;
                }
                received = self.consumer.recv() => match received {
                    Ok(msg) => msg,
                    Err(e) => {
                        error!(error = %e, "Broker fetch failed");
                        tokio::select! {
                            _ = shutdown.cancelled() => return,
                            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        }
                        continue;
                    }
                },
            };

            let envelope = match decode_envelope(msg.payload()) {
                Ok(envelope) => envelope,
                Err(e) => {
                    // Poison messages must not block the partition.
                    warn!(
                        topic = msg.topic(),
                        partition = msg.partition(),
                        offset = msg.offset(),
                        error = %e,
                        "Corrupt envelope, dropping"
                    );
                    self.ack(&msg);
                    continue;
                }
            };

            if !self
                .handler
                .accepted_types()
                .contains(&envelope.event_type.as_str())
            {
                debug!(
                    event_type = %envelope.event_type,
                    "Event type not handled by this consumer"
                );
                self.ack(&msg);
                continue;
            }

            if self.apply_with_retry(&envelope, &shutdown).await {
                self.ack(&msg);
            }
        }
    }

    /// Retry loop around one event. Returns `true` when the message should be
    /// acked (applied, deduplicated, or dropped after exhausting retries) and
    /// `false` only on cancellation.
    async fn apply_with_retry(&self, envelope: &EventEnvelope, shutdown: &CancellationToken) -> bool {
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = backoff_delay(attempt);
                warn!(
                    event_id = %envelope.id,
                    attempt = attempt,
                    max = MAX_RETRIES,
                    backoff_secs = backoff.as_secs(),
                    "Retrying event"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return false,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            let started = Instant::now();
            match self.apply(envelope).await {
                Ok(applied) => {
                    self.metrics
                        .processing_duration
                        .observe(started.elapsed().as_secs_f64());
                    if applied {
                        self.metrics.processed.inc();
                        info!(
                            consumer = self.handler.consumer_name(),
                            event_id = %envelope.id,
                            event_type = %envelope.event_type,
                            "Event applied"
                        );
                    }
                    return true;
                }
                Err(e) => {
                    error!(
                        consumer = self.handler.consumer_name(),
                        event_id = %envelope.id,
                        attempt = attempt,
                        error = ?e,
                        "Event processing failed"
                    );
                    if attempt == MAX_RETRIES {
                        error!(
                            event_id = %envelope.id,
                            retries = MAX_RETRIES,
                            "Dropping event after exhausting retries"
                        );
                        return true;
                    }
                }
            }
        }

        // Loop always returns from inside.
        true
    }

    /// One transactional attempt. `Ok(false)` means the inbox already had the
    /// row; the empty transaction still commits so the check is consistent.
    async fn apply(&self, envelope: &EventEnvelope) -> ConsumerResult<bool> {
        let mut tx = self.pool.begin().await?;

        let fresh = self
            .inbox
            .insert_if_absent(
                &mut tx,
                self.handler.consumer_name(),
                envelope.id,
                &envelope.event_type,
                envelope.correlation_id,
            )
            .await?;

        if !fresh {
            tx.commit().await?;
            return Ok(false);
        }

        self.handler
            .handle(&mut tx, envelope)
            .await
            .map_err(ConsumerError::Handler)?;

        tx.commit().await?;
        Ok(true)
    }

    fn ack(&self, msg: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(msg, CommitMode::Async) {
            error!(error = %e, "Failed to commit broker offset");
        }
    }
}

fn decode_envelope(payload: Option<&[u8]>) -> Result<EventEnvelope, serde_json::Error> {
    let bytes = payload.unwrap_or_default();
    serde_json::from_slice(bytes)
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(MAX_RETRIES), Duration::from_secs(32));
    }

    #[test]
    fn decode_rejects_corrupt_payloads() {
        assert!(decode_envelope(Some(b"not json".as_slice())).is_err());
        assert!(decode_envelope(Some(br#"{"type":"OrderCreated"}"#.as_slice())).is_err());
        assert!(decode_envelope(None).is_err());
    }

    #[test]
    fn decode_accepts_a_valid_envelope() {
        let envelope = EventEnvelope {
            id: Uuid::new_v4(),
            event_type: "OrderCreated".to_string(),
            correlation_id: Some(Uuid::new_v4()),
            causation_id: None,
            producer: "order-service".to_string(),
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        };
        let bytes = serde_json::to_vec(&envelope).unwrap();

        let decoded = decode_envelope(Some(bytes.as_slice())).unwrap();
        assert_eq!(decoded.id, envelope.id);
        assert_eq!(decoded.event_type, "OrderCreated");
    }
}
