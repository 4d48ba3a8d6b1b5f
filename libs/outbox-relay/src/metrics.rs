use prometheus::{IntCounter, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct RelayMetrics {
    pub published: IntCounter,
    pub publish_errors: IntCounter,
}

impl RelayMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let published = IntCounter::with_opts(
            Opts::new(
                "outbox_events_published_total",
                "Total number of outbox events published to the broker",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_events_published_total");

        let publish_errors = IntCounter::with_opts(
            Opts::new(
                "outbox_publish_errors_total",
                "Total number of failed publish attempts",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_publish_errors_total");

        for metric in [
            Box::new(published.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(publish_errors.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register relay metric: {}", e);
            }
        }

        Self {
            published,
            publish_errors,
        }
    }
}
