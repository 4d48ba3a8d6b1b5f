use prometheus::{Histogram, HistogramOpts, IntCounter, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct ConsumerMetrics {
    pub processed: IntCounter,
    pub processing_duration: Histogram,
}

impl ConsumerMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();
        let snake = service.replace('-', "_");

        let processed = IntCounter::with_opts(
            Opts::new(
                format!("{snake}_events_processed_total"),
                "Total number of events applied by this consumer",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for events_processed_total");

        let processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "consumer_processing_duration_seconds",
                "Time taken to apply one event",
            )
            .const_label("service", service.to_string())
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0]),
        )
        .expect("valid metric opts for consumer_processing_duration_seconds");

        for metric in [
            Box::new(processed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(processing_duration.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register consumer metric: {}", e);
            }
        }

        Self {
            processed,
            processing_duration,
        }
    }
}
