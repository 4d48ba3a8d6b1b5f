use thiserror::Error;

pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("store error: {0}")]
    Store(#[from] saga_store::StoreError),

    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
