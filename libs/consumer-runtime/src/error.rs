use thiserror::Error;

pub type ConsumerResult<T> = std::result::Result<T, ConsumerError>;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("store error: {0}")]
    Store(#[from] saga_store::StoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("handler error: {0}")]
    Handler(#[source] anyhow::Error),
}
