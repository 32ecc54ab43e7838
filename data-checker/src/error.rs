use common_kafka::kafka_producer::KafkaProduceError;
use thiserror::Error;

/// Errors reading from or writing to the specimen and media tables.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("stored json for record {id} could not be mapped: {error}")]
    MappingError {
        id: String,
        error: serde_json::Error,
    },
}

/// A record could not be handed over to its downstream topic.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to publish to {topic}: {error}")]
    DeliveryError {
        topic: String,
        error: KafkaProduceError,
    },
}

/// Errors that fail a whole batch. Publish failures never end up here, they
/// are logged per record.
#[derive(Error, Debug)]
pub enum CheckerError {
    #[error("store unavailable: {0}")]
    StoreError(#[from] StoreError),
}
