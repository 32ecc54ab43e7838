use std::time::Duration;

use health::HealthHandle;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use serde::Serialize;
use serde_json::error::Error as SerdeError;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::KafkaConfig;

pub struct KafkaContext {
    liveness: HealthHandle,
}

impl From<HealthHandle> for KafkaContext {
    fn from(value: HealthHandle) -> Self {
        KafkaContext { liveness: value }
    }
}

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, _: rdkafka::Statistics) {
        // Signal liveness, as the main rdkafka loop is running and calling us
        self.liveness.report_healthy();
    }
}

pub fn create_kafka_producer(
    config: &KafkaConfig,
    liveness: HealthHandle,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        );

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    debug!("rdkafka configuration: {:?}", client_config);
    let producer: FutureProducer<KafkaContext> =
        client_config.create_with_context(liveness.into())?;

    // "Ping" the brokers, fail start-up if we can't reach them
    match producer
        .client()
        .fetch_metadata(None, Timeout::After(Duration::from_secs(15)))
    {
        Ok(metadata) => info!(
            "connected to Kafka brokers, found {} topics",
            metadata.topics().len()
        ),
        Err(error) => {
            error!("failed to fetch metadata from Kafka brokers: {:?}", error);
            return Err(error);
        }
    }

    Ok(producer)
}

#[derive(Error, Debug)]
pub enum KafkaProduceError {
    #[error("failed to serialize: {error}")]
    SerializationError { error: SerdeError },
    #[error("failed to produce to kafka: {error}")]
    KafkaProduceError { error: KafkaError },
    #[error("failed to produce to kafka (timeout)")]
    KafkaProduceCanceled,
}

/// Serializes `item` as json and waits for the broker ack.
pub async fn send_json_to_kafka<T, C>(
    producer: &FutureProducer<C>,
    topic: &str,
    key: Option<&str>,
    item: &T,
) -> Result<(), KafkaProduceError>
where
    T: Serialize + ?Sized,
    C: rdkafka::ClientContext + 'static,
{
    let payload = serde_json::to_string(item)
        .map_err(|error| KafkaProduceError::SerializationError { error })?;
    send_raw_to_kafka(producer, topic, key, &payload).await
}

pub async fn send_raw_to_kafka<C>(
    producer: &FutureProducer<C>,
    topic: &str,
    key: Option<&str>,
    payload: &str,
) -> Result<(), KafkaProduceError>
where
    C: rdkafka::ClientContext + 'static,
{
    let record = FutureRecord {
        topic,
        key,
        payload: Some(payload),
        timestamp: None,
        partition: None,
        headers: None,
    };

    let delivery = producer
        .send_result(record)
        .map_err(|(error, _)| KafkaProduceError::KafkaProduceError { error })?;

    match delivery.await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err((error, _))) => Err(KafkaProduceError::KafkaProduceError { error }),
        Err(_) => Err(KafkaProduceError::KafkaProduceCanceled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use health::HealthRegistry;
    use rdkafka::mocking::MockCluster;
    use serde_json::json;

    #[tokio::test]
    async fn send_json_reaches_the_mock_broker() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("rdkafka", time::Duration::seconds(30));
        let cluster = MockCluster::new(1).expect("failed to create mock brokers");
        let config = KafkaConfig {
            kafka_producer_linger_ms: 0,
            kafka_producer_queue_mib: 50,
            kafka_message_timeout_ms: 5000,
            kafka_compression_codec: "none".to_string(),
            kafka_tls: false,
            kafka_hosts: cluster.bootstrap_servers(),
        };
        let producer = create_kafka_producer(&config, handle).expect("failed to create producer");

        send_json_to_kafka(&producer, "topic", Some("key"), &json!({"a": 1}))
            .await
            .expect("failed to send json");
        send_raw_to_kafka(&producer, "topic", None, "not json")
            .await
            .expect("failed to send raw");
    }
}
