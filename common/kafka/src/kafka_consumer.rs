use std::time::Duration;

use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message,
};
use tokio::time::Instant;
use tracing::debug;

use crate::config::{ConsumerConfig, KafkaConfig};

/// A consumer on a single topic that hands out messages in batches.
///
/// Offsets are never stored automatically: callers store them with
/// [`BatchConsumer::store_offsets`] once the whole batch has been handled, so a
/// batch that fails is redelivered after a restart.
pub struct BatchConsumer {
    consumer: StreamConsumer,
    topic: String,
}

/// One consumed message. `payload` is `None` for tombstones.
pub struct RawMessage {
    pub payload: Option<Vec<u8>>,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Default)]
pub struct Batch {
    pub messages: Vec<RawMessage>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl BatchConsumer {
    pub fn new(
        common_config: &KafkaConfig,
        consumer_config: &ConsumerConfig,
    ) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &common_config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", &consumer_config.kafka_consumer_group)
            .set(
                "auto.offset.reset",
                &consumer_config.kafka_consumer_offset_reset,
            )
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                consumer_config
                    .kafka_consumer_auto_commit_interval_ms
                    .to_string(),
            )
            .set("enable.auto.offset.store", "false");

        if common_config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka consumer configuration: {:?}", client_config);
        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[consumer_config.kafka_consumer_topic.as_str()])?;

        Ok(Self {
            consumer,
            topic: consumer_config.kafka_consumer_topic.clone(),
        })
    }

    /// Collects messages until `max_size` are buffered or `max_wait` has
    /// passed. An idle topic yields an empty batch once `max_wait` is up, so
    /// callers keep looping and reporting health.
    pub async fn recv_batch(
        &self,
        max_size: usize,
        max_wait: Duration,
    ) -> Result<Batch, KafkaError> {
        let mut batch = Batch {
            messages: Vec::with_capacity(max_size),
        };

        let deadline = Instant::now() + max_wait;
        while batch.len() < max_size {
            match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                Ok(Ok(message)) => batch.messages.push(to_raw(&message)),
                Ok(Err(e)) => return Err(e),
                Err(_) => break,
            }
        }

        Ok(batch)
    }

    /// Marks every message of the batch as processed, the next auto commit
    /// picks them up.
    pub fn store_offsets(&self, batch: &Batch) -> Result<(), KafkaError> {
        for message in &batch.messages {
            self.consumer
                .store_offset(&self.topic, message.partition, message.offset)?;
        }
        Ok(())
    }
}

fn to_raw<M: Message>(message: &M) -> RawMessage {
    RawMessage {
        payload: message.payload().map(<[u8]>::to_vec),
        partition: message.partition(),
        offset: message.offset(),
    }
}
