use async_trait::async_trait;
use common_kafka::kafka_producer::{send_json_to_kafka, send_raw_to_kafka, KafkaContext};
use rdkafka::producer::FutureProducer;

use crate::config::TopicConfig;
use crate::error::PublishError;
use crate::types::{MasJobRequest, MediaEvent, SpecimenEvent};

/// Everything the checker hands downstream. Each call waits for the broker to
/// acknowledge the record.
#[async_trait]
pub trait PublishGateway: Send + Sync {
    /// New or changed specimens, for the processing service.
    async fn publish_specimen(&self, event: &SpecimenEvent) -> Result<(), PublishError>;

    /// New or changed media whose specimen is not being republished.
    async fn publish_media(&self, event: &MediaEvent) -> Result<(), PublishError>;

    /// Duplicates, back onto the input topic for a later batch.
    async fn resubmit(&self, event: &SpecimenEvent) -> Result<(), PublishError>;

    async fn publish_mas_job_request(&self, request: &MasJobRequest) -> Result<(), PublishError>;

    /// Messages that could not be read at all, forwarded untouched.
    async fn dead_letter_raw(&self, payload: &str) -> Result<(), PublishError>;
}

pub struct KafkaPublisher {
    producer: FutureProducer<KafkaContext>,
    topics: TopicConfig,
}

impl KafkaPublisher {
    pub fn new(producer: FutureProducer<KafkaContext>, topics: TopicConfig) -> Self {
        Self { producer, topics }
    }

    async fn send<T: serde::Serialize + Sync>(
        &self,
        topic: &str,
        key: &str,
        item: &T,
    ) -> Result<(), PublishError> {
        send_json_to_kafka(&self.producer, topic, Some(key), item)
            .await
            .map_err(|error| PublishError::DeliveryError {
                topic: topic.to_owned(),
                error,
            })
    }
}

#[async_trait]
impl PublishGateway for KafkaPublisher {
    async fn publish_specimen(&self, event: &SpecimenEvent) -> Result<(), PublishError> {
        self.send(
            self.topics.specimen_topic.as_str(),
            event.physical_id(),
            event,
        )
        .await
    }

    async fn publish_media(&self, event: &MediaEvent) -> Result<(), PublishError> {
        self.send(self.topics.media_topic.as_str(), event.access_uri(), event)
            .await
    }

    async fn resubmit(&self, event: &SpecimenEvent) -> Result<(), PublishError> {
        self.send(
            self.topics.republish_topic.as_str(),
            event.physical_id(),
            event,
        )
        .await
    }

    async fn publish_mas_job_request(&self, request: &MasJobRequest) -> Result<(), PublishError> {
        self.send(self.topics.mas_topic.as_str(), &request.mas_id, request)
            .await
    }

    async fn dead_letter_raw(&self, payload: &str) -> Result<(), PublishError> {
        let topic = self.topics.dlq_topic.as_str();
        send_raw_to_kafka(&self.producer, topic, None, payload)
            .await
            .map_err(|error| PublishError::DeliveryError {
                topic: topic.to_owned(),
                error,
            })
    }
}
