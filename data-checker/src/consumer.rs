use common_kafka::kafka_consumer::Batch;
use tracing::{error, warn};

use crate::metrics_consts::{DEAD_LETTERED, EMPTY_EVENTS, EVENTS_RECEIVED, EVENT_PARSE_ERROR};
use crate::publisher::PublishGateway;
use crate::types::SpecimenEvent;

/// Reads every message of a batch as a specimen event.
///
/// Messages that are not a valid event are forwarded as-is to the dead letter
/// topic and left out. Empty messages are skipped. Offsets are stored after
/// the batch is handled, so a redelivered batch dead-letters them again.
pub async fn parse_batch(batch: &Batch, publisher: &dyn PublishGateway) -> Vec<SpecimenEvent> {
    metrics::counter!(EVENTS_RECEIVED).increment(batch.len() as u64);

    let mut events = Vec::with_capacity(batch.len());
    for message in &batch.messages {
        let payload = match message.payload.as_deref() {
            Some(payload) if !payload.is_empty() => payload,
            _ => {
                warn!(
                    "Skipping empty message at {}:{}",
                    message.partition, message.offset
                );
                metrics::counter!(EMPTY_EVENTS).increment(1);
                continue;
            }
        };

        match serde_json::from_slice::<SpecimenEvent>(payload) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(
                    "Failed to parse message at {}:{}: {}",
                    message.partition, message.offset, e
                );
                metrics::counter!(EVENT_PARSE_ERROR).increment(1);
                let raw = String::from_utf8_lossy(payload);
                match publisher.dead_letter_raw(&raw).await {
                    Ok(()) => metrics::counter!(DEAD_LETTERED).increment(1),
                    Err(e) => error!("Failed to dead letter unreadable message: {}", e),
                }
            }
        }
    }
    events
}
