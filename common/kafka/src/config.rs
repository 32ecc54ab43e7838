use envconfig::Envconfig;

/// Broker connection and producer tuning, shared by every client of a process.
#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    // Low, records are acked one by one
    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32,

    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32,

    // Delivery gives up after this, the record is then reported as failed
    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32,

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,
}

/// The single input topic of a batch consumer.
#[derive(Envconfig, Clone)]
pub struct ConsumerConfig {
    pub kafka_consumer_group: String,
    pub kafka_consumer_topic: String,

    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest

    // Only offsets stored after a handled batch get committed
    #[envconfig(default = "5000")]
    pub kafka_consumer_auto_commit_interval_ms: i32,
}

impl ConsumerConfig {
    /// Group and topic have no sensible shared default. Binaries call this
    /// with their own before loading their config.
    pub fn set_defaults(consumer_group: &str, consumer_topic: &str) {
        for (var, default) in [
            ("KAFKA_CONSUMER_GROUP", consumer_group),
            ("KAFKA_CONSUMER_TOPIC", consumer_topic),
        ] {
            if std::env::var(var).is_err() {
                std::env::set_var(var, default);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn consumer_needs_group_and_topic() {
        assert!(ConsumerConfig::init_from_hashmap(&HashMap::new()).is_err());

        let config = ConsumerConfig::init_from_hashmap(&HashMap::from([
            ("KAFKA_CONSUMER_GROUP".to_string(), "group".to_string()),
            ("KAFKA_CONSUMER_TOPIC".to_string(), "topic".to_string()),
        ]))
        .expect("failed to load consumer config");

        assert_eq!(config.kafka_consumer_offset_reset, "earliest");
        assert_eq!(config.kafka_consumer_auto_commit_interval_ms, 5000);
    }

    #[test]
    fn set_defaults_keeps_explicit_values() {
        std::env::set_var("KAFKA_CONSUMER_GROUP", "explicit-group");
        ConsumerConfig::set_defaults("default-group", "default-topic");

        assert_eq!(
            std::env::var("KAFKA_CONSUMER_GROUP").as_deref(),
            Ok("explicit-group")
        );
        assert_eq!(
            std::env::var("KAFKA_CONSUMER_TOPIC").as_deref(),
            Ok("default-topic")
        );
    }
}
