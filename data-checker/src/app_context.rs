use std::sync::Arc;

use anyhow::Result;
use common_kafka::kafka_consumer::BatchConsumer;
use common_kafka::kafka_producer::create_kafka_producer;
use health::{HealthHandle, HealthRegistry};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::checker::DataChecker;
use crate::config::Config;
use crate::publisher::{KafkaPublisher, PublishGateway};
use crate::store::{PgMediaStore, PgSpecimenStore};

pub struct AppContext {
    pub health_registry: HealthRegistry,
    pub worker_liveness: HealthHandle,
    pub consumer: BatchConsumer,
    pub publisher: Arc<dyn PublishGateway>,
    pub checker: DataChecker,
    pub config: Config,
}

impl AppContext {
    pub async fn new(config: Config) -> Result<Self> {
        let health_registry = HealthRegistry::new("liveness");
        // A batch can wait on the store and on every delivery, leave it room
        let worker_liveness = health_registry.register("worker", time::Duration::seconds(60));
        let kafka_liveness = health_registry.register("rdkafka", time::Duration::seconds(30));

        let consumer = BatchConsumer::new(&config.kafka, &config.consumer)?;
        let producer = create_kafka_producer(&config.kafka, kafka_liveness)?;
        let publisher: Arc<dyn PublishGateway> =
            Arc::new(KafkaPublisher::new(producer, config.topics.clone()));

        let options = PgPoolOptions::new().max_connections(config.max_pg_connections);
        let pool = options.connect(&config.database_url).await?;
        info!("connected to the specimen store");

        let checker = DataChecker::new(
            Arc::new(PgSpecimenStore::new(pool.clone())),
            Arc::new(PgMediaStore::new(pool)),
            publisher.clone(),
            config.app_pid.as_str(),
            config.doi_proxy.as_str(),
        );

        Ok(Self {
            health_registry,
            worker_liveness,
            consumer,
            publisher,
            checker,
            config,
        })
    }
}
