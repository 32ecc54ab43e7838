use std::sync::Arc;

use anyhow::Result;
use data_checker::{
    app_context::AppContext,
    config::Config,
    consumer::parse_batch,
    server::{router, serve, setup_metrics_recorder},
};
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

fn start_health_liveness_server(
    config: &Config,
    context: Arc<AppContext>,
) -> Result<JoinHandle<()>> {
    let router = router(
        context.health_registry.clone(),
        Some(setup_metrics_recorder()?),
    );
    let bind = config.bind();
    Ok(tokio::task::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!("health server stopped: {}", e);
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_with_defaults()?;
    let context = Arc::new(AppContext::new(config.clone()).await?);

    start_health_liveness_server(&config, context.clone())?;

    let batch_size = config.batch_size;
    let batch_wait_time = config.batch_timeout_ms.0;

    loop {
        context.worker_liveness.report_healthy();
        let batch = context
            .consumer
            .recv_batch(batch_size, batch_wait_time)
            .await?;

        let events = parse_batch(&batch, context.publisher.as_ref()).await;

        // A failed batch is never stored, so it comes back after the restart
        if let Err(e) = context.checker.handle_batch(events).await {
            error!("Error handling batch, exiting: {}", e);
            return Err(e.into());
        }

        context.consumer.store_offsets(&batch)?;
    }
}
