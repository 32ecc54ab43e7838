use axum::{routing::get, Router};
use health::HealthRegistry;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::metrics_consts::BATCH_PROCESSING_TIME;

/// Bind a `TcpListener` on the provided bind address to serve a `Router` on it.
pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}

pub fn router(liveness: HealthRegistry, metrics: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route(
            "/_liveness",
            get(move || std::future::ready(liveness.get_status())),
        );

    match metrics {
        Some(recorder_handle) => router.route(
            "/metrics",
            get(move || std::future::ready(recorder_handle.render())),
        ),
        None => router,
    }
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, anyhow::Error> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(BATCH_PROCESSING_TIME.to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .install_recorder()?;
    Ok(handle)
}

async fn index() -> &'static str {
    "data checker"
}
