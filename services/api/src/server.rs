use crate::cli::ServeArgs;
use crate::infra::{spawn_sweeper, AppState};
use crate::routes::with_lifecycle_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rentflow::config::AppConfig;
use rentflow::error::AppError;
use rentflow::telemetry;
use rentflow::workflows::tenancy::{InMemoryLifecycle, SystemClock};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let lifecycle = InMemoryLifecycle::new(Arc::new(SystemClock), &config.lifecycle);
    let sweeper = spawn_sweeper(lifecycle.clone(), config.lifecycle.sweep_interval);

    let app = with_lifecycle_routes(&lifecycle)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        sweep_interval_secs = config.lifecycle.sweep_interval.as_secs(),
        "rental lifecycle service ready"
    );

    let served = axum::serve(listener, app).await;
    sweeper.abort();
    served?;
    Ok(())
}
