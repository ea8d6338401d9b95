use crate::cli::ServeArgs;
use crate::infra::{load_catalog, AppState, InMemoryCaisseRepository, TracingEventPublisher};
use crate::routes::with_caisse_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use caisse_imprevue::config::AppConfig;
use caisse_imprevue::error::AppError;
use caisse_imprevue::telemetry;
use caisse_imprevue::workflows::caisse::{ContractService, DemandService};
use std::sync::atomic::{AtomicBool, Ordering};
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
    if let Some(path) = args.catalog_csv.take() {
        config.caisse.catalog_csv = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    let catalog = Arc::new(load_catalog(config.caisse.catalog_csv.as_deref())?);
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        catalog: catalog.clone(),
    };

    let repository = Arc::new(InMemoryCaisseRepository::default());
    let events = Arc::new(TracingEventPublisher);
    let policy = config.caisse.policy.clone();
    let demands = Arc::new(DemandService::new(
        catalog,
        repository.clone(),
        events.clone(),
        policy.clone(),
    ));
    let contracts = Arc::new(ContractService::new(repository, events, policy));

    let app = with_caisse_routes(demands, contracts)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "caisse imprévue service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
