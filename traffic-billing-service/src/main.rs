use service_core::observability::{init_metrics, init_tracing};
use traffic_billing_service::config::TrafficBillingConfig;
use traffic_billing_service::startup::Application;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Recorder must exist before the first counter is touched.
    init_metrics();

    let config = TrafficBillingConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "traffic-billing-service",
        "info",
        config.common.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        output_dir = %config.storage.output_dir,
        ledger_enabled = config.ledger.enabled,
        "Starting traffic-billing-service"
    );

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    application.run_until_stopped().await
}
