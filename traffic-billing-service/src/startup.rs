use crate::config::TrafficBillingConfig;
use crate::handlers;
use crate::services::{BillingPipeline, LocalStorage, PdfConverter, Storage, WkhtmltopdfConverter};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TrafficBillingConfig>,
    pub storage: Arc<dyn Storage>,
    pub pipeline: Arc<BillingPipeline>,
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(config: TrafficBillingConfig) -> Result<Self, AppError> {
        let converter = WkhtmltopdfConverter::new(
            config.pdf.wkhtmltopdf_path.clone(),
            Duration::from_secs(config.pdf.timeout_secs),
        );
        Self::build_with(config, Arc::new(converter)).await
    }

    /// Builds the server around a given PDF converter.
    pub async fn build_with(
        config: TrafficBillingConfig,
        converter: Arc<dyn PdfConverter>,
    ) -> Result<Self, AppError> {
        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(&config.storage.output_dir)
                .await
                .map_err(|e| {
                    tracing::error!(
                        "Failed to initialize output directory at {}: {}",
                        config.storage.output_dir,
                        e
                    );
                    e
                })?,
        );

        let config = Arc::new(config);
        let pipeline = Arc::new(BillingPipeline::new(
            config.clone(),
            storage.clone(),
            converter,
        )?);

        let state = AppState {
            config: config.clone(),
            storage,
            pipeline,
        };

        let app = build_router(state, config.server.max_upload_bytes);

        let addr = format!("{}:{}", config.server.host, config.common.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(
            "/",
            get(handlers::upload_page).post(handlers::create_run_page),
        )
        .route("/api/invoice-runs", post(handlers::create_run))
        .route("/download/:filename", get(handlers::download_file))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
