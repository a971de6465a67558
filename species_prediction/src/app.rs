use crate::{
    auth::ApiKey,
    config::Config,
    ort_service::OrtModelService,
    registry::ModelRegistry,
    server::{HttpServer, SharedState},
    telemetry::Metrics,
};
use std::{error::Error, sync::Arc};
use tokio::signal;

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let registry = match ModelRegistry::<OrtModelService>::load(&config.models) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            tracing::error!("Failed to load models: {}", e);
            return Err(Box::new(e));
        }
    };

    let api_key = ApiKey::new(&config.auth.api_key);
    if !api_key.is_configured() {
        tracing::warn!("No API key configured, every prediction request will be rejected");
    }

    let metrics = Metrics::new()?;
    metrics.install_global();

    let state = SharedState {
        registry,
        api_key: Arc::new(api_key),
        metrics: Arc::new(metrics),
    };

    let server = HttpServer::new(state, &config.server).await?;
    server.run(shutdown_signal()).await?;

    tracing::info!("Prediction service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
