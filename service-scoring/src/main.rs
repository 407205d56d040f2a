// =====================================================================================
// File: service-scoring/src/main.rs
// Description: HTTP server entrypoint for the risk-scoring service
// =====================================================================================

use anyhow::Context;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use core_scoring::{
    CapabilitySet, Pipeline, RegistryVerificationClient, RestOcrProvider, ScoringConfig,
};
use service_scoring::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ScoringConfig::load().context("loading scoring configuration")?;
    info!(
        service = %config.settings.service_name,
        environment = %config.settings.environment,
        state_path = %config.settings.state_path.display(),
        "Starting scoring service"
    );

    let mut capabilities = CapabilitySet::standard();
    if let Some(path) = &config.settings.detection_model_path {
        warn!(
            path = %path.display(),
            "Detection model configured but no in-process backend is installed; using declared-type fallback"
        );
    }
    if let (Some(endpoint), Some(api_key)) = (
        config.settings.ocr_endpoint.clone(),
        config.settings.ocr_api_key.clone(),
    ) {
        capabilities.ocr_provider = Some(Arc::new(RestOcrProvider::new(
            endpoint,
            api_key,
            config.settings.media_timeout_secs,
        )));
    }

    let verification = Arc::new(RegistryVerificationClient::with_seed_registry());
    let pipeline = Arc::new(Pipeline::new(config, capabilities, verification)?);

    let addr = env::var("VIDYA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "Scoring service listening");

    axum::serve(listener, router(AppState::new(pipeline)))
        .await
        .context("serving")?;
    Ok(())
}
