//! Startup helpers for the relay server.

use std::process::ExitCode;

use crate::domain::config::RelayConfig;
use crate::server::{self, AppState};

/// Install the global `tracing` subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Run the server until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting neural relay v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        return ExitCode::from(1);
    }
    log_provider_defaults(&config);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async {
        let state = AppState::new(&config).await?;
        server::run_server_with_shutdown(state, config.server.port, shutdown_signal()).await
    });

    if let Err(e) = result {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    tracing::info!("Neural relay stopped");
    ExitCode::SUCCESS
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn log_provider_defaults(config: &RelayConfig) {
    let providers = &config.providers;
    tracing::info!(
        openai_key = providers.openai.api_key.is_some(),
        gemini_key = providers.gemini.api_key.is_some(),
        ollama = %providers.ollama.base_url,
        "Provider defaults loaded"
    );
}
