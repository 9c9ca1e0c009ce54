//! Service binary: wire state, run startup recovery, serve HTTP.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lectio_api::{create_router, AppState};
use lectio_pipeline::LifecycleManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lectio=debug")),
        )
        .init();

    info!("Starting lectio-api");

    let state = match AppState::from_env() {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to build application state: {e}");
            std::process::exit(1);
        }
    };

    // Startup: runtime checks, cleanup pass + schedule, interrupted-job
    // recovery.
    let mut lifecycle = LifecycleManager::new(
        state.layout.clone(),
        Arc::clone(&state.job_manager),
        Arc::clone(&state.cleanup),
        state.config.strict_runtime_checks,
    );
    let report = lifecycle.run_startup().await?;
    if !report.all_present() {
        info!(?report, "Running with missing runtime tools; renders will fail until installed");
    }

    let router = create_router(state);
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        })
        .await?;

    lifecycle.run_shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
