use std::sync::Arc;

use saferoute::api::{AppState, build_app};
use saferoute::config::load_config;
use saferoute::dataset::IncidentSet;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // 1. Load the startup incident dataset; serving with none is fine
    let incidents = match IncidentSet::load_file(&config.incidents_path, config.zero_coordinates) {
        Ok(set) => {
            tracing::info!(
                path = %config.incidents_path.display(),
                count = set.len(),
                dropped = set.dropped,
                "loaded incident dataset"
            );
            set
        }
        Err(e) => {
            tracing::warn!(
                path = %config.incidents_path.display(),
                error = %e,
                "failed to load incident dataset, starting empty"
            );
            IncidentSet::empty("none")
        }
    };

    // 2. Setup Router
    let bind_addr = config.bind_addr;
    let app = build_app(Arc::new(AppState::new(config, incidents)));

    tracing::info!(%bind_addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
