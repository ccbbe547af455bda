use anyhow::Context;
use internconnect::app::build_router;
use internconnect::config::AppConfig;
use internconnect::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "internconnect=info,tower_http=info".into()),
        )
        .init();

    tracing::info!("Starting InternConnect server...");

    let config = AppConfig::load().context("Failed to load configuration")?;
    let addr = config.bind_addr.clone();

    let state = AppState::connect(config)
        .await
        .context("Failed to initialize application state")?;
    tracing::info!(
        database = %state.config.mongodb_database,
        "Connected to MongoDB"
    );

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
