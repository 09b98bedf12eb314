use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tierwatch_client::build_source;
use tierwatch_core::config::{ResolverConfig, UpstreamConfig, source_kind_from_env};
use tierwatch_db::{Database, DatabaseConfig};
use tierwatch_server::routes;
use tierwatch_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tierwatch=info".parse()?))
        .with_target(false)
        .init();

    let port = std::env::var("TIERWATCH_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let upstream = UpstreamConfig::from_env()?;
    let source = build_source(&upstream, source_kind_from_env()?)?;
    let state = Arc::new(AppState::new(
        db,
        source,
        upstream.servers.clone(),
        ResolverConfig::from_env()?,
    ));

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
