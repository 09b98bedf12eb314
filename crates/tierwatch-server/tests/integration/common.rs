use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use tierwatch_client::build_source;
use tierwatch_core::config::{ResolverConfig, SourceKind, UpstreamConfig};
use tierwatch_db::Database;
use tierwatch_server::routes;
use tierwatch_server::state::AppState;

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub _container: ContainerAsync<GenericImage>,
}

/// Start PostgreSQL, apply the real migrations and build the router with
/// the synthetic source so no test touches the network.
pub async fn setup_test_app() -> TestApp {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "tierwatch_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/tierwatch_test");
    let db = Database::from_pool(retry_connect(&url).await);
    db.migrate().await.expect("Failed to run migrations");

    let upstream = UpstreamConfig::default();
    let source = build_source(&upstream, SourceKind::Synthetic).expect("synthetic source");
    let state = Arc::new(AppState::new(
        db.clone(),
        source,
        upstream.servers.clone(),
        ResolverConfig::default(),
    ));

    TestApp {
        router: routes::router(state),
        db,
        _container: container,
    }
}

async fn retry_connect(url: &str) -> PgPool {
    for _ in 0..30 {
        if let Ok(pool) = PgPoolOptions::new().max_connections(5).connect(url).await {
            return pool;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to test database");
}
