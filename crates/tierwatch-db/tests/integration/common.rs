use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Schema statements from `migrations/`, executed one at a time.
const MIGRATIONS: &[&str] = &[
    // 0001_characters.sql
    r#"CREATE TABLE IF NOT EXISTS characters (
        id BIGSERIAL PRIMARY KEY,
        server VARCHAR(64) NOT NULL,
        name VARCHAR(128) NOT NULL,
        class_name VARCHAR(64) NOT NULL,
        race VARCHAR(64),
        level INTEGER NOT NULL DEFAULT 0,
        power BIGINT NOT NULL DEFAULT 0,
        stats JSONB,
        raw_payload JSONB,
        profile JSONB NOT NULL DEFAULT '{}'::jsonb,
        is_synthetic BOOLEAN NOT NULL DEFAULT FALSE,
        power_index BIGINT,
        contributions JSONB,
        tier_rank VARCHAR(4),
        percentile DOUBLE PRECISION,
        scored_at TIMESTAMPTZ,
        fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT uq_characters_identity UNIQUE (server, name),
        CONSTRAINT chk_characters_level CHECK (level >= 0),
        CONSTRAINT chk_characters_power CHECK (power >= 0)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_characters_ranked
        ON characters(server, power_index DESC) WHERE power_index IS NOT NULL"#,
    r#"CREATE INDEX IF NOT EXISTS idx_characters_synthetic
        ON characters(id) WHERE is_synthetic"#,
    r#"CREATE TABLE IF NOT EXISTS character_stats (
        id BIGSERIAL PRIMARY KEY,
        character_id BIGINT NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
        stats JSONB NOT NULL,
        power BIGINT NOT NULL,
        level INTEGER NOT NULL,
        captured_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_character_stats_history
        ON character_stats(character_id, captured_at DESC)"#,
    r#"CREATE TABLE IF NOT EXISTS server_average_stats (
        server VARCHAR(64) PRIMARY KEY,
        averages JSONB NOT NULL,
        sample_size BIGINT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ranking_snapshots (
        scope VARCHAR(64) PRIMARY KEY,
        entries JSONB NOT NULL,
        top JSONB NOT NULL,
        generated_at TIMESTAMPTZ NOT NULL
    )"#,
    // 0002_scoring_jobs.sql
    r#"CREATE TABLE IF NOT EXISTS scoring_jobs (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        kind VARCHAR(64) NOT NULL,
        status VARCHAR(20) NOT NULL DEFAULT 'pending',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ,
        retry_count INTEGER NOT NULL DEFAULT 0,
        max_retries INTEGER NOT NULL DEFAULT 3,
        next_retry_at TIMESTAMPTZ,
        error_message TEXT,
        report JSONB,
        worker_id VARCHAR(255),
        CONSTRAINT chk_scoring_jobs_status CHECK (
            status IN ('pending', 'running', 'completed', 'failed')
        )
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scoring_jobs_pending ON scoring_jobs(created_at) WHERE status = 'pending'"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scoring_jobs_retry ON scoring_jobs(next_retry_at) WHERE status = 'pending' AND next_retry_at IS NOT NULL"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scoring_jobs_worker ON scoring_jobs(worker_id) WHERE status = 'running'"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scoring_jobs_active ON scoring_jobs(kind) WHERE status IN ('pending', 'running')"#,
];

/// Starts PostgreSQL in a container and returns a migrated pool.
///
/// Keep the returned container alive for the whole test; dropping it
/// stops the database.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
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

    // The ready message is printed once before the final restart.
    let mut attempts = 0u32;
    let pool = loop {
        match PgPoolOptions::new().max_connections(5).connect(&url).await {
            Ok(pool) => break pool,
            Err(_) if attempts < 30 => {
                attempts += 1;
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            Err(e) => panic!("Database never became reachable: {e}"),
        }
    };

    for statement in MIGRATIONS {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to apply schema");
    }

    (pool, container)
}
