use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open the shared Postgres pool backing the dispatcher and the daemon.
///
/// `max_connections` comes from `DB_MAX_CONNECTIONS` (default 20) and has to
/// cover the broadcast fan-out plus the worker pool, which all borrow from
/// this one pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "database pool ready");
    Ok(pool)
}
