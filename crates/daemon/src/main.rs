use std::sync::Arc;

use tokio::sync::mpsc;

use fairpush_common::config::AppConfig;
use fairpush_common::db;
use fairpush_daemon::poller::Poller;
use fairpush_daemon::resolver::ContentfulResolver;
use fairpush_daemon::tents::{self, TentCache};
use fairpush_daemon::worker::{self, WorkerContext};
use fairpush_delivery::WebPushDelivery;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fairpush_daemon=info,fairpush_delivery=info".into()),
        )
        .json()
        .init();

    tracing::info!("Fairpush scheduled notification daemon starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let client = Arc::new(WebPushDelivery::new(
        config.vapid_private_key.clone(),
        config.vapid_subject.clone(),
        config.delivery_timeout(),
    )?);

    let http = reqwest::Client::new();

    // Tent name cache with its own refresher lifecycle
    let tents = Arc::new(TentCache::new());
    tokio::spawn(tents::run_refresher(
        Arc::clone(&tents),
        http.clone(),
        config.tent_slugs_url.clone(),
        config.tent_refresh_interval(),
    ));

    let resolver = Arc::new(ContentfulResolver::new(
        http,
        config.content_api_url.clone(),
        config.content_api_token.clone(),
    ));

    // Worker pool consuming the due-notification queue
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let ctx = WorkerContext {
        pool: pool.clone(),
        client,
        events: resolver,
        tents,
    };
    let workers = worker::spawn_workers(config.worker_count, ctx, queue_rx);
    tracing::info!(count = workers.len(), "notification workers started");

    let poller = Poller::new(pool, config.poll_interval(), queue_tx);

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = poller.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "poller exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Fairpush daemon stopped.");
    Ok(())
}
