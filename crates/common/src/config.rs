use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// VAPID private key (base64url-encoded ES256 key) used to sign pushes
    pub vapid_private_key: String,

    /// VAPID `sub` claim identifying the sender
    pub vapid_subject: String,

    /// Content API GraphQL endpoint for event metadata
    pub content_api_url: String,

    /// Bearer token for the content API
    pub content_api_token: String,

    /// Remote JSON document mapping tent slug -> display name
    pub tent_slugs_url: String,

    /// Number of scheduled-notification workers (default: 5)
    pub worker_count: usize,

    /// Due-notification poll interval in seconds (default: 60)
    pub poll_interval_secs: u64,

    /// Tent name cache refresh interval in seconds (default: 3600)
    pub tent_refresh_interval_secs: u64,

    /// Maximum in-flight deliveries during a broadcast (default: 75)
    pub broadcast_concurrency: usize,

    /// Per-delivery timeout in seconds (default: 30)
    pub delivery_timeout_secs: u64,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            vapid_private_key: std::env::var("VAPID_PRIVATE_KEY").map_err(|_| {
                anyhow::anyhow!("VAPID_PRIVATE_KEY environment variable is required")
            })?,
            vapid_subject: std::env::var("VAPID_SUBJECT")
                .unwrap_or_else(|_| "mailto:vapid_claims@4hcomputers.club".to_string()),
            content_api_url: std::env::var("CONTENT_API_URL").unwrap_or_else(|_| {
                "https://graphql.contentful.com/content/v1/spaces/e34g9w63217k/".to_string()
            }),
            content_api_token: std::env::var("CONTENT_API_TOKEN").map_err(|_| {
                anyhow::anyhow!("CONTENT_API_TOKEN environment variable is required")
            })?,
            tent_slugs_url: std::env::var("TENT_SLUGS_URL").unwrap_or_else(|_| {
                "https://raw.githubusercontent.com/cyfinfaza/sc4hfair-sveltekit/main/src/data/tentSlugs.json"
                    .to_string()
            }),
            worker_count: std::env::var("NUM_WORKERS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NUM_WORKERS must be a valid usize"))?,
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("POLL_INTERVAL_SECS must be a valid u64"))?,
            tent_refresh_interval_secs: std::env::var("TENT_REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TENT_REFRESH_INTERVAL_SECS must be a valid u64"))?,
            broadcast_concurrency: std::env::var("BROADCAST_CONCURRENCY")
                .unwrap_or_else(|_| "75".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BROADCAST_CONCURRENCY must be a valid usize"))?,
            delivery_timeout_secs: std::env::var("DELIVERY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DELIVERY_TIMEOUT_SECS must be a valid u64"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn tent_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.tent_refresh_interval_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}
