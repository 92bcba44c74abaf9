use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::mpsc;

use fairpush_common::types::ScheduledNotification;

/// Finds due scheduled notifications and hands them to the worker queue.
///
/// The due-query and the claim are one atomic statement: a row moves from
/// `pending` to `claimed` exactly once, so a second poll cycle firing before
/// a worker finishes can never enqueue the same item twice.
pub struct Poller {
    pool: PgPool,
    interval: Duration,
    queue: mpsc::UnboundedSender<ScheduledNotification>,
}

impl Poller {
    pub fn new(
        pool: PgPool,
        interval: Duration,
        queue: mpsc::UnboundedSender<ScheduledNotification>,
    ) -> Self {
        Self {
            pool,
            interval,
            queue,
        }
    }

    /// Reset items a previous process claimed but never finalized, so they
    /// become due again instead of staying stranded.
    pub async fn recover_orphaned(&self) -> anyhow::Result<u64> {
        let result =
            sqlx::query("UPDATE scheduled_notifications SET status = 'pending' WHERE status = 'claimed'")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Atomically claim every pending item due at `now` and return it.
    pub async fn claim_due(
        &self,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ScheduledNotification>> {
        let claimed: Vec<ScheduledNotification> = sqlx::query_as(
            r#"
            UPDATE scheduled_notifications
            SET status = 'claimed'
            WHERE status = 'pending' AND when_at <= $1
            RETURNING id, target, event_id, when_at, status, sent_time
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(claimed)
    }

    /// Start the polling loop. Runs indefinitely until the task is cancelled
    /// or the worker queue closes.
    pub async fn run(&self) -> anyhow::Result<()> {
        let recovered = self.recover_orphaned().await?;
        if recovered > 0 {
            tracing::info!(recovered, "reset orphaned claimed notifications to pending");
        }

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "scheduled notification poller started"
        );

        loop {
            match self.claim_due(Utc::now()).await {
                Ok(due) => {
                    if !due.is_empty() {
                        tracing::info!(count = due.len(), "claimed due notifications");
                    }
                    for item in due {
                        if self.queue.send(item).is_err() {
                            anyhow::bail!("worker queue closed, stopping poller");
                        }
                    }
                }
                Err(err) => {
                    // One failed cycle never stops the poller.
                    tracing::error!(error = %err, "poll cycle failed");
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
