//! Broadcast fan-out.
//!
//! Given a built notification record, deliver it to every subscriber matching
//! `valid AND registered`, concurrently, bounded by a fixed worker limit.
//! Per-subscriber failures are persisted as they happen; the aggregate
//! `attempted` list is written once, after the whole fan-out has joined.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use fairpush_common::types::{Notification, NotificationData, PushEnvelope, Subscriber};

use crate::client::PushClient;
use crate::error::DeliveryError;

/// Insert and return a new immediate-notification record.
pub async fn create_notification(
    pool: &PgPool,
    title: &str,
    body: &str,
    options: serde_json::Value,
) -> Result<Notification, sqlx::Error> {
    let notification = Notification {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        title: title.to_string(),
        body: body.to_string(),
        options,
        attempted: Vec::new(),
        failed: Vec::new(),
    };

    sqlx::query(
        r#"
        INSERT INTO notifications (id, created_at, title, body, options)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(notification.id)
    .bind(notification.created_at)
    .bind(&notification.title)
    .bind(&notification.body)
    .bind(&notification.options)
    .execute(pool)
    .await?;

    Ok(notification)
}

/// Fans one notification out to the deliverable subscriber set.
pub struct Dispatcher<C: PushClient> {
    pool: PgPool,
    client: Arc<C>,
    concurrency: usize,
}

impl<C: PushClient> Dispatcher<C> {
    pub fn new(pool: PgPool, client: Arc<C>, concurrency: usize) -> Self {
        Self {
            pool,
            client,
            concurrency,
        }
    }

    /// Deliver `notification` to every valid, registered subscriber.
    ///
    /// The subscriber set is snapshotted once at invocation; subscribers
    /// registering afterwards are not included. Tasks are independent and
    /// order-insensitive, capped at `concurrency` in flight. Returns the
    /// number of subscribers attempted.
    pub async fn broadcast(&self, notification: &Notification) -> anyhow::Result<usize> {
        let subscribers: Vec<Subscriber> = sqlx::query_as(
            "SELECT * FROM subscribers WHERE valid = TRUE AND registered = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;

        let payload = Arc::new(envelope_bytes(notification)?);
        let attempted: Vec<Uuid> = subscribers.iter().map(|s| s.id).collect();

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for subscriber in subscribers {
            let permit = semaphore.clone().acquire_owned().await?;
            let client = Arc::clone(&self.client);
            let pool = self.pool.clone();
            let payload = Arc::clone(&payload);
            let notification_id = notification.id;

            tasks.spawn(async move {
                let _permit = permit;
                deliver_to_subscriber(&pool, client.as_ref(), &subscriber, notification_id, &payload)
                    .await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "delivery task panicked");
            }
        }

        // One batched update covering exactly the dispatch-time snapshot.
        if !attempted.is_empty() {
            sqlx::query("UPDATE notifications SET attempted = attempted || $1 WHERE id = $2")
                .bind(&attempted)
                .bind(notification.id)
                .execute(&self.pool)
                .await?;
        }

        tracing::info!(
            notification_id = %notification.id,
            attempted = attempted.len(),
            "broadcast complete"
        );

        Ok(attempted.len())
    }

    /// Admin single-target path: deliver to one subscriber by id, skipping
    /// the fan-out and the batched `attempted` update. Returns whether the
    /// delivery succeeded.
    pub async fn send_to_subscriber(
        &self,
        subscriber_id: Uuid,
        notification: &Notification,
    ) -> anyhow::Result<bool> {
        let subscriber: Option<Subscriber> =
            sqlx::query_as("SELECT * FROM subscribers WHERE id = $1")
                .bind(subscriber_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(subscriber) = subscriber else {
            anyhow::bail!("subscriber {subscriber_id} not found");
        };

        let payload = envelope_bytes(notification)?;
        Ok(deliver_to_subscriber(
            &self.pool,
            self.client.as_ref(),
            &subscriber,
            notification.id,
            &payload,
        )
        .await)
    }
}

fn envelope_bytes(notification: &Notification) -> serde_json::Result<Vec<u8>> {
    PushEnvelope::notification(
        notification.id.to_string(),
        notification.created_at.timestamp_millis(),
        NotificationData {
            title: notification.title.clone(),
            body: notification.body.clone(),
            options: notification.options.clone(),
        },
    )
    .to_bytes()
}

/// Deliver one payload to one subscriber and persist the outcome.
///
/// Success leaves the subscriber untouched. On error the notification id is
/// appended to the subscriber's failure list and the subscriber id to the
/// notification's; a *gone* endpoint additionally invalidates the subscriber.
/// Repository errors here are logged and swallowed so one subscriber can
/// never abort the rest of a fan-out.
pub async fn deliver_to_subscriber<C: PushClient + ?Sized>(
    pool: &PgPool,
    client: &C,
    subscriber: &Subscriber,
    notification_id: Uuid,
    payload: &[u8],
) -> bool {
    match client.deliver(subscriber, payload).await {
        Ok(()) => {
            tracing::info!(
                subscriber_id = %subscriber.id,
                notification_id = %notification_id,
                "notification delivered"
            );
            true
        }
        Err(err) => {
            tracing::warn!(
                subscriber_id = %subscriber.id,
                notification_id = %notification_id,
                status = err.http_status(),
                error = %err,
                "push delivery failed"
            );

            if err.is_gone() {
                invalidate_subscriber(pool, subscriber.id, &err).await;
            }
            record_subscriber_failure(pool, subscriber.id, notification_id).await;

            let result =
                sqlx::query("UPDATE notifications SET failed = array_append(failed, $1) WHERE id = $2")
                    .bind(subscriber.id)
                    .bind(notification_id)
                    .execute(pool)
                    .await;
            if let Err(db_err) = result {
                tracing::error!(
                    notification_id = %notification_id,
                    error = %db_err,
                    "failed to record notification failure"
                );
            }

            false
        }
    }
}

/// Permanently mark a subscriber's endpoint unusable, recording why.
pub async fn invalidate_subscriber(pool: &PgPool, subscriber_id: Uuid, err: &DeliveryError) {
    let result = sqlx::query("UPDATE subscribers SET valid = FALSE, invalid_reason = $1 WHERE id = $2")
        .bind(err.invalidation_reason())
        .bind(subscriber_id)
        .execute(pool)
        .await;

    match result {
        Ok(_) => tracing::info!(
            subscriber_id = %subscriber_id,
            status = err.http_status(),
            "subscriber invalidated, endpoint gone"
        ),
        Err(db_err) => tracing::error!(
            subscriber_id = %subscriber_id,
            error = %db_err,
            "failed to invalidate subscriber"
        ),
    }
}

/// Append a failed notification (or scheduled notification) id to the
/// subscriber's failure list.
pub async fn record_subscriber_failure(pool: &PgPool, subscriber_id: Uuid, failed_id: Uuid) {
    let result = sqlx::query("UPDATE subscribers SET failed = array_append(failed, $1) WHERE id = $2")
        .bind(failed_id)
        .bind(subscriber_id)
        .execute(pool)
        .await;

    if let Err(db_err) = result {
        tracing::error!(
            subscriber_id = %subscriber_id,
            error = %db_err,
            "failed to record subscriber failure"
        );
    }
}
