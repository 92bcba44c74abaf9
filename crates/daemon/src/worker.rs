//! Worker pool consuming the due-notification queue.
//!
//! Each worker dequeues one claimed item, looks up its target subscriber,
//! resolves event metadata, builds and delivers the payload, and finalizes
//! the item. Every failure is caught per item and converted into persisted
//! state; one worker's failure never stops the pool or the poller. A
//! repository error mid-item releases the claim back to `pending` so the
//! reminder is retried on a later poll instead of stranding as claimed.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use fairpush_common::types::{
    DeliveryState, PushEnvelope, ScheduledNotification, Subscriber,
};
use fairpush_delivery::client::PushClient;
use fairpush_delivery::dispatcher::{invalidate_subscriber, record_subscriber_failure};

use crate::payload::build_event_payload;
use crate::resolver::EventSource;
use crate::tents::TentCache;

/// Everything a worker needs to process one scheduled notification.
pub struct WorkerContext<C: PushClient, E: EventSource> {
    pub pool: PgPool,
    pub client: Arc<C>,
    pub events: Arc<E>,
    pub tents: Arc<TentCache>,
}

impl<C: PushClient, E: EventSource> Clone for WorkerContext<C, E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            client: Arc::clone(&self.client),
            events: Arc::clone(&self.events),
            tents: Arc::clone(&self.tents),
        }
    }
}

/// Spawn `count` workers sharing one queue receiver.
pub fn spawn_workers<C: PushClient, E: EventSource>(
    count: usize,
    ctx: WorkerContext<C, E>,
    queue: mpsc::UnboundedReceiver<ScheduledNotification>,
) -> Vec<JoinHandle<()>> {
    let queue = Arc::new(Mutex::new(queue));

    (0..count)
        .map(|worker_id| {
            let ctx = ctx.clone();
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                worker_loop(worker_id, ctx, queue).await;
            })
        })
        .collect()
}

async fn worker_loop<C: PushClient, E: EventSource>(
    worker_id: usize,
    ctx: WorkerContext<C, E>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<ScheduledNotification>>>,
) {
    tracing::info!(worker_id, "notification worker started");

    loop {
        // Hold the lock only for the dequeue, never across processing.
        let item = { queue.lock().await.recv().await };
        let Some(item) = item else {
            tracing::info!(worker_id, "queue closed, worker stopping");
            break;
        };

        if let Err(err) = process_item(&ctx, &item).await {
            tracing::error!(
                worker_id,
                scheduled_id = %item.id,
                error = %err,
                "failed to process scheduled notification"
            );
            // A repository error left the item claimed without a terminal
            // state. Hand it back so a later poll cycle retries it.
            release(&ctx.pool, item.id).await;
        }
    }
}

/// Process one claimed scheduled notification through to a terminal state.
pub async fn process_item<C: PushClient, E: EventSource>(
    ctx: &WorkerContext<C, E>,
    item: &ScheduledNotification,
) -> anyhow::Result<()> {
    let subscriber: Option<Subscriber> = sqlx::query_as(
        "SELECT * FROM subscribers WHERE id = $1 AND valid = TRUE AND registered = TRUE",
    )
    .bind(item.target)
    .fetch_optional(&ctx.pool)
    .await?;

    let Some(subscriber) = subscriber else {
        tracing::warn!(
            scheduled_id = %item.id,
            target = %item.target,
            "subscriber missing or not deliverable"
        );
        finalize(&ctx.pool, item.id, DeliveryState::Failed).await?;
        return Ok(());
    };

    let event = match ctx.events.event(&item.event_id).await {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::warn!(
                scheduled_id = %item.id,
                event_id = %item.event_id,
                "no event found for scheduled notification"
            );
            finalize(&ctx.pool, item.id, DeliveryState::Failed).await?;
            return Ok(());
        }
        Err(err) => {
            tracing::error!(
                scheduled_id = %item.id,
                event_id = %item.event_id,
                error = %err,
                "event metadata fetch failed"
            );
            finalize(&ctx.pool, item.id, DeliveryState::Failed).await?;
            return Ok(());
        }
    };

    let data = match build_event_payload(item, &event, &ctx.tents) {
        Ok(data) => data,
        Err(err) => {
            tracing::error!(
                scheduled_id = %item.id,
                error = %err,
                "could not build reminder payload"
            );
            finalize(&ctx.pool, item.id, DeliveryState::Failed).await?;
            return Ok(());
        }
    };

    let envelope =
        PushEnvelope::notification(item.id.to_string(), item.when_at.timestamp_millis(), data);
    let payload = envelope.to_bytes()?;

    match ctx.client.deliver(&subscriber, &payload).await {
        Ok(()) => {
            tracing::info!(
                scheduled_id = %item.id,
                subscriber_id = %subscriber.id,
                "scheduled notification delivered"
            );
            finalize(&ctx.pool, item.id, DeliveryState::Sent).await?;
        }
        Err(err) => {
            tracing::warn!(
                scheduled_id = %item.id,
                subscriber_id = %subscriber.id,
                status = err.http_status(),
                error = %err,
                "scheduled delivery failed"
            );
            if err.is_gone() {
                invalidate_subscriber(&ctx.pool, subscriber.id, &err).await;
            }
            record_subscriber_failure(&ctx.pool, subscriber.id, item.id).await;
            finalize(&ctx.pool, item.id, DeliveryState::Failed).await?;
        }
    }

    Ok(())
}

/// Best-effort return of a claimed item to `pending` after a processing
/// error, so the next poll picks it up again. Items that already reached a
/// terminal state stay there.
pub async fn release(pool: &PgPool, id: Uuid) {
    let result = sqlx::query(
        "UPDATE scheduled_notifications SET status = 'pending' WHERE id = $1 AND status = 'claimed'",
    )
    .bind(id)
    .execute(pool)
    .await;

    if let Err(err) = result {
        tracing::warn!(
            scheduled_id = %id,
            error = %err,
            "could not release claimed notification, startup recovery will reset it"
        );
    }
}

/// Move a claimed item to its terminal state, stamping `sent_time` once.
pub async fn finalize(pool: &PgPool, id: Uuid, state: DeliveryState) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE scheduled_notifications
        SET status = $2, sent_time = $3
        WHERE id = $1 AND status = 'claimed'
        "#,
    )
    .bind(id)
    .bind(state.to_string())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}
