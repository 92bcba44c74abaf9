use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a scheduled notification.
///
/// Transitions are one-way: `Pending -> Claimed -> Sent | Failed`. The poller
/// performs the `Pending -> Claimed` step atomically so a due item can never
/// be enqueued twice, and a worker finalizes the claimed item exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Claimed,
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryState::Pending => write!(f, "pending"),
            DeliveryState::Claimed => write!(f, "claimed"),
            DeliveryState::Sent => write!(f, "sent"),
            DeliveryState::Failed => write!(f, "failed"),
        }
    }
}

/// A registered browser/device push channel.
///
/// The delivery engine mutates subscribers in exactly two ways: setting
/// `valid = false` (with a recorded reason) when the push service reports the
/// endpoint permanently gone, and appending ids to the `failed` list. A
/// subscriber with `valid = false` or `registered = false` never receives
/// delivery attempts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscriber {
    pub id: Uuid,
    /// Push service URL for this channel.
    pub endpoint: String,
    /// Client public key (P-256, base64url).
    pub p256dh: String,
    /// Client auth secret (base64url).
    pub auth: String,
    pub registered: bool,
    pub valid: bool,
    pub invalid_reason: Option<serde_json::Value>,
    /// Ids of notifications and scheduled notifications that failed to reach
    /// this subscriber. Append-only.
    pub failed: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// An immediate (fire-and-forget) notification record.
///
/// Never mutated after the delivery pass completes; there is no retry of
/// immediate notifications.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    /// Arbitrary structured extras: image URL, timestamp, action links.
    pub options: serde_json::Value,
    /// Subscriber ids attempted during the broadcast. Append-only; after a
    /// broadcast it equals exactly the subscriber snapshot taken at dispatch.
    pub attempted: Vec<Uuid>,
    /// Subscriber ids whose delivery failed. Always a subset of `attempted`.
    pub failed: Vec<Uuid>,
}

/// A scheduled event reminder targeting a single subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduledNotification {
    pub id: Uuid,
    /// Target subscriber id.
    pub target: Uuid,
    /// Source event identifier in the external content API.
    pub event_id: String,
    /// Scheduled delivery time.
    pub when_at: DateTime<Utc>,
    pub status: DeliveryState,
    /// Set exactly once, when the item reaches a terminal state.
    pub sent_time: Option<DateTime<Utc>>,
}

/// The `data` block of the envelope shown to the service worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationData {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Wire envelope delivered to push clients:
/// `{"type":"notification","id":…,"time":<ms since epoch UTC>,"data":{…}}`.
#[derive(Debug, Clone, Serialize)]
pub struct PushEnvelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub time: i64,
    pub data: NotificationData,
}

impl PushEnvelope {
    pub fn notification(id: String, time_ms: i64, data: NotificationData) -> Self {
        Self {
            kind: "notification",
            id,
            time: time_ms,
            data,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_envelope_wire_shape() {
        let created = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let envelope = PushEnvelope::notification(
            "0a0b0c0d-0000-0000-0000-000000000001".to_string(),
            created.timestamp_millis(),
            NotificationData {
                title: "Alert".to_string(),
                body: "Test".to_string(),
                options: serde_json::json!({ "image": "https://img.example/x.png" }),
            },
        );

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "notification",
                "id": "0a0b0c0d-0000-0000-0000-000000000001",
                "time": 1719835200000i64,
                "data": {
                    "title": "Alert",
                    "body": "Test",
                    "options": { "image": "https://img.example/x.png" }
                }
            })
        );
    }

    #[test]
    fn test_delivery_state_display() {
        assert_eq!(DeliveryState::Pending.to_string(), "pending");
        assert_eq!(DeliveryState::Claimed.to_string(), "claimed");
        assert_eq!(DeliveryState::Sent.to_string(), "sent");
        assert_eq!(DeliveryState::Failed.to_string(), "failed");
    }
}
