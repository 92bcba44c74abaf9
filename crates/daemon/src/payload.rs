//! Builds the reminder payload shown to the subscriber.

use chrono::DateTime;

use fairpush_common::types::{NotificationData, ScheduledNotification};

use crate::resolver::EventMetadata;
use crate::tents::TentCache;

/// Assemble the notification data for one event reminder.
///
/// Body reads `Starting at 02:00 PM in Main Barn` (or `near` when the event
/// is beside the tent rather than inside it). Actions always link to the
/// event detail page; a second action centers the map on the tent when the
/// event has a location.
pub fn build_event_payload(
    item: &ScheduledNotification,
    event: &EventMetadata,
    tents: &TentCache,
) -> anyhow::Result<NotificationData> {
    // Keep the event's own offset: fair-local times come back as ISO-8601
    // with the offset already applied.
    let start = DateTime::parse_from_rfc3339(&event.time)?;
    let mut body = format!("Starting at {}", start.format("%I:%M %p"));

    if let Some(slug) = &event.tent {
        let name = tents.resolve(slug);
        let preposition = if event.near.unwrap_or(false) {
            "near"
        } else {
            "in"
        };
        body.push_str(&format!(" {preposition} {name}"));
    }

    let mut actions = vec![serde_json::json!({
        "action": format!("/schedule#{}", item.event_id),
        "title": "More Details",
    })];
    if let Some(slug) = &event.tent {
        actions.push(serde_json::json!({
            "action": format!("/map?locate={slug}"),
            "title": "Show on Map",
        }));
    }

    Ok(NotificationData {
        title: format!("Upcoming 4-H event: {}", event.title),
        body,
        options: serde_json::json!({
            "timestamp": item.when_at.timestamp_millis(),
            "actions": actions,
        }),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use fairpush_common::types::DeliveryState;

    use super::*;

    fn make_item(event_id: &str) -> ScheduledNotification {
        ScheduledNotification {
            id: Uuid::new_v4(),
            target: Uuid::new_v4(),
            event_id: event_id.to_string(),
            when_at: Utc.with_ymd_and_hms(2024, 7, 1, 13, 45, 0).unwrap(),
            status: DeliveryState::Claimed,
            sent_time: None,
        }
    }

    fn make_event(tent: Option<&str>, near: Option<bool>) -> EventMetadata {
        EventMetadata {
            title: "Talk".to_string(),
            time: "2024-07-01T14:00:00+00:00".to_string(),
            tent: tent.map(str::to_string),
            near,
        }
    }

    fn barn_cache() -> TentCache {
        let cache = TentCache::new();
        cache.replace(HashMap::from([(
            "barn1".to_string(),
            "Main Barn".to_string(),
        )]));
        cache
    }

    #[test]
    fn test_payload_with_tent() {
        let item = make_item("E1");
        let data = build_event_payload(&item, &make_event(Some("barn1"), None), &barn_cache())
            .unwrap();

        assert_eq!(data.title, "Upcoming 4-H event: Talk");
        assert_eq!(data.body, "Starting at 02:00 PM in Main Barn");
        assert_eq!(
            data.options["timestamp"],
            item.when_at.timestamp_millis()
        );

        let actions = data.options["actions"].as_array().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0]["action"], "/schedule#E1");
        assert_eq!(actions[0]["title"], "More Details");
        assert_eq!(actions[1]["action"], "/map?locate=barn1");
        assert_eq!(actions[1]["title"], "Show on Map");
    }

    #[test]
    fn test_payload_near_tent() {
        let item = make_item("E1");
        let data =
            build_event_payload(&item, &make_event(Some("barn1"), Some(true)), &barn_cache())
                .unwrap();
        assert_eq!(data.body, "Starting at 02:00 PM near Main Barn");
    }

    #[test]
    fn test_payload_without_tent_has_single_action() {
        let item = make_item("E2");
        let data = build_event_payload(&item, &make_event(None, None), &barn_cache()).unwrap();

        assert_eq!(data.body, "Starting at 02:00 PM");
        let actions = data.options["actions"].as_array().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["action"], "/schedule#E2");
    }

    #[test]
    fn test_payload_unknown_slug_falls_back() {
        let item = make_item("E3");
        let data =
            build_event_payload(&item, &make_event(Some("mystery"), None), &TentCache::new())
                .unwrap();
        assert_eq!(data.body, "Starting at 02:00 PM in mystery");
    }

    #[test]
    fn test_payload_keeps_event_offset() {
        let item = make_item("E4");
        let event = EventMetadata {
            title: "Early".to_string(),
            time: "2024-07-01T09:05:00-04:00".to_string(),
            tent: None,
            near: None,
        };
        let data = build_event_payload(&item, &event, &TentCache::new()).unwrap();
        assert_eq!(data.body, "Starting at 09:05 AM");
    }

    #[test]
    fn test_payload_bad_time_is_an_error() {
        let item = make_item("E5");
        let event = EventMetadata {
            title: "Broken".to_string(),
            time: "not a time".to_string(),
            tent: None,
            near: None,
        };
        assert!(build_event_payload(&item, &event, &TentCache::new()).is_err());
    }
}
