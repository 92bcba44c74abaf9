//! Event metadata lookup against the external content API.

use async_trait::async_trait;
use serde::Deserialize;

use fairpush_common::error::AppError;

/// Metadata for one scheduled event, as returned by the content API.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMetadata {
    pub title: String,
    /// ISO-8601 start time with offset.
    pub time: String,
    /// Location slug, when the event has one.
    #[serde(default)]
    pub tent: Option<String>,
    /// The event happens near the tent rather than in it.
    #[serde(default)]
    pub near: Option<bool>,
}

/// Single-item event lookup. An empty result set is a valid "not found"
/// outcome, not an error.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    async fn event(&self, event_id: &str) -> Result<Option<EventMetadata>, AppError>;
}

const EVENT_QUERY: &str = r#"{
	scheduledEventCollection(order: time_ASC, limit: 1, where: {sys: {id: "%ID%"}}) {
		items {
			title
			time
			tent
			near
		}
	}
}"#;

/// GraphQL client for the Contentful space holding the fair schedule.
pub struct ContentfulResolver {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl ContentfulResolver {
    pub fn new(http: reqwest::Client, url: String, token: String) -> Self {
        Self { http, url, token }
    }

    fn query_for(event_id: &str) -> String {
        EVENT_QUERY.replace("%ID%", event_id)
    }
}

#[async_trait]
impl EventSource for ContentfulResolver {
    async fn event(&self, event_id: &str) -> Result<Option<EventMetadata>, AppError> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("query", Self::query_for(event_id))])
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?
            .error_for_status()?;

        let body: GraphqlResponse = response.json().await?;
        Ok(body.into_first_item())
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(rename = "scheduledEventCollection")]
    scheduled_event_collection: Option<EventCollection>,
}

#[derive(Debug, Deserialize)]
struct EventCollection {
    items: Vec<EventMetadata>,
}

impl GraphqlResponse {
    fn into_first_item(self) -> Option<EventMetadata> {
        self.data?
            .scheduled_event_collection?
            .items
            .into_iter()
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_item_response() {
        let body = r#"{
            "data": {
                "scheduledEventCollection": {
                    "items": [
                        {"title": "Talk", "time": "2024-07-01T14:00:00+00:00", "tent": "barn1", "near": null}
                    ]
                }
            }
        }"#;

        let response: GraphqlResponse = serde_json::from_str(body).unwrap();
        let event = response.into_first_item().expect("one item");
        assert_eq!(event.title, "Talk");
        assert_eq!(event.time, "2024-07-01T14:00:00+00:00");
        assert_eq!(event.tent.as_deref(), Some("barn1"));
        assert_eq!(event.near, None);
    }

    #[test]
    fn test_parse_empty_result_set_is_none() {
        let body = r#"{"data": {"scheduledEventCollection": {"items": []}}}"#;
        let response: GraphqlResponse = serde_json::from_str(body).unwrap();
        assert!(response.into_first_item().is_none());
    }

    #[test]
    fn test_parse_null_optional_fields() {
        let body = r#"{
            "data": {
                "scheduledEventCollection": {
                    "items": [{"title": "Show", "time": "2024-07-02T10:30:00+00:00", "tent": null, "near": true}]
                }
            }
        }"#;
        let response: GraphqlResponse = serde_json::from_str(body).unwrap();
        let event = response.into_first_item().unwrap();
        assert!(event.tent.is_none());
        assert_eq!(event.near, Some(true));
    }

    #[test]
    fn test_query_interpolates_event_id() {
        let query = ContentfulResolver::query_for("E1");
        assert!(query.contains(r#"sys: {id: "E1"}"#));
        assert!(query.contains("scheduledEventCollection"));
    }
}
