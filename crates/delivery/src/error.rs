use std::time::Duration;

use thiserror::Error;
use web_push::WebPushError;

/// A failed push exchange, carrying the HTTP status the push service
/// answered with where one exists.
///
/// The *gone* sub-kind (HTTP 404/410) means the endpoint is permanently
/// unusable and the subscriber must be invalidated. Every other sub-kind is
/// transient but unretried: failure is terminal per delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("push endpoint gone (HTTP {status})")]
    EndpointGone { status: u16, body: Option<String> },

    #[error("push service rejected delivery (HTTP {status})")]
    Rejected { status: u16, body: Option<String> },

    #[error("push delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("push client error: {0}")]
    Client(#[from] WebPushError),
}

impl DeliveryError {
    /// Classify a `web-push` error into a status-carrying delivery error.
    ///
    /// 404 (endpoint not found) and 410 (endpoint no longer valid) both mean
    /// the URL should never be used again.
    pub fn from_web_push(err: WebPushError) -> Self {
        match err {
            WebPushError::EndpointNotFound => DeliveryError::EndpointGone {
                status: 404,
                body: None,
            },
            WebPushError::EndpointNotValid => DeliveryError::EndpointGone {
                status: 410,
                body: None,
            },
            WebPushError::Unauthorized => DeliveryError::Rejected {
                status: 401,
                body: None,
            },
            WebPushError::BadRequest(message) => DeliveryError::Rejected {
                status: 400,
                body: message,
            },
            WebPushError::PayloadTooLarge => DeliveryError::Rejected {
                status: 413,
                body: None,
            },
            WebPushError::ServerError(_) => DeliveryError::Rejected {
                status: 503,
                body: None,
            },
            other => DeliveryError::Client(other),
        }
    }

    /// The endpoint is permanently gone and the subscriber must never be
    /// delivered to again.
    pub fn is_gone(&self) -> bool {
        matches!(self, DeliveryError::EndpointGone { .. })
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            DeliveryError::EndpointGone { status, .. } => Some(*status),
            DeliveryError::Rejected { status, .. } => Some(*status),
            DeliveryError::Timeout(_) | DeliveryError::Client(_) => None,
        }
    }

    pub fn response_body(&self) -> Option<&str> {
        match self {
            DeliveryError::EndpointGone { body, .. } => body.as_deref(),
            DeliveryError::Rejected { body, .. } => body.as_deref(),
            DeliveryError::Timeout(_) | DeliveryError::Client(_) => None,
        }
    }

    /// JSON blob persisted as the subscriber's invalidation reason.
    pub fn invalidation_reason(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.to_string(),
            "status": self.http_status(),
            "body": self.response_body(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_not_found_maps_to_gone_404() {
        let err = DeliveryError::from_web_push(WebPushError::EndpointNotFound);
        assert!(err.is_gone());
        assert_eq!(err.http_status(), Some(404));
    }

    #[test]
    fn test_endpoint_not_valid_maps_to_gone_410() {
        let err = DeliveryError::from_web_push(WebPushError::EndpointNotValid);
        assert!(err.is_gone());
        assert_eq!(err.http_status(), Some(410));
    }

    #[test]
    fn test_server_error_is_not_gone() {
        let err = DeliveryError::from_web_push(WebPushError::ServerError(None));
        assert!(!err.is_gone());
        assert_eq!(err.http_status(), Some(503));
    }

    #[test]
    fn test_bad_request_carries_body() {
        let err =
            DeliveryError::from_web_push(WebPushError::BadRequest(Some("bad vapid".to_string())));
        assert!(!err.is_gone());
        assert_eq!(err.http_status(), Some(400));
        assert_eq!(err.response_body(), Some("bad vapid"));
    }

    #[test]
    fn test_unclassified_errors_have_no_status() {
        let err = DeliveryError::from_web_push(WebPushError::InvalidUri);
        assert!(!err.is_gone());
        assert_eq!(err.http_status(), None);
    }

    #[test]
    fn test_invalidation_reason_shape() {
        let err = DeliveryError::EndpointGone {
            status: 410,
            body: Some("gone".to_string()),
        };
        let reason = err.invalidation_reason();
        assert_eq!(reason["status"], 410);
        assert_eq!(reason["body"], "gone");
    }
}
