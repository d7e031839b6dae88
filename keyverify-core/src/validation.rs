//! Stateless validity checks for inbound verification messages.
//!
//! Checks run on every message before it reaches a request:
//! - type belongs to the `m.key.verification.` namespace
//! - `request`/`ready` advertise a non-empty method list
//! - `request`/`ready`/`start` name the originating device
//! - the send timestamp, when present, falls inside the validity window

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::message::{EventType, VerificationEvent};

/// How long a verification request stays valid, in milliseconds.
pub const VERIFICATION_TIMEOUT_MS: i64 = 600_000;

/// Messages expiring within this many milliseconds are treated as expired.
pub const EXPIRY_MARGIN_MS: i64 = 3_000;

/// Time window inside which a timestamped message is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub timeout: Duration,
    pub margin: Duration,
}

impl Default for ValidityWindow {
    fn default() -> Self {
        Self {
            timeout: Duration::milliseconds(VERIFICATION_TIMEOUT_MS),
            margin: Duration::milliseconds(EXPIRY_MARGIN_MS),
        }
    }
}

/// Why an inbound message was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("type {0} is not a verification message")]
    NotVerification(String),

    #[error("{0} carries no methods")]
    MissingMethods(String),

    #[error("{0} carries no from_device")]
    MissingFromDevice(String),

    #[error("message sent at {0} has expired")]
    Expired(String),

    #[error("message sent at {0} is too far in the future")]
    FromFuture(String),
}

/// Validate a message against the current time.
pub fn validate_event(
    event_type: &str,
    content: &serde_json::Value,
    timestamp: Option<DateTime<Utc>>,
    window: &ValidityWindow,
) -> Result<EventType, Rejection> {
    validate_event_at(event_type, content, timestamp, window, Utc::now())
}

/// Validate a message as of `now`.
pub fn validate_event_at(
    event_type: &str,
    content: &serde_json::Value,
    timestamp: Option<DateTime<Utc>>,
    window: &ValidityWindow,
    now: DateTime<Utc>,
) -> Result<EventType, Rejection> {
    let kind = EventType::from_wire(event_type)
        .ok_or_else(|| Rejection::NotVerification(event_type.to_string()))?;

    if matches!(kind, EventType::Request | EventType::Ready) {
        let has_methods = content
            .get("methods")
            .and_then(|m| m.as_array())
            .is_some_and(|m| !m.is_empty());
        if !has_methods {
            return Err(Rejection::MissingMethods(event_type.to_string()));
        }
    }

    if matches!(kind, EventType::Request | EventType::Ready | EventType::Start) {
        let has_device = content
            .get("from_device")
            .and_then(|d| d.as_str())
            .is_some_and(|d| !d.is_empty());
        if !has_device {
            return Err(Rejection::MissingFromDevice(event_type.to_string()));
        }
    }

    if let Some(sent_at) = timestamp {
        let elapsed = now.signed_duration_since(sent_at);
        if elapsed > window.timeout - window.margin {
            return Err(Rejection::Expired(sent_at.to_rfc3339()));
        }
        if elapsed < -(window.timeout / 2) {
            return Err(Rejection::FromFuture(sent_at.to_rfc3339()));
        }
    }

    Ok(kind)
}

/// Validate a full event against the current time.
pub fn check_event(event: &VerificationEvent, window: &ValidityWindow) -> Result<EventType, Rejection> {
    validate_event(&event.event_type, &event.content, event.timestamp, window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_content() -> serde_json::Value {
        json!({"from_device": "DEV1", "methods": ["m.sas.v1"]})
    }

    #[test]
    fn accepts_well_formed_request() {
        let kind = validate_event(
            "m.key.verification.request",
            &request_content(),
            Some(Utc::now()),
            &ValidityWindow::default(),
        );
        assert_eq!(kind, Ok(EventType::Request));
    }

    #[test]
    fn rejects_foreign_namespace() {
        let result = validate_event("m.room.message", &json!({}), None, &ValidityWindow::default());
        assert!(matches!(result, Err(Rejection::NotVerification(_))));
    }

    #[test]
    fn rejects_missing_or_empty_methods() {
        let window = ValidityWindow::default();
        let empty = json!({"from_device": "DEV1", "methods": []});
        let missing = json!({"from_device": "DEV1"});

        assert!(matches!(
            validate_event("m.key.verification.ready", &empty, None, &window),
            Err(Rejection::MissingMethods(_))
        ));
        assert!(matches!(
            validate_event("m.key.verification.request", &missing, None, &window),
            Err(Rejection::MissingMethods(_))
        ));
    }

    #[test]
    fn rejects_missing_from_device() {
        let window = ValidityWindow::default();
        let start = json!({"method": "m.sas.v1", "from_device": ""});
        assert!(matches!(
            validate_event("m.key.verification.start", &start, None, &window),
            Err(Rejection::MissingFromDevice(_))
        ));

        // cancel and done carry no device
        assert!(validate_event("m.key.verification.done", &json!({}), None, &window).is_ok());
        assert!(validate_event(
            "m.key.verification.cancel",
            &json!({"code": "m.user", "reason": "no"}),
            None,
            &window
        )
        .is_ok());
    }

    #[test]
    fn rejects_stale_request() {
        let now = Utc::now();
        let sent = now - Duration::minutes(20);
        let result = validate_event_at(
            "m.key.verification.request",
            &request_content(),
            Some(sent),
            &ValidityWindow::default(),
            now,
        );
        assert!(matches!(result, Err(Rejection::Expired(_))));
    }

    #[test]
    fn window_boundaries() {
        let window = ValidityWindow::default();
        let now = Utc::now();
        let content = request_content();
        let check = |sent| validate_event_at("m.key.verification.request", &content, Some(sent), &window, now);

        // exactly TIMEOUT - MARGIN old is still accepted
        assert!(check(now - Duration::milliseconds(597_000)).is_ok());
        assert!(check(now - Duration::milliseconds(597_001)).is_err());

        // up to TIMEOUT / 2 in the future is accepted
        assert!(check(now + Duration::milliseconds(300_000)).is_ok());
        assert!(matches!(
            check(now + Duration::milliseconds(300_001)),
            Err(Rejection::FromFuture(_))
        ));
    }

    #[test]
    fn untimestamped_messages_skip_window() {
        let result = validate_event(
            "m.key.verification.request",
            &request_content(),
            None,
            &ValidityWindow::default(),
        );
        assert!(result.is_ok());
    }
}
