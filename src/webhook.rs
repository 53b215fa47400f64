use crate::agent::{Notification, NotificationKind, Reminder, format_reminder};
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

pub const DEFAULT_MAX_AGE_SECS: i64 = 300;

/// Notifications waiting to be shown, shared by the webhook handler, the
/// calendar agent callback and the chat loop.
#[derive(Debug, Clone, Default)]
pub struct ProactiveQueue(Arc<Mutex<Vec<Notification>>>);

impl ProactiveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, notification: Notification) {
        self.guard().push(notification);
    }

    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.guard())
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_payload: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl WebhookResponse {
    fn ok(message: &str, now: DateTime<Utc>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            event_id: None,
            update_type: None,
            received_payload: None,
            timestamp: now,
        }
    }

    fn failed(error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            event_id: None,
            update_type: None,
            received_payload: None,
            timestamp: now,
        }
    }
}

/// Validates inbound calendar webhooks and turns them into queued notifications.
#[derive(Debug, Clone)]
pub struct WebhookHandler {
    max_age_secs: i64,
    queue: ProactiveQueue,
}

impl WebhookHandler {
    pub fn new(max_age_secs: i64, queue: ProactiveQueue) -> Self {
        Self {
            max_age_secs,
            queue,
        }
    }

    pub fn queue(&self) -> &ProactiveQueue {
        &self.queue
    }

    pub fn process(&self, payload: &Value) -> WebhookResponse {
        self.process_at(payload, Utc::now())
    }

    /// Dispatch on `event_type` as of `now`.
    pub fn process_at(&self, payload: &Value, now: DateTime<Utc>) -> WebhookResponse {
        if let Err(e) = self.validate(payload, now) {
            warn!(error = %e, "webhook rejected");
            return WebhookResponse::failed(e.to_string(), now);
        }

        match str_field(payload, "event_type").unwrap_or("unknown") {
            "meeting_reminder" => self.meeting_reminder(payload, now),
            "calendar_update" => self.calendar_update(payload, now),
            "test" => WebhookResponse {
                received_payload: Some(payload.clone()),
                ..WebhookResponse::ok("Test webhook received successfully", now)
            },
            other => WebhookResponse::failed(format!("Unknown event type: {other}"), now),
        }
    }

    /// Required fields present and `timestamp` within `max_age_secs` of `now`.
    pub fn validate(&self, payload: &Value, now: DateTime<Utc>) -> Result<()> {
        for field in ["event_type", "timestamp"] {
            if payload.get(field).is_none() {
                return Err(Error::webhook(format!("missing required field: {field}")));
            }
        }
        let raw = str_field(payload, "timestamp")
            .ok_or_else(|| Error::webhook("timestamp must be a string"))?;
        let sent = parse_timestamp(raw)
            .ok_or_else(|| Error::webhook(format!("invalid timestamp format: {raw}")))?;
        let age = (now - sent.with_timezone(&Utc)).num_seconds().abs();
        if age > self.max_age_secs {
            return Err(Error::webhook(format!("webhook too old: {age} seconds")));
        }
        Ok(())
    }

    /// Drain queued notifications.
    pub fn take_pending(&self) -> Vec<Notification> {
        self.queue.drain()
    }

    pub fn push(&self, kind: NotificationKind, content: impl Into<String>) {
        self.queue.push(Notification::new(kind, content));
        info!(?kind, "added proactive message");
    }

    fn meeting_reminder(&self, payload: &Value, now: DateTime<Utc>) -> WebhookResponse {
        let event_id = str_field(payload, "event_id").map(String::from);
        let summary = str_field(payload, "event_summary").unwrap_or("Unknown Meeting");
        let start = str_field(payload, "event_start").and_then(parse_timestamp);
        let attendees = attendee_names(payload.get("attendees"));

        let content = format_reminder(&Reminder {
            summary,
            start,
            location: str_field(payload, "event_location"),
            attendees: &attendees,
            description: str_field(payload, "description"),
            insights: None,
            list_empty_attendees: true,
        });

        let mut notification = Notification::new(NotificationKind::MeetingReminder, content)
            .with_event_id(event_id.clone());
        notification.event_summary = Some(summary.to_string());
        notification.event_start = str_field(payload, "event_start").map(String::from);
        self.queue.push(notification);
        info!(summary, "meeting reminder webhook processed");

        WebhookResponse {
            event_id,
            ..WebhookResponse::ok("Meeting reminder processed successfully", now)
        }
    }

    fn calendar_update(&self, payload: &Value, now: DateTime<Utc>) -> WebhookResponse {
        let update_type = str_field(payload, "update_type").unwrap_or("unknown");
        let summary = str_field(payload, "event_summary").unwrap_or("Unknown Event");
        let event_id = str_field(payload, "event_id").map(String::from);

        let content = format!(
            "📅 Calendar Update: {} - {summary}",
            title_case(update_type)
        );
        let mut notification = Notification::new(NotificationKind::CalendarUpdate, content)
            .with_event_id(event_id);
        notification.event_summary = Some(summary.to_string());
        notification.update_type = Some(update_type.to_string());
        self.queue.push(notification);
        info!(update_type, summary, "calendar update webhook processed");

        WebhookResponse {
            update_type: Some(update_type.to_string()),
            ..WebhookResponse::ok("Calendar update processed successfully", now)
        }
    }
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// RFC 3339, or a naive ISO-8601 timestamp read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Attendees may be plain strings or `{email, displayName}` objects.
fn attendee_names(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => str_field(item, "displayName")
                .or_else(|| str_field(item, "email"))
                .map(String::from),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Uppercase the first letter of each alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
    }

    fn handler() -> WebhookHandler {
        WebhookHandler::new(DEFAULT_MAX_AGE_SECS, ProactiveQueue::new())
    }

    #[test]
    fn stale_and_future_timestamps_are_rejected() {
        let h = handler();
        let stale = json!({"event_type": "test", "timestamp": "2025-06-02T11:54:59Z"});
        let resp = h.process_at(&stale, now());
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("too old: 301 seconds"));

        let future = json!({"event_type": "test", "timestamp": "2025-06-02T12:06:00Z"});
        assert!(!h.process_at(&future, now()).success);

        let edge = json!({"event_type": "test", "timestamp": "2025-06-02T11:55:00Z"});
        assert!(h.process_at(&edge, now()).success);
    }

    #[test]
    fn missing_fields_fail_validation() {
        let h = handler();
        let err = h
            .validate(&json!({"timestamp": "2025-06-02T12:00:00Z"}), now())
            .unwrap_err();
        assert!(err.to_string().contains("event_type"));
        assert!(h.validate(&json!({"event_type": "test"}), now()).is_err());
        assert!(
            h.validate(&json!({"event_type": "test", "timestamp": "yesterday"}), now())
                .is_err()
        );
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let h = handler();
        let payload = json!({"event_type": "test", "timestamp": "2025-06-02T11:58:00.123"});
        assert!(h.validate(&payload, now()).is_ok());
    }

    #[test]
    fn meeting_reminder_is_queued() {
        let h = handler();
        let payload = json!({
            "event_type": "meeting_reminder",
            "timestamp": "2025-06-02T12:00:00+00:00",
            "event_id": "evt-9",
            "event_summary": "Design review",
            "event_start": "2025-06-02T12:15:00Z",
            "event_location": "Room 4"
        });
        let resp = h.process_at(&payload, now());
        assert!(resp.success);
        assert_eq!(resp.event_id.as_deref(), Some("evt-9"));

        let pending = h.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, NotificationKind::MeetingReminder);
        assert!(pending[0].content.contains("**Design review**"));
        assert!(pending[0].content.contains("12:15 PM on June 02, 2025"));
        assert!(pending[0].content.contains("No attendees listed"));
        assert!(h.take_pending().is_empty());
    }

    #[test]
    fn calendar_update_title_cases_type() {
        let h = handler();
        let payload = json!({
            "event_type": "calendar_update",
            "timestamp": "2025-06-02T12:00:00Z",
            "update_type": "event_rescheduled",
            "event_summary": "Standup"
        });
        let resp = h.process_at(&payload, now());
        assert_eq!(resp.update_type.as_deref(), Some("event_rescheduled"));
        let pending = h.take_pending();
        assert_eq!(
            pending[0].content,
            "📅 Calendar Update: Event_Rescheduled - Standup"
        );
    }

    #[test]
    fn test_event_echoes_and_unknown_fails() {
        let h = handler();
        let payload = json!({"event_type": "test", "timestamp": "2025-06-02T12:00:00Z", "x": 1});
        let resp = h.process_at(&payload, now());
        assert_eq!(resp.received_payload, Some(payload));
        assert!(h.queue().is_empty());

        let unknown = json!({"event_type": "party", "timestamp": "2025-06-02T12:00:00Z"});
        let resp = h.process_at(&unknown, now());
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("Unknown event type: party"));
    }

    #[test]
    fn attendees_accept_strings_and_objects() {
        let names = attendee_names(Some(&json!([
            "ana@example.com",
            {"email": "bo@example.com", "displayName": "Bo"},
            {"email": "cy@example.com"},
            42
        ])));
        assert_eq!(names, vec!["ana@example.com", "Bo", "cy@example.com"]);
    }
}
