use crate::config::CalendarConfig;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NOT_CONFIGURED: &str =
    "Calendar credentials not configured. Please set up Google Calendar API credentials.";

pub const NO_EVENTS: &str = "No upcoming events found.";

const DEFAULT_MEETING_MINUTES: i64 = 30;
const DEFAULT_MEETING_LOCATION: &str = "Google Meet";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    /// All-day events carry a date only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl EventTime {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            date_time: Some(instant.fixed_offset()),
            date: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Attendee {
    pub fn name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(n) if !n.is_empty() => n,
            _ => &self.email,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub start: Option<EventTime>,
    #[serde(default)]
    pub end: Option<EventTime>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

impl CalendarEvent {
    /// Timed start; `None` for all-day or malformed events.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start
            .as_ref()
            .and_then(|s| s.date_time)
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or("Unknown Meeting")
    }

    /// Display names (or emails) of attendees, skipping blanks.
    pub fn attendee_names(&self) -> Vec<String> {
        self.attendees
            .iter()
            .map(|a| a.name().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

/// Body of an event insert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
}

/// Read and write access to one calendar.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    fn is_configured(&self) -> bool {
        true
    }

    /// Events starting in `[start, end]`, ordered by start time.
    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>>;

    async fn insert_event(&self, event: &NewEvent) -> Result<CalendarEvent>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<CalendarEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Google Calendar v3 REST client authenticated with a bearer token.
pub struct GoogleCalendar {
    http: HttpClient,
    base_url: String,
    calendar_id: String,
    access_token: Option<String>,
}

impl GoogleCalendar {
    pub fn new(
        http: HttpClient,
        base_url: impl Into<String>,
        calendar_id: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            calendar_id: calendar_id.into(),
            access_token,
        }
    }

    pub fn from_config(config: &CalendarConfig, http: HttpClient) -> Self {
        let token = std::env::var(&config.access_token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            debug!(env = %config.access_token_env, "no calendar access token in environment");
        }
        Self::new(http, &config.base_url, &config.calendar_id, token)
    }

    fn token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| Error::config("calendar access token not set"))
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.base_url, self.calendar_id)
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendar {
    fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        let token = self.token()?;
        let url = self.events_url();
        let time_min = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = end.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", "250"),
            ];
            if let Some(t) = page_token.as_deref() {
                query.push(("pageToken", t));
            }
            let page: EventsPage = self.http.get_json_authed(&url, token, &query).await?;
            events.extend(page.items);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        debug!(count = events.len(), "fetched calendar events");
        Ok(events)
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<CalendarEvent> {
        let token = self.token()?;
        let body = serde_json::to_string(event)
            .map_err(|e| Error::parse(format!("serialize event: {e}")))?;
        let auth = format!("Bearer {token}");
        let text = self
            .http
            .post_json_raw(&self.events_url(), &body, &[("Authorization", auth.as_str())])
            .await?;
        serde_json::from_str(&text).map_err(|e| Error::parse(format!("parse created event: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct MeetingRequest {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub attendees: Vec<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// User-facing calendar operations over any [`CalendarSource`].
#[derive(Clone)]
pub struct CalendarTool {
    source: Arc<dyn CalendarSource>,
}

impl CalendarTool {
    pub fn new(source: Arc<dyn CalendarSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> Arc<dyn CalendarSource> {
        Arc::clone(&self.source)
    }

    pub async fn upcoming_raw(&self, hours: i64) -> Result<Vec<CalendarEvent>> {
        let now = Utc::now();
        self.source.fetch_events(now, now + Duration::hours(hours)).await
    }

    /// User-facing listing with one `- {summary} at {YYYY-MM-DD HH:MM}` line per event.
    pub async fn upcoming_summary(&self, hours: i64) -> String {
        if !self.source.is_configured() {
            return NOT_CONFIGURED.into();
        }
        match self.upcoming_raw(hours).await {
            Ok(events) if events.is_empty() => NO_EVENTS.into(),
            Ok(events) => format!(
                "Upcoming calendar events:\n\n{}",
                events
                    .iter()
                    .map(summary_line)
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            Err(e) => {
                warn!(error = %e, "calendar fetch failed");
                format!("Error accessing calendar: {e}")
            }
        }
    }

    pub async fn schedule_meeting(&self, request: MeetingRequest) -> Result<CalendarEvent> {
        let minutes = request
            .duration_minutes
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_MEETING_MINUTES);
        let event = NewEvent {
            summary: request.summary,
            start: EventTime::at(request.start),
            end: EventTime::at(request.start + Duration::minutes(minutes)),
            location: Some(
                request
                    .location
                    .unwrap_or_else(|| DEFAULT_MEETING_LOCATION.into()),
            ),
            description: request.description,
            attendees: request
                .attendees
                .into_iter()
                .map(|email| Attendee {
                    email,
                    display_name: None,
                })
                .collect(),
        };
        let created = self.source.insert_event(&event).await?;
        info!(id = ?created.id, summary = %event.summary, "meeting scheduled");
        Ok(created)
    }
}

fn summary_line(event: &CalendarEvent) -> String {
    let when = match event.start.as_ref() {
        Some(EventTime {
            date_time: Some(dt), ..
        }) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Some(EventTime { date: Some(d), .. }) => d.format("%Y-%m-%d").to_string(),
        _ => "TBD".into(),
    };
    format!("- {} at {when}", event.title())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> HttpClient {
        HttpClient::new("smartdesk-test", std::time::Duration::from_secs(5))
            .unwrap()
            .with_retry(0, std::time::Duration::from_millis(1))
    }

    #[test]
    fn event_deserializes_google_shape() {
        let json = r#"{
            "id": "abc",
            "summary": "Standup",
            "start": {"dateTime": "2025-06-02T10:00:00-04:00", "timeZone": "America/Toronto"},
            "end": {"dateTime": "2025-06-02T10:15:00-04:00"},
            "attendees": [{"email": "a@example.com", "displayName": "Ana"}, {"email": "b@example.com"}]
        }"#;
        let event: CalendarEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event.start_time(),
            Some(Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap())
        );
        assert_eq!(event.attendee_names(), vec!["Ana", "b@example.com"]);
        assert_eq!(summary_line(&event), "- Standup at 2025-06-02 10:00");
    }

    #[test]
    fn all_day_event_has_no_timed_start() {
        let event: CalendarEvent =
            serde_json::from_str(r#"{"id": "d", "start": {"date": "2025-06-02"}}"#).unwrap();
        assert!(event.start_time().is_none());
        assert_eq!(summary_line(&event), "- Unknown Meeting at 2025-06-02");
    }

    #[tokio::test]
    async fn fetch_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("pageToken", "p2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"items": [{"id": "two"}]}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer tok"))
            .and(query_param("singleEvents", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"items": [{"id": "one"}], "nextPageToken": "p2"}"#,
            ))
            .mount(&server)
            .await;

        let cal = GoogleCalendar::new(http(), server.uri(), "primary", Some("tok".into()));
        let now = Utc::now();
        let events = cal.fetch_events(now, now + Duration::hours(1)).await.unwrap();
        let ids: Vec<_> = events.iter().filter_map(|e| e.id.as_deref()).collect();
        assert_eq!(ids, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn missing_token_is_config_error() {
        let cal = GoogleCalendar::new(http(), "http://127.0.0.1:9", "primary", None);
        let now = Utc::now();
        let err = cal.fetch_events(now, now).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let tool = CalendarTool::new(Arc::new(cal));
        assert_eq!(tool.upcoming_summary(2).await, NOT_CONFIGURED);
    }

    #[tokio::test]
    async fn schedule_meeting_applies_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(body_partial_json(serde_json::json!({
                "summary": "Sync",
                "location": "Google Meet",
                "attendees": [{"email": "x@example.com"}]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"id": "new1", "summary": "Sync"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cal = GoogleCalendar::new(http(), server.uri(), "primary", Some("tok".into()));
        let tool = CalendarTool::new(Arc::new(cal));
        let created = tool
            .schedule_meeting(MeetingRequest {
                summary: "Sync".into(),
                start: Utc.with_ymd_and_hms(2025, 6, 2, 15, 0, 0).unwrap(),
                duration_minutes: None,
                attendees: vec!["x@example.com".into()],
                location: None,
                description: None,
            })
            .await
            .unwrap();
        assert_eq!(created.id.as_deref(), Some("new1"));

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let start: DateTime<FixedOffset> =
            serde_json::from_value(body["start"]["dateTime"].clone()).unwrap();
        let end: DateTime<FixedOffset> =
            serde_json::from_value(body["end"]["dateTime"].clone()).unwrap();
        assert_eq!(end - start, Duration::minutes(30));
    }
}
