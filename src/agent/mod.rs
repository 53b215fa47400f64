// Proactive calendar monitoring: poll → dedup → insights → notify

pub mod history;
pub mod notification;

pub use history::NotificationHistory;
pub use notification::{Notification, NotificationKind, Reminder, format_reminder};

use crate::config::Config;
use crate::error::Result;
use crate::llm::{ALL_FAILED, LlmClient};
use crate::prompts;
use crate::tools::calendar::{Attendee, CalendarEvent, CalendarSource, EventTime};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type NotificationCallback = Arc<dyn Fn(Notification) + Send + Sync>;

const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const INSIGHTS_FALLBACK: &str = "Meeting analysis available - ask me for specific insights!";
const INSIGHTS_UNAVAILABLE: &str = "AI insights temporarily unavailable";
pub const TEST_EVENT_ID: &str = "test_event_123";

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub check_interval: Duration,
    pub reminder_window_minutes: i64,
    pub poll_horizon_hours: i64,
    pub history_path: PathBuf,
    pub ai_insights: bool,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            check_interval: Duration::from_secs(config.calendar.check_interval_secs),
            reminder_window_minutes: config.calendar.reminder_window_minutes,
            poll_horizon_hours: config.calendar.poll_horizon_hours,
            history_path: config.notification_path(),
            ai_insights: config.calendar.ai_insights,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub running: bool,
    pub check_interval_secs: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub notified_count: usize,
    pub task_alive: bool,
    pub ai_insights_enabled: bool,
}

struct Inner {
    source: Arc<dyn CalendarSource>,
    llm: Option<Arc<LlmClient>>,
    settings: AgentSettings,
    history: Mutex<NotificationHistory>,
    running: AtomicBool,
    ai_insights: AtomicBool,
    wake: Notify,
}

/// Background poller that raises one reminder per upcoming event.
///
/// Reminded event ids are persisted, so restarting the agent does not
/// repeat a reminder.
pub struct CalendarAgent {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CalendarAgent {
    pub fn new(
        source: Arc<dyn CalendarSource>,
        llm: Option<Arc<LlmClient>>,
        settings: AgentSettings,
    ) -> Self {
        let history = NotificationHistory::load(&settings.history_path);
        debug!(
            path = %settings.history_path.display(),
            notified = history.len(),
            "loaded notification history"
        );
        let ai_insights = settings.ai_insights;
        Self {
            inner: Arc::new(Inner {
                source,
                llm,
                settings,
                history: Mutex::new(history),
                running: AtomicBool::new(false),
                ai_insights: AtomicBool::new(ai_insights),
                wake: Notify::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawn the polling loop. Must be called inside a tokio runtime.
    pub fn start(&self, callback: NotificationCallback) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("calendar agent is already running");
            return;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            while inner.running.load(Ordering::SeqCst) {
                if let Err(e) = inner.check(Some(&callback)).await {
                    error!(error = %e, "calendar check failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(inner.settings.check_interval) => {}
                    _ = inner.wake.notified() => {}
                }
            }
            debug!("calendar agent loop exited");
        });
        *lock(&self.task) = Some(handle);
        info!(
            interval_secs = self.inner.settings.check_interval.as_secs(),
            "calendar agent started"
        );
    }

    /// Clear the run flag and wait up to 5 s for the loop to finish.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.wake.notify_one();

        let handle = lock(&self.task).take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(STOP_TIMEOUT, &mut handle).await.is_err() {
                warn!("calendar agent did not stop in time, aborting");
                handle.abort();
            }
        }
        info!("calendar agent stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Run one check outside the background loop.
    pub async fn check_once(
        &self,
        callback: Option<&NotificationCallback>,
    ) -> Result<Vec<Notification>> {
        self.inner.check(callback).await
    }

    pub fn status(&self) -> AgentStatus {
        let (last_check, notified_count) = {
            let history = lock(&self.inner.history);
            (history.last_check, history.len())
        };
        let task_alive = lock(&self.task)
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        AgentStatus {
            running: self.is_running(),
            check_interval_secs: self.inner.settings.check_interval.as_secs(),
            last_check,
            notified_count,
            task_alive,
            ai_insights_enabled: self.inner.ai_insights.load(Ordering::SeqCst),
        }
    }

    pub fn clear_history(&self) -> Result<()> {
        let snapshot = {
            let mut history = lock(&self.inner.history);
            history.clear();
            history.clone()
        };
        snapshot.save(&self.inner.settings.history_path)?;
        info!("notification history cleared");
        Ok(())
    }

    pub fn set_ai_insights(&self, enabled: bool) {
        self.inner.ai_insights.store(enabled, Ordering::SeqCst);
        info!(enabled, "AI insights toggled");
    }

    /// Reminder for a synthetic event 10 minutes out. Not recorded in history.
    pub async fn test_notification(&self) -> Notification {
        let start = Utc::now() + ChronoDuration::minutes(10);
        let event = CalendarEvent {
            id: Some(TEST_EVENT_ID.into()),
            summary: Some("Test Meeting with AI Insights".into()),
            start: Some(EventTime::at(start)),
            end: Some(EventTime::at(start + ChronoDuration::minutes(30))),
            location: Some("Test Conference Room".into()),
            description: Some(
                "This is a test meeting to demonstrate AI-powered calendar agent capabilities"
                    .into(),
            ),
            attendees: vec![
                Attendee {
                    email: "test@example.com".into(),
                    display_name: Some("Test User".into()),
                },
                Attendee {
                    email: "ai@example.com".into(),
                    display_name: Some("AI Assistant".into()),
                },
            ],
        };
        self.inner.notification_for(&event).await
    }
}

impl Inner {
    async fn check(&self, callback: Option<&NotificationCallback>) -> Result<Vec<Notification>> {
        let now = Utc::now();
        let horizon = ChronoDuration::hours(self.settings.poll_horizon_hours.max(1));
        let events = self.source.fetch_events(now, now + horizon).await?;

        // Ids are recorded before any callback runs. A failed save keeps them in memory.
        let (due, snapshot) = {
            let mut history = lock(&self.history);
            let due: Vec<CalendarEvent> = events
                .into_iter()
                .filter(|event| self.is_due(event, now, &mut history))
                .collect();
            history.last_check = Some(now);
            (due, history.clone())
        };
        if let Err(e) = snapshot.save(&self.settings.history_path) {
            warn!(
                error = %e,
                path = %self.settings.history_path.display(),
                "failed to save notification history"
            );
        }

        let mut sent = Vec::with_capacity(due.len());
        for event in &due {
            let notification = self.notification_for(event).await;
            info!(
                event_id = ?notification.event_id,
                summary = event.title(),
                "meeting reminder"
            );
            if let Some(cb) = callback {
                cb(notification.clone());
            }
            sent.push(notification);
        }
        debug!(checked_at = %now, reminders = sent.len(), "calendar check complete");
        Ok(sent)
    }

    /// Records the id when the event falls inside the reminder window.
    fn is_due(
        &self,
        event: &CalendarEvent,
        now: DateTime<Utc>,
        history: &mut NotificationHistory,
    ) -> bool {
        let Some(id) = event.id.as_deref().filter(|id| !id.is_empty()) else {
            return false;
        };
        if history.contains(id) {
            return false;
        }
        let Some(start) = event.start_time() else {
            return false;
        };
        let minutes = (start - now).num_seconds() as f64 / 60.0;
        if !(0.0..=self.settings.reminder_window_minutes as f64).contains(&minutes) {
            return false;
        }
        history.record(id)
    }

    async fn notification_for(&self, event: &CalendarEvent) -> Notification {
        let insights = if self.ai_insights.load(Ordering::SeqCst) {
            Some(self.insights_for(event).await)
        } else {
            None
        };
        let attendees = event.attendee_names();
        let start = event.start.as_ref().and_then(|s| s.date_time);

        let content = format_reminder(&Reminder {
            summary: event.title(),
            start,
            location: event.location.as_deref(),
            attendees: &attendees,
            description: event.description.as_deref(),
            insights: insights.as_deref(),
            list_empty_attendees: false,
        });

        let mut notification = Notification::new(NotificationKind::MeetingReminder, content)
            .with_event_id(event.id.clone());
        notification.event_summary = Some(event.title().to_string());
        notification.event_start = start.map(|s| s.to_rfc3339());
        notification.ai_insights = insights;
        notification
    }

    async fn insights_for(&self, event: &CalendarEvent) -> String {
        let Some(llm) = &self.llm else {
            return INSIGHTS_FALLBACK.into();
        };
        let mut context = format!("Meeting: {}\n", event.title());
        if let Some(desc) = event.description.as_deref().filter(|d| !d.is_empty()) {
            context.push_str(&format!("Description: {desc}\n"));
        }
        let names = event.attendee_names();
        if !names.is_empty() {
            context.push_str(&format!("Attendees: {}\n", names.join(", ")));
        }

        let response = llm
            .get_response(&prompts::meeting_insights(&context), None)
            .await;
        match response.trim() {
            "" => INSIGHTS_FALLBACK.into(),
            ALL_FAILED => INSIGHTS_UNAVAILABLE.into(),
            text => text.to_string(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::tools::calendar::NewEvent;
    use async_trait::async_trait;

    struct FixedEvents(Vec<CalendarEvent>);

    #[async_trait]
    impl CalendarSource for FixedEvents {
        async fn fetch_events(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<CalendarEvent>> {
            Ok(self.0.clone())
        }

        async fn insert_event(&self, _event: &NewEvent) -> Result<CalendarEvent> {
            Err(Error::calendar("read-only"))
        }
    }

    fn event(id: Option<&str>, minutes_from_now: i64) -> CalendarEvent {
        let start = Utc::now() + ChronoDuration::minutes(minutes_from_now);
        CalendarEvent {
            id: id.map(String::from),
            summary: Some(format!("event at +{minutes_from_now}")),
            start: Some(EventTime::at(start)),
            ..Default::default()
        }
    }

    fn agent(dir: &tempfile::TempDir, events: Vec<CalendarEvent>) -> CalendarAgent {
        CalendarAgent::new(
            Arc::new(FixedEvents(events)),
            None,
            AgentSettings {
                check_interval: Duration::from_millis(20),
                reminder_window_minutes: 15,
                poll_horizon_hours: 24,
                history_path: dir.path().join("notifications.json"),
                ai_insights: false,
            },
        )
    }

    #[tokio::test]
    async fn only_events_inside_window_fire() {
        let dir = tempfile::tempdir().unwrap();
        let all_day = CalendarEvent {
            id: Some("all-day".into()),
            start: Some(EventTime {
                date_time: None,
                date: chrono::NaiveDate::from_ymd_opt(2025, 6, 2),
            }),
            ..Default::default()
        };
        let agent = agent(
            &dir,
            vec![
                event(Some("soon"), 10),
                event(Some("later"), 45),
                event(Some("past"), -5),
                event(None, 5),
                all_day,
            ],
        );

        let sent = agent.check_once(None).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_id.as_deref(), Some("soon"));
        assert!(sent[0].ai_insights.is_none());
    }

    #[tokio::test]
    async fn same_event_never_fires_twice() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(&dir, vec![event(Some("e1"), 3)]);
        assert_eq!(agent.check_once(None).await.unwrap().len(), 1);
        assert!(agent.check_once(None).await.unwrap().is_empty());

        let status = agent.status();
        assert_eq!(status.notified_count, 1);
        assert!(status.last_check.is_some());
    }

    #[tokio::test]
    async fn unsaved_history_still_delivers_once() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let agent = CalendarAgent::new(
            Arc::new(FixedEvents(vec![event(Some("unsaved"), 5)])),
            None,
            AgentSettings {
                check_interval: Duration::from_millis(20),
                reminder_window_minutes: 15,
                poll_horizon_hours: 24,
                history_path: blocker.join("notifications.json"),
                ai_insights: false,
            },
        );

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        let callback: NotificationCallback =
            Arc::new(move |n: Notification| sink.lock().unwrap().push(n));

        let sent = agent.check_once(Some(&callback)).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(delivered.lock().unwrap().len(), 1);
        assert_eq!(
            delivered.lock().unwrap()[0].event_id.as_deref(),
            Some("unsaved")
        );

        assert!(agent.check_once(Some(&callback)).await.unwrap().is_empty());
        assert_eq!(delivered.lock().unwrap().len(), 1);
        assert_eq!(agent.status().notified_count, 1);
    }

    #[tokio::test]
    async fn insights_fall_back_without_llm() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(&dir, Vec::new());
        agent.set_ai_insights(true);
        let n = agent.test_notification().await;
        assert_eq!(n.event_id.as_deref(), Some(TEST_EVENT_ID));
        assert_eq!(n.ai_insights.as_deref(), Some(INSIGHTS_FALLBACK));
        assert!(n.content.contains("Test User, AI Assistant"));
        assert_eq!(agent.status().notified_count, 0);
    }

    #[tokio::test]
    async fn start_stop_delivers_through_callback() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(&dir, vec![event(Some("cb"), 1)]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        agent.start(Arc::new(move |n: Notification| {
            let _ = tx.send(n);
        }));
        assert!(agent.is_running());

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event_id.as_deref(), Some("cb"));

        agent.stop().await;
        assert!(!agent.is_running());
        assert!(!agent.status().task_alive);
    }
}
