use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

const MAX_LISTED_ATTENDEES: usize = 5;
const MAX_DESCRIPTION_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MeetingReminder,
    CalendarUpdate,
    Info,
}

/// A proactive message surfaced to the user between chat turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            event_id: None,
            event_summary: None,
            event_start: None,
            ai_insights: None,
            update_type: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_event_id(mut self, id: Option<String>) -> Self {
        self.event_id = id;
        self
    }
}

/// Fields rendered into a meeting reminder.
#[derive(Debug, Clone, Default)]
pub struct Reminder<'a> {
    pub summary: &'a str,
    pub start: Option<DateTime<FixedOffset>>,
    pub location: Option<&'a str>,
    pub attendees: &'a [String],
    pub description: Option<&'a str>,
    pub insights: Option<&'a str>,
    /// Render "No attendees listed" instead of omitting the line.
    pub list_empty_attendees: bool,
}

pub fn format_reminder(r: &Reminder<'_>) -> String {
    let (time, date) = match r.start {
        Some(dt) => (
            dt.format("%I:%M %p").to_string(),
            dt.format("%B %d, %Y").to_string(),
        ),
        None => ("TBD".to_string(), "TBD".to_string()),
    };
    let location = r
        .location
        .filter(|l| !l.is_empty())
        .unwrap_or("No location specified");

    let mut message = format!(
        "🔔 **Meeting Reminder**\n\n📅 **{}**\n🕐 **Time:** {time} on {date}\n📍 **Location:** {location}",
        r.summary
    );

    if let Some(attendees) = attendee_line(r.attendees) {
        message.push_str(&format!("\n👥 **Attendees:** {attendees}"));
    } else if r.list_empty_attendees {
        message.push_str("\n👥 **Attendees:** No attendees listed");
    }

    if let Some(desc) = r.description.filter(|d| !d.is_empty()) {
        message.push_str(&format!("\n\n📝 **Description:** {}", truncate(desc)));
    }

    if let Some(insights) = r.insights.filter(|i| !i.is_empty()) {
        message.push_str(&format!("\n\n🤖 **AI Insights:**\n{insights}"));
    }

    message.push_str(
        "\n\n💡 **Need help preparing?** Ask me about the meeting or request a summary of related documents!",
    );
    message
}

fn attendee_line(attendees: &[String]) -> Option<String> {
    if attendees.is_empty() {
        return None;
    }
    let mut line = attendees
        .iter()
        .take(MAX_LISTED_ATTENDEES)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if attendees.len() > MAX_LISTED_ATTENDEES {
        line.push_str(&format!(
            " and {} others",
            attendees.len() - MAX_LISTED_ATTENDEES
        ));
    }
    Some(line)
}

fn truncate(desc: &str) -> String {
    if desc.chars().count() <= MAX_DESCRIPTION_CHARS {
        return desc.to_string();
    }
    let head: String = desc.chars().take(MAX_DESCRIPTION_CHARS).collect();
    format!("{head}... (truncated)")
}
