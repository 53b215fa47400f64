use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// Event ids that already produced a reminder, persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationHistory {
    #[serde(default)]
    pub notified_events: BTreeSet<String>,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
}

impl NotificationHistory {
    /// Missing or unreadable files start an empty history.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no notification history");
                return Self::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "corrupt notification history, starting empty");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::parse(format!("serialize notification history: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.notified_events.contains(event_id)
    }

    /// Returns false when the id was already recorded.
    pub fn record(&mut self, event_id: &str) -> bool {
        self.notified_events.insert(event_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.notified_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notified_events.is_empty()
    }

    pub fn clear(&mut self) {
        self.notified_events.clear();
        self.last_check = None;
    }
}
