use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// On-disk layout: one history per user id.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatStore {
    #[serde(default)]
    users: HashMap<String, Vec<ChatMessage>>,
}

/// Persistent per-user chat history, capped at `limit` messages.
///
/// Every mutation rewrites the JSON file. The oldest messages are dropped
/// first once the cap is exceeded.
#[derive(Debug, Clone)]
pub struct LongTermMemory {
    path: PathBuf,
    user_id: String,
    limit: usize,
}

impl LongTermMemory {
    pub fn new(path: impl Into<PathBuf>, user_id: impl Into<String>, limit: usize) -> Self {
        Self {
            path: path.into(),
            user_id: user_id.into(),
            limit: limit.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn add_message(&self, role: Role, content: impl Into<String>) -> Result<()> {
        let mut store = self.load_store();
        let history = store.users.entry(self.user_id.clone()).or_default();
        history.push(ChatMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        truncate_oldest(history, self.limit);
        self.save_store(&store)
    }

    /// Last `n` messages in chronological order; `n == 0` returns everything.
    pub fn recent(&self, n: usize) -> Vec<ChatMessage> {
        let history = self.all();
        if n == 0 || n >= history.len() {
            return history;
        }
        history[history.len() - n..].to_vec()
    }

    pub fn all(&self) -> Vec<ChatMessage> {
        self.load_store()
            .users
            .remove(&self.user_id)
            .unwrap_or_default()
    }

    pub fn clear(&self) -> Result<()> {
        let mut store = self.load_store();
        store.users.insert(self.user_id.clone(), Vec::new());
        self.save_store(&store)
    }

    /// Re-apply a cap to the stored history (defaults to the configured limit).
    pub fn prune(&self, limit: Option<usize>) -> Result<()> {
        let limit = limit.unwrap_or(self.limit).max(1);
        let mut store = self.load_store();
        if let Some(history) = store.users.get_mut(&self.user_id) {
            if history.len() > limit {
                truncate_oldest(history, limit);
                return self.save_store(&store);
            }
        }
        Ok(())
    }

    fn load_store(&self) -> ChatStore {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no chat history yet");
                return ChatStore::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "corrupt chat history, starting empty");
            ChatStore::default()
        })
    }

    fn save_store(&self, store: &ChatStore) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(store)
            .map_err(|e| Error::parse(format!("serialize chat history: {e}")))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

fn truncate_oldest(history: &mut Vec<ChatMessage>, limit: usize) {
    if history.len() > limit {
        history.drain(..history.len() - limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(dir: &tempfile::TempDir, user: &str, limit: usize) -> LongTermMemory {
        LongTermMemory::new(dir.path().join("chat.json"), user, limit)
    }

    #[test]
    fn history_never_exceeds_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(&dir, "default", 3);
        for i in 0..10 {
            mem.add_message(Role::User, format!("msg {i}")).unwrap();
            assert!(mem.all().len() <= 3);
        }
        let contents: Vec<String> = mem.all().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["msg 7", "msg 8", "msg 9"]);
    }

    #[test]
    fn users_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let alice = memory(&dir, "alice", 10);
        let bob = memory(&dir, "bob", 10);
        alice.add_message(Role::User, "from alice").unwrap();
        bob.add_message(Role::User, "from bob").unwrap();
        bob.clear().unwrap();

        assert_eq!(alice.all().len(), 1);
        assert!(bob.all().is_empty());
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(&dir, "default", 50);
        mem.add_message(Role::User, "q1").unwrap();
        mem.add_message(Role::Assistant, "a1").unwrap();
        mem.add_message(Role::User, "q2").unwrap();

        let recent = mem.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].role, Role::Assistant);
        assert_eq!(recent[1].content, "q2");
        assert_eq!(mem.recent(0).len(), 3);
        assert_eq!(mem.recent(100).len(), 3);
    }

    #[test]
    fn prune_applies_smaller_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(&dir, "default", 50);
        for i in 0..5 {
            mem.add_message(Role::User, format!("m{i}")).unwrap();
        }
        mem.prune(Some(2)).unwrap();
        let contents: Vec<String> = mem.all().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[test]
    fn corrupt_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(&dir, "default", 5);
        std::fs::write(mem.path(), "{not json").unwrap();
        assert!(mem.all().is_empty());
        mem.add_message(Role::User, "fresh").unwrap();
        assert_eq!(mem.all().len(), 1);
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        memory(&dir, "default", 5)
            .add_message(Role::User, "persisted")
            .unwrap();
        let reopened = memory(&dir, "default", 5);
        assert_eq!(reopened.all()[0].content, "persisted");
    }
}
