use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Assistant persona, injected into every prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_personality")]
    pub personality: String,
    /// Maximum number of chat messages retained per user.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
    #[serde(default)]
    pub proactive_agents: ProactiveAgents,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            personality: default_personality(),
            memory_limit: default_memory_limit(),
            proactive_agents: ProactiveAgents::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProactiveAgents {
    #[serde(default = "default_true")]
    pub calendar: bool,
}

impl Default for ProactiveAgents {
    fn default() -> Self {
        Self { calendar: true }
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    /// Retries per provider after the first attempt.
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub groq: ProviderConfig,
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub ollama: ProviderConfig,
    /// JSON-lines usage log; defaults to `llm_usage.log` in the data dir.
    pub usage_log: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_retries: default_llm_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_llm_timeout(),
            groq: ProviderConfig::default(),
            gemini: ProviderConfig::default(),
            openai: ProviderConfig::default(),
            ollama: ProviderConfig::default(),
            usage_log: None,
        }
    }
}

/// Per-provider overrides. Unset fields fall back to the provider's defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            api_key_env: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_calendar_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_calendar_base_url")]
    pub base_url: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_reminder_window")]
    pub reminder_window_minutes: i64,
    /// Window shown by the `/calendar` command.
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: i64,
    /// Window fetched by the background agent on each check.
    #[serde(default = "default_poll_horizon_hours")]
    pub poll_horizon_hours: i64,
    #[serde(default = "default_true")]
    pub ai_insights: bool,
    pub notification_file: Option<PathBuf>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            calendar_id: default_calendar_id(),
            access_token_env: default_calendar_token_env(),
            base_url: default_calendar_base_url(),
            check_interval_secs: default_check_interval(),
            reminder_window_minutes: default_reminder_window(),
            lookahead_hours: default_lookahead_hours(),
            poll_horizon_hours: default_poll_horizon_hours(),
            ai_insights: true,
            notification_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_serper_key_env")]
    pub serper_api_key_env: String,
    #[serde(default = "default_serper_url")]
    pub serper_url: String,
    #[serde(default = "default_duckduckgo_url")]
    pub duckduckgo_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Results included in the LLM summarization context.
    #[serde(default = "default_context_results")]
    pub context_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            serper_api_key_env: default_serper_key_env(),
            serper_url: default_serper_url(),
            duckduckgo_url: default_duckduckgo_url(),
            max_results: default_max_results(),
            context_results: default_context_results(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,
    #[serde(default = "default_fallback_cmd")]
    pub fallback_cmd: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: default_tesseract_cmd(),
            fallback_cmd: default_fallback_cmd(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            user_id: default_user_id(),
        }
    }
}

impl StorageConfig {
    pub fn chat_history_path(&self) -> PathBuf {
        self.data_dir.join("chat_history.json")
    }

    pub fn notification_path(&self) -> PathBuf {
        self.data_dir.join("calendar_notifications.json")
    }

    pub fn usage_log_path(&self) -> PathBuf {
        self.data_dir.join("llm_usage.log")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Payloads whose timestamp differs from now by more than this are rejected.
    #[serde(default = "default_webhook_max_age")]
    pub max_age_secs: i64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_webhook_max_age(),
        }
    }
}

// Defaults
fn default_persona_name() -> String {
    "SmartDesk AI".into()
}
fn default_personality() -> String {
    "Helpful, proactive, and efficient assistant".into()
}
fn default_memory_limit() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_llm_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_llm_timeout() -> u64 {
    30
}
fn default_calendar_id() -> String {
    "primary".into()
}
fn default_calendar_token_env() -> String {
    "GOOGLE_CALENDAR_TOKEN".into()
}
fn default_calendar_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".into()
}
fn default_check_interval() -> u64 {
    60
}
fn default_reminder_window() -> i64 {
    15
}
fn default_lookahead_hours() -> i64 {
    2
}
fn default_poll_horizon_hours() -> i64 {
    24
}
fn default_serper_key_env() -> String {
    "SERPER_API_KEY".into()
}
fn default_serper_url() -> String {
    "https://google.serper.dev/search".into()
}
fn default_duckduckgo_url() -> String {
    "https://html.duckduckgo.com/html/".into()
}
fn default_max_results() -> usize {
    10
}
fn default_context_results() -> usize {
    8
}
fn default_tesseract_cmd() -> String {
    "tesseract".into()
}
fn default_fallback_cmd() -> String {
    "easyocr".into()
}
fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SMARTDESK_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".smartdesk")
}
fn default_user_id() -> String {
    "default".into()
}
fn default_webhook_max_age() -> i64 {
    300
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.persona.memory_limit == 0 {
            return Err(Error::config("persona.memory_limit must be at least 1"));
        }
        if self.calendar.check_interval_secs == 0 {
            return Err(Error::config("calendar.check_interval_secs must be positive"));
        }
        if self.calendar.reminder_window_minutes <= 0 {
            return Err(Error::config(
                "calendar.reminder_window_minutes must be positive",
            ));
        }
        if self.webhook.max_age_secs <= 0 {
            return Err(Error::config("webhook.max_age_secs must be positive"));
        }
        Ok(())
    }

    pub fn usage_log_path(&self) -> PathBuf {
        self.llm
            .usage_log
            .clone()
            .unwrap_or_else(|| self.storage.usage_log_path())
    }

    pub fn notification_path(&self) -> PathBuf {
        self.calendar
            .notification_file
            .clone()
            .unwrap_or_else(|| self.storage.notification_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let toml = r#"
[persona]
name = "Desk"
personality = "Terse"
memory_limit = 20

[persona.proactive_agents]
calendar = false

[llm]
max_retries = 1
retry_delay_ms = 250

[llm.groq]
model = "llama-3.3-70b-versatile"

[llm.gemini]
enabled = false

[llm.ollama]
base_url = "http://gpu-box:11434"
model = "llama3"

[calendar]
check_interval_secs = 30
reminder_window_minutes = 10
ai_insights = false

[search]
max_results = 5

[storage]
data_dir = "/tmp/smartdesk"
user_id = "alex"

[webhook]
max_age_secs = 120
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.persona.name, "Desk");
        assert_eq!(config.persona.memory_limit, 20);
        assert!(!config.persona.proactive_agents.calendar);
        assert_eq!(config.llm.max_retries, 1);
        assert_eq!(
            config.llm.groq.model.as_deref(),
            Some("llama-3.3-70b-versatile")
        );
        assert!(!config.llm.gemini.enabled);
        assert!(config.llm.openai.enabled);
        assert_eq!(
            config.llm.ollama.base_url.as_deref(),
            Some("http://gpu-box:11434")
        );
        assert_eq!(config.calendar.check_interval_secs, 30);
        assert!(!config.calendar.ai_insights);
        assert_eq!(config.calendar.calendar_id, "primary");
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.search.context_results, 8);
        assert_eq!(config.storage.user_id, "alex");
        assert_eq!(
            config.notification_path(),
            PathBuf::from("/tmp/smartdesk/calendar_notifications.json")
        );
        assert_eq!(config.webhook.max_age_secs, 120);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.persona.name, "SmartDesk AI");
        assert_eq!(config.persona.memory_limit, 50);
        assert!(config.persona.proactive_agents.calendar);
        assert_eq!(config.llm.max_retries, 2);
        assert_eq!(config.llm.retry_delay_ms, 1000);
        assert_eq!(config.calendar.check_interval_secs, 60);
        assert_eq!(config.calendar.reminder_window_minutes, 15);
        assert_eq!(config.webhook.max_age_secs, 300);
        assert_eq!(config.ocr.tesseract_cmd, "tesseract");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn legacy_web_search_toggle_is_ignored() {
        let toml = "[persona.proactive_agents]\ncalendar = false\nweb_search = true\n";
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.persona.proactive_agents.calendar);
    }

    #[test]
    fn validate_rejects_zero_memory_limit() {
        let mut config = Config::default();
        config.persona.memory_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_check_interval() {
        let mut config = Config::default();
        config.calendar.check_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.persona.memory_limit, 50);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[persona\nname = ").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }
}
