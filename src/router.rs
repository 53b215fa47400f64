use crate::agent::{AgentSettings, CalendarAgent, Notification};
use crate::config::{Config, PersonaConfig};
use crate::error::Result;
use crate::http::HttpClient;
use crate::llm::LlmClient;
use crate::memory::{ChatMessage, LongTermMemory, Role};
use crate::prompts;
use crate::tools::calendar::{CalendarSource, CalendarTool, GoogleCalendar};
use crate::tools::ocr::{self, OCR_FAILED, OcrTool};
use crate::tools::pdf;
use crate::tools::search::{AnalysisType, WebSearchTool};
use crate::tools::summarizer::Summarizer;
use crate::tools::time;
use crate::webhook::{ProactiveQueue, WebhookHandler};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const CONTEXT_MESSAGES: usize = 10;
const USER_AGENT: &str = concat!("smartdesk/", env!("CARGO_PKG_VERSION"));

/// A file attached to a chat turn.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct PendingFile {
    name: String,
    content: String,
}

/// Routes chat input to a tool command, file handling or the LLM.
pub struct ChatRouter {
    persona: PersonaConfig,
    llm: Arc<LlmClient>,
    ocr: OcrTool,
    calendar: CalendarTool,
    search: WebSearchTool,
    summarizer: Summarizer,
    memory: LongTermMemory,
    agent: Arc<CalendarAgent>,
    webhook: WebhookHandler,
    lookahead_hours: i64,
    pending_file: Option<PendingFile>,
    model: Option<String>,
}

impl ChatRouter {
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm = Arc::new(LlmClient::from_config(config)?);
        let http = HttpClient::new(USER_AGENT, Duration::from_secs(config.llm.timeout_secs))?;
        let source: Arc<dyn CalendarSource> =
            Arc::new(GoogleCalendar::from_config(&config.calendar, http));
        Self::with_components(config, llm, source)
    }

    /// Build around an existing LLM chain and calendar backend.
    pub fn with_components(
        config: &Config,
        llm: Arc<LlmClient>,
        source: Arc<dyn CalendarSource>,
    ) -> Result<Self> {
        let http = HttpClient::new(USER_AGENT, Duration::from_secs(config.llm.timeout_secs))?;
        let agent_llm = config.calendar.ai_insights.then(|| Arc::clone(&llm));
        let agent = CalendarAgent::new(
            Arc::clone(&source),
            agent_llm,
            AgentSettings::from_config(config),
        );

        Ok(Self {
            persona: config.persona.clone(),
            ocr: OcrTool::new(&config.ocr),
            calendar: CalendarTool::new(source),
            search: WebSearchTool::new(&config.search, Arc::clone(&llm), http),
            summarizer: Summarizer::new(Arc::clone(&llm)),
            memory: LongTermMemory::new(
                config.storage.chat_history_path(),
                &config.storage.user_id,
                config.persona.memory_limit,
            ),
            agent: Arc::new(agent),
            webhook: WebhookHandler::new(config.webhook.max_age_secs, ProactiveQueue::new()),
            lookahead_hours: config.calendar.lookahead_hours,
            pending_file: None,
            model: None,
            llm,
        })
    }

    /// Handle one user turn. Failures come back as user-facing text.
    pub async fn process_user_message(&mut self, message: &str, upload: Option<Upload>) -> String {
        let message = message.trim();
        if let Some(upload) = upload {
            return self.handle_upload(upload, message).await;
        }

        if let Some(query) = command_arg(message, "/search") {
            return self.handle_search(query).await;
        }
        if command_arg(message, "/calendar").is_some() {
            return self.handle_calendar().await;
        }
        if let Some(text) = command_arg(message, "/summarize") {
            return self.handle_summarize(text).await;
        }
        if let Some(zone) = command_arg(message, "/time") {
            return self.handle_time(zone);
        }

        self.handle_conversation(message).await
    }

    /// Queued webhook notifications plus, when enabled, one calendar reminder pass.
    pub async fn check_proactive_agents(&self) -> Vec<Notification> {
        let mut messages = self.webhook.take_pending();
        if self.persona.proactive_agents.calendar {
            match self.agent.check_once(None).await {
                Ok(reminders) => messages.extend(reminders),
                Err(e) => warn!(error = %e, "calendar agent check failed"),
            }
        }
        messages
    }

    /// Run the calendar agent in the background, delivering into the proactive queue.
    pub fn start_calendar_agent(&self) {
        let queue = self.proactive_queue();
        self.agent
            .start(Arc::new(move |notification| queue.push(notification)));
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.memory.all()
    }

    pub fn clear_memory(&mut self) -> Result<()> {
        self.pending_file = None;
        self.memory.clear()
    }

    pub fn agent(&self) -> Arc<CalendarAgent> {
        Arc::clone(&self.agent)
    }

    pub fn calendar(&self) -> &CalendarTool {
        &self.calendar
    }

    pub fn search_tool(&self) -> &WebSearchTool {
        &self.search
    }

    pub fn proactive_queue(&self) -> ProactiveQueue {
        self.webhook.queue().clone()
    }

    pub fn webhook_handler(&self) -> &WebhookHandler {
        &self.webhook
    }

    /// Override the model for conversation turns (`name` or `provider:name`).
    pub fn set_model(&mut self, model: Option<String>) {
        self.model = model;
    }

    pub fn has_pending_file(&self) -> bool {
        self.pending_file.is_some()
    }

    pub fn clear_pending_file(&mut self) {
        self.pending_file = None;
    }

    async fn handle_upload(&mut self, upload: Upload, question: &str) -> String {
        let Upload { name, bytes } = upload;
        let (label, extracted) = if ocr::is_image(&name) {
            ("Image", Ok(self.ocr.extract_text(&bytes).await))
        } else if pdf::is_pdf(&name) {
            let result = tokio::task::spawn_blocking(move || pdf::extract_text(&bytes)).await;
            let text = match result {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("PDF extraction aborted: {e}")),
            };
            ("PDF", text)
        } else {
            let response = format!("Unsupported file type: {name}");
            self.remember(&format!("[File upload: {name}] {question}"), &response);
            return response;
        };

        let text = match extracted {
            Ok(text) => text,
            Err(e) => {
                warn!(file = %name, error = %e, "file processing failed");
                return format!("Error processing file: {e}");
            }
        };

        if text.trim().is_empty() || text == OCR_FAILED {
            let hint = match label {
                "Image" => "Please ensure the image contains clear, readable text.",
                _ => "Please ensure the PDF is readable.",
            };
            let response = format!("No text found in {name}. {hint}");
            self.remember(&format!("[File upload: {name}] {question}"), &response);
            return response;
        }

        info!(file = %name, chars = text.len(), "file content extracted");
        self.pending_file = Some(PendingFile {
            name: name.clone(),
            content: text,
        });

        if !question.is_empty() {
            return self.analyze_pending_file(question).await;
        }

        let response = format!(
            "✅ {label} '{name}' processed successfully! I can now analyze its content. What would you like to know about it?"
        );
        self.remember(&format!("[File upload: {name}] "), &response);
        response
    }

    async fn analyze_pending_file(&self, question: &str) -> String {
        let Some(file) = &self.pending_file else {
            return self.handle_conversation(question).await;
        };
        let prompt = prompts::file_analysis(&self.system_prompt(), &file.name, &file.content, question);
        let response = self.llm.get_response(&prompt, self.model.as_deref()).await;
        self.remember(
            &format!("[File analysis request: {}] {question}", file.name),
            &response,
        );
        response
    }

    async fn handle_search(&self, query: &str) -> String {
        if query.is_empty() {
            return "Please provide a search query, for example `/search rust async runtimes`."
                .into();
        }
        let results = self.search.search(query, AnalysisType::Auto, "").await;
        self.remember(&format!("/search {query}"), &results);
        results
    }

    async fn handle_calendar(&self) -> String {
        let response = self.calendar.upcoming_summary(self.lookahead_hours).await;
        self.remember("/calendar", &response);
        response
    }

    async fn handle_summarize(&self, text: &str) -> String {
        if text.is_empty() {
            return "Please provide the text you'd like me to summarize.".into();
        }
        let summary = self.summarizer.summarize(text).await;
        self.remember(&format!("/summarize {text}"), &summary);
        summary
    }

    fn handle_time(&self, zone: &str) -> String {
        let (key, label) = time::location_in(zone);
        let response = format!("🕐 The current time in {label} is {}.", time::describe(key));
        let command = if zone.is_empty() {
            "/time".to_string()
        } else {
            format!("/time {zone}")
        };
        self.remember(&command, &response);
        response
    }

    async fn handle_conversation(&self, message: &str) -> String {
        let history = self.memory.recent(CONTEXT_MESSAGES);
        let file_content = self.pending_file.as_ref().map(|f| f.content.as_str());
        let prompt = prompts::conversation(&self.system_prompt(), &history, file_content, message);
        debug!(
            history = history.len(),
            with_file = file_content.is_some(),
            "conversation turn"
        );
        let response = self.llm.get_response(&prompt, self.model.as_deref()).await;
        self.remember(message, &response);
        response
    }

    fn system_prompt(&self) -> String {
        prompts::system(
            &self.persona.name,
            &self.persona.personality,
            &time::describe(time::DEFAULT_ZONE),
        )
    }

    fn remember(&self, user: &str, assistant: &str) {
        let stored = self
            .memory
            .add_message(Role::User, user)
            .and_then(|()| self.memory.add_message(Role::Assistant, assistant));
        if let Err(e) = stored {
            warn!(error = %e, path = %self.memory.path().display(), "failed to persist chat memory");
        }
    }
}

/// Text after `command` when `message` starts with it (ASCII case-insensitive).
fn command_arg<'a>(message: &'a str, command: &str) -> Option<&'a str> {
    let head = message.get(..command.len())?;
    if !head.eq_ignore_ascii_case(command) {
        return None;
    }
    let rest = &message[command.len()..];
    match rest.chars().next() {
        None => Some(""),
        Some(c) if c.is_whitespace() => Some(rest.trim()),
        Some(_) => None,
    }
}
