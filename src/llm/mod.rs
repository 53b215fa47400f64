pub mod providers;
pub mod usage;

use crate::config::{Config, ProviderConfig};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::prompts;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use usage::{Usage, UsageLog};

/// Returned by a single provider that produced nothing usable.
pub const UNAVAILABLE: &str = "[LLM unavailable]";
/// Returned by [`LlmClient::get_response`] when every provider failed.
pub const ALL_FAILED: &str = "[LLM unavailable - all providers failed]";

/// LLM provider, in fallback priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Groq,
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl ProviderKind {
    pub const PRIORITY: [ProviderKind; 4] = [Self::Groq, Self::Gemini, Self::OpenAi, Self::Ollama];

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Ollama => "OLLAMA_API_KEY",
        }
    }

    pub fn default_model(&self) -> String {
        match self {
            Self::Groq => "gemma2-9b-it".into(),
            Self::Gemini => "gemini-2.0-flash-exp".into(),
            Self::OpenAi => "gpt-3.5-turbo".into(),
            Self::Ollama => std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "mistral:latest".into()),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Groq => write!(f, "groq"),
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(Error::config(format!("unknown LLM provider: {other}"))),
        }
    }
}

/// How much reasoning scaffolding to put around a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    #[default]
    Chat,
    DeepThinking,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// One backend in the fallback chain.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn default_model(&self) -> &str;

    /// False when the provider lacks credentials and must be skipped.
    fn is_configured(&self) -> bool;

    async fn complete(&self, prompt: &str, model: &str) -> Result<Completion>;
}

/// Ordered provider chain returning the first usable response.
pub struct LlmClient {
    providers: Vec<Box<dyn CompletionProvider>>,
    usage_log: Option<UsageLog>,
}

impl LlmClient {
    pub fn new(providers: Vec<Box<dyn CompletionProvider>>) -> Self {
        Self {
            providers,
            usage_log: None,
        }
    }

    pub fn with_usage_log(mut self, log: UsageLog) -> Self {
        self.usage_log = Some(log);
        self
    }

    /// Build the Groq → Gemini → OpenAI → Ollama chain, reading API keys from env.
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm = &config.llm;
        let http = HttpClient::new(
            "smartdesk/0.1.0",
            Duration::from_secs(llm.timeout_secs),
        )?
        .with_retry(llm.max_retries, Duration::from_millis(llm.retry_delay_ms));

        let mut providers: Vec<Box<dyn CompletionProvider>> = Vec::new();
        for kind in ProviderKind::PRIORITY {
            let pc = match kind {
                ProviderKind::Groq => &llm.groq,
                ProviderKind::Gemini => &llm.gemini,
                ProviderKind::OpenAi => &llm.openai,
                ProviderKind::Ollama => &llm.ollama,
            };
            if !pc.enabled {
                debug!(provider = %kind, "provider disabled in config");
                continue;
            }
            providers.push(build_provider(kind, pc, http.clone()));
        }

        Ok(Self::new(providers).with_usage_log(UsageLog::new(config.usage_log_path())))
    }

    pub fn provider_kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// First successful response, or [`ALL_FAILED`].
    pub async fn get_response(&self, prompt: &str, model: Option<&str>) -> String {
        self.get_response_with_mode(prompt, model, ResponseMode::Chat)
            .await
    }

    pub async fn get_response_with_mode(
        &self,
        prompt: &str,
        model: Option<&str>,
        mode: ResponseMode,
    ) -> String {
        match self.try_get_response(prompt, model, mode).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "returning unavailable sentinel");
                ALL_FAILED.into()
            }
        }
    }

    /// Walk the chain in priority order.
    ///
    /// `model` is either a bare model name, applied to every provider, or
    /// `provider:model`, applied only to that provider.
    pub async fn try_get_response(
        &self,
        prompt: &str,
        model: Option<&str>,
        mode: ResponseMode,
    ) -> Result<String> {
        let prompt = match mode {
            ResponseMode::Chat => prompt.to_string(),
            ResponseMode::DeepThinking => prompts::deep_thinking(prompt),
        };

        let mut tried = Vec::new();
        for provider in &self.providers {
            let kind = provider.kind();
            if !provider.is_configured() {
                debug!(provider = %kind, "skipping unconfigured provider");
                continue;
            }
            let model_name = resolve_model(kind, model).unwrap_or(provider.default_model());
            tried.push(kind.to_string());

            debug!(provider = %kind, model = model_name, "sending LLM request");
            match provider.complete(&prompt, model_name).await {
                Ok(c) if is_usable(&c.text) => {
                    self.log_usage(kind, model_name, &c.usage);
                    info!(
                        provider = %kind,
                        model = model_name,
                        tokens = c.usage.total_tokens,
                        "LLM response received"
                    );
                    return Ok(c.text);
                }
                Ok(_) => warn!(provider = %kind, "provider returned no usable text"),
                Err(e) => warn!(provider = %kind, error = %e, "provider failed"),
            }
        }

        Err(Error::AllProvidersFailed { tried })
    }

    fn log_usage(&self, kind: ProviderKind, model: &str, usage: &Usage) {
        if let Some(log) = &self.usage_log {
            if let Err(e) = log.record(kind, model, usage) {
                warn!(error = %e, path = %log.path().display(), "failed to log LLM usage");
            }
        }
    }
}

fn build_provider(
    kind: ProviderKind,
    pc: &ProviderConfig,
    http: HttpClient,
) -> Box<dyn CompletionProvider> {
    let env_var = pc
        .api_key_env
        .clone()
        .unwrap_or_else(|| kind.default_api_key_env().into());
    let api_key = std::env::var(&env_var).ok();
    match kind {
        ProviderKind::Groq | ProviderKind::OpenAi => Box::new(providers::OpenAiCompatible::new(
            kind,
            api_key,
            pc.base_url.clone(),
            pc.model.clone(),
            http,
        )),
        ProviderKind::Gemini => Box::new(providers::Gemini::new(
            api_key,
            pc.base_url.clone(),
            pc.model.clone(),
            http,
        )),
        ProviderKind::Ollama => {
            let host = pc
                .base_url
                .clone()
                .or_else(|| std::env::var("OLLAMA_HOST").ok());
            Box::new(providers::Ollama::new(host, pc.model.clone(), http))
        }
    }
}

fn resolve_model(kind: ProviderKind, model: Option<&str>) -> Option<&str> {
    let model = model?;
    match model.split_once(':') {
        Some((prefix, name)) => match prefix.parse::<ProviderKind>() {
            Ok(k) if k == kind => Some(name),
            Ok(_) => None,
            // Not a provider prefix, e.g. "mistral:latest".
            Err(_) => Some(model),
        },
        None => Some(model),
    }
}

fn is_usable(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && text != UNAVAILABLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Scripted {
        kind: ProviderKind,
        configured: bool,
        reply: Result<String>,
        calls: Arc<Mutex<Vec<(ProviderKind, String)>>>,
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        fn kind(&self) -> ProviderKind {
            self.kind
        }
        fn default_model(&self) -> &str {
            "default"
        }
        fn is_configured(&self) -> bool {
            self.configured
        }
        async fn complete(&self, _prompt: &str, model: &str) -> Result<Completion> {
            self.calls.lock().unwrap().push((self.kind, model.to_string()));
            match &self.reply {
                Ok(text) => Ok(Completion {
                    text: text.clone(),
                    usage: Usage::default(),
                }),
                Err(e) => Err(Error::api(self.kind.to_string(), e.to_string())),
            }
        }
    }

    fn chain(
        script: Vec<(ProviderKind, bool, Result<String>)>,
    ) -> (LlmClient, Arc<Mutex<Vec<(ProviderKind, String)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let providers = script
            .into_iter()
            .map(|(kind, configured, reply)| {
                Box::new(Scripted {
                    kind,
                    configured,
                    reply,
                    calls: calls.clone(),
                }) as Box<dyn CompletionProvider>
            })
            .collect();
        (LlmClient::new(providers), calls)
    }

    #[tokio::test]
    async fn falls_through_in_priority_order() {
        let (client, calls) = chain(vec![
            (ProviderKind::Groq, true, Err(Error::http("down"))),
            (ProviderKind::Gemini, true, Ok(UNAVAILABLE.into())),
            (ProviderKind::OpenAi, true, Ok("from openai".into())),
            (ProviderKind::Ollama, true, Ok("from ollama".into())),
        ]);
        assert_eq!(client.get_response("hi", None).await, "from openai");
        let order: Vec<ProviderKind> = calls.lock().unwrap().iter().map(|c| c.0).collect();
        assert_eq!(
            order,
            vec![ProviderKind::Groq, ProviderKind::Gemini, ProviderKind::OpenAi]
        );
    }

    #[tokio::test]
    async fn unconfigured_providers_are_skipped() {
        let (client, calls) = chain(vec![
            (ProviderKind::Groq, false, Ok("never".into())),
            (ProviderKind::Ollama, true, Ok("local".into())),
        ]);
        assert_eq!(client.get_response("hi", None).await, "local");
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn all_failing_returns_sentinel() {
        let (client, _) = chain(vec![
            (ProviderKind::Groq, true, Err(Error::http("down"))),
            (ProviderKind::Ollama, true, Ok("   ".into())),
        ]);
        assert_eq!(client.get_response("hi", None).await, ALL_FAILED);

        let err = client
            .try_get_response("hi", None, ResponseMode::Chat)
            .await
            .unwrap_err();
        match err {
            Error::AllProvidersFailed { tried } => assert_eq!(tried, vec!["groq", "ollama"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn pinned_model_only_applies_to_its_provider() {
        let (client, calls) = chain(vec![
            (ProviderKind::Groq, true, Err(Error::http("down"))),
            (ProviderKind::Ollama, true, Ok("ok".into())),
        ]);
        client
            .get_response("hi", Some("groq:llama-3.3-70b-versatile"))
            .await;
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].1, "llama-3.3-70b-versatile");
        assert_eq!(calls[1].1, "default");
    }

    #[test]
    fn bare_model_with_colon_tag_is_not_a_provider_prefix() {
        assert_eq!(
            resolve_model(ProviderKind::Ollama, Some("mistral:latest")),
            Some("mistral:latest")
        );
        assert_eq!(resolve_model(ProviderKind::Gemini, Some("openai:gpt-4o")), None);
        assert_eq!(resolve_model(ProviderKind::Gemini, None), None);
    }

    #[test]
    fn from_config_respects_priority_and_disabled_flags() {
        let mut config = Config::default();
        config.llm.gemini.enabled = false;
        let client = LlmClient::from_config(&config).unwrap();
        assert_eq!(
            client.provider_kinds(),
            vec![ProviderKind::Groq, ProviderKind::OpenAi, ProviderKind::Ollama]
        );
    }
}
