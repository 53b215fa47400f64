use super::usage::Usage;
use super::{Completion, CompletionProvider, ProviderKind, UNAVAILABLE};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

// -- OpenAI-compatible format (Groq, OpenAI) --

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Chat-completions provider: Groq and OpenAI share this wire format.
pub struct OpenAiCompatible {
    kind: ProviderKind,
    api_key: Option<String>,
    base_url: String,
    model: String,
    http: HttpClient,
}

impl OpenAiCompatible {
    pub fn new(
        kind: ProviderKind,
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
        http: HttpClient,
    ) -> Self {
        Self {
            kind,
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url.unwrap_or_else(|| kind.default_base_url().into()),
            model: model.unwrap_or_else(|| kind.default_model()),
            http,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatible {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, prompt: &str, model: &str) -> Result<Completion> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::config(format!("{} API key not set", self.kind)))?;

        // Groq gets the sampling parameters the OpenAI default omits.
        let (temperature, max_tokens, top_p) = match self.kind {
            ProviderKind::Groq => (Some(0.7), Some(2048), Some(0.9)),
            _ => (None, None, None),
        };
        let request = ChatRequest {
            model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
            top_p,
            stream: false,
        };

        let body = serde_json::to_string(&request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/chat/completions", self.base_url);
        let response_text = self
            .http
            .post_json_raw(
                &url,
                &body,
                &[("Authorization", &format!("Bearer {api_key}"))],
            )
            .await
            .map_err(|e| {
                warn!(provider = %self.kind, "LLM API error: {e}");
                e
            })?;

        let resp: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::parse(format!("parse {} response: {e}", self.kind)))?;

        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| Error::parse(format!("empty response from {}", self.kind)))?;

        let usage = resp
            .usage
            .map(|u| Usage::reported(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_else(|| Usage::estimate(prompt, &text));
        Ok(Completion { text, usage })
    }
}

// -- Gemini format --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

pub struct Gemini {
    api_key: Option<String>,
    base_url: String,
    model: String,
    http: HttpClient,
}

impl Gemini {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
        http: HttpClient,
    ) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url.unwrap_or_else(|| ProviderKind::Gemini.default_base_url().into()),
            model: model.unwrap_or_else(|| ProviderKind::Gemini.default_model()),
            http,
        }
    }
}

#[async_trait]
impl CompletionProvider for Gemini {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, prompt: &str, model: &str) -> Result<Completion> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::config("gemini API key not set"))?;

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 0.9,
                top_k: 40,
            },
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/models/{model}:generateContent", self.base_url);
        let response_text = self
            .http
            .post_json_raw(&url, &body, &[("x-goog-api-key", api_key)])
            .await
            .map_err(|e| {
                warn!("Gemini API error: {e}");
                e
            })?;

        let resp: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::parse(format!("parse Gemini response: {e}")))?;

        let text = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .map(|t| t.trim().to_string())
            .ok_or_else(|| Error::parse("no candidates in Gemini response"))?;

        let usage = match resp.usage_metadata {
            Some(u) if u.prompt_token_count + u.candidates_token_count > 0 => {
                Usage::reported(u.prompt_token_count, u.candidates_token_count)
            }
            _ => Usage::estimate(prompt, &text),
        };
        Ok(Completion { text, usage })
    }
}

// -- Ollama native format --

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Local model server. Needs no key, so it is always attempted.
pub struct Ollama {
    host: String,
    model: String,
    http: HttpClient,
}

impl Ollama {
    pub fn new(host: Option<String>, model: Option<String>, http: HttpClient) -> Self {
        Self {
            host: host.unwrap_or_else(|| ProviderKind::Ollama.default_base_url().into()),
            model: model.unwrap_or_else(|| ProviderKind::Ollama.default_model()),
            http,
        }
    }
}

#[async_trait]
impl CompletionProvider for Ollama {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, prompt: &str, model: &str) -> Result<Completion> {
        let request = OllamaRequest {
            model,
            prompt,
            stream: false,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/api/generate", self.host.trim_end_matches('/'));
        let response_text = self.http.post_json_raw(&url, &body, &[]).await?;

        let resp: OllamaResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::parse(format!("parse Ollama response: {e}")))?;

        let text = resp.response.trim().to_string();
        if text.is_empty() {
            return Ok(Completion {
                text: UNAVAILABLE.into(),
                usage: Usage::default(),
            });
        }
        let usage = match (resp.prompt_eval_count, resp.eval_count) {
            (Some(p), Some(c)) => Usage::reported(p, c),
            _ => Usage::estimate(prompt, &text),
        };
        Ok(Completion { text, usage })
    }
}
