use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::ProviderKind;

/// Token counts reported by (or estimated for) a single completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

impl Usage {
    pub fn reported(prompt: u32, completion: u32) -> Self {
        Self {
            prompt_tokens: Some(prompt),
            completion_tokens: Some(completion),
            total_tokens: prompt + completion,
        }
    }

    /// Rough whitespace-word estimate for providers that don't report usage.
    pub fn estimate(prompt: &str, response: &str) -> Self {
        let total = prompt.split_whitespace().count() + response.split_whitespace().count();
        Self {
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: total as u32,
        }
    }
}

/// USD per million tokens (input + output).
fn price_per_million(provider: ProviderKind, model: &str) -> f64 {
    match provider {
        ProviderKind::Groq => match model {
            "gemma2-9b-it" | "llama-3.1-8b-instant" | "compound-beta" | "gemma-7b-it" => 0.27,
            "llama-3.3-70b-versatile" => 0.59,
            "mixtral-8x7b-32768" => 0.7,
            _ => 1.0,
        },
        ProviderKind::OpenAi => match model {
            "gpt-3.5-turbo" => 0.5,
            "gpt-4o" => 5.0,
            "gpt-4-turbo" => 10.0,
            _ => 1.0,
        },
        ProviderKind::Gemini => 0.15,
        ProviderKind::Ollama => 0.0,
    }
}

pub fn estimate_cost(provider: ProviderKind, model: &str, usage: &Usage) -> f64 {
    f64::from(usage.total_tokens) / 1_000_000.0 * price_per_million(provider, model)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsageEntry {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub usage: Usage,
    pub cost_usd: f64,
}

/// Append-only JSON-lines log of LLM calls.
#[derive(Debug, Clone)]
pub struct UsageLog {
    path: PathBuf,
}

impl UsageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, provider: ProviderKind, model: &str, usage: &Usage) -> Result<()> {
        let entry = UsageEntry {
            timestamp: Utc::now(),
            provider: provider.to_string(),
            model: model.to_string(),
            usage: usage.clone(),
            cost_usd: estimate_cost(provider, model, usage),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(&entry)
            .map_err(|e| crate::error::Error::parse(format!("serialize usage entry: {e}")))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groq_cost_uses_price_table() {
        let usage = Usage::reported(400_000, 600_000);
        let cost = estimate_cost(ProviderKind::Groq, "llama-3.3-70b-versatile", &usage);
        assert!((cost - 0.59).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_defaults_to_one_dollar() {
        let usage = Usage::reported(1_000_000, 0);
        let cost = estimate_cost(ProviderKind::OpenAi, "some-new-model", &usage);
        assert!((cost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn local_model_is_free() {
        let usage = Usage::estimate("one two three", "four five");
        assert_eq!(usage.total_tokens, 5);
        assert_eq!(estimate_cost(ProviderKind::Ollama, "mistral", &usage), 0.0);
    }

    #[test]
    fn log_appends_one_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let log = UsageLog::new(dir.path().join("nested/usage.log"));
        log.record(ProviderKind::Groq, "gemma2-9b-it", &Usage::reported(10, 5))
            .unwrap();
        log.record(ProviderKind::Ollama, "mistral", &Usage::estimate("a b", "c"))
            .unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let entries: Vec<UsageEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].provider, "groq");
        assert_eq!(entries[0].usage.total_tokens, 15);
        assert_eq!(entries[1].provider, "ollama");
        assert_eq!(entries[1].cost_usd, 0.0);
    }
}
