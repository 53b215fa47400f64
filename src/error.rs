use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({platform}): {message}")]
    Api {
        platform: String,
        message: String,
        status_code: Option<u16>,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Rate limited by {platform}")]
    RateLimit {
        platform: String,
        retry_after_secs: Option<u64>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Calendar error: {0}")]
    Calendar(String),

    #[error("Webhook rejected: {0}")]
    Webhook(String),

    #[error("all LLM providers failed (tried: {})", tried.join(", "))]
    AllProvidersFailed { tried: Vec<String> },
}

impl Error {
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn api(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn api_with_status(
        platform: impl Into<String>,
        message: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn ocr(msg: impl Into<String>) -> Self {
        Self::Ocr(msg.into())
    }

    pub fn calendar(msg: impl Into<String>) -> Self {
        Self::Calendar(msg.into())
    }

    pub fn webhook(msg: impl Into<String>) -> Self {
        Self::Webhook(msg.into())
    }

    /// Whether retrying the same request might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            Self::Api {
                status_code: Some(code),
                ..
            } => *code >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        assert!(Error::api_with_status("api.groq.com", "oops", 503).is_transient());
        assert!(
            Error::RateLimit {
                platform: "api.openai.com".into(),
                retry_after_secs: None
            }
            .is_transient()
        );
        assert!(!Error::api_with_status("api.openai.com", "bad key", 401).is_transient());
        assert!(!Error::parse("bad json").is_transient());
    }

    #[test]
    fn all_providers_failed_lists_attempts() {
        let err = Error::AllProvidersFailed {
            tried: vec!["groq".into(), "ollama".into()],
        };
        assert_eq!(
            err.to_string(),
            "all LLM providers failed (tried: groq, ollama)"
        );
    }
}
