use crate::llm::LlmClient;
use crate::prompts;
use std::sync::Arc;

pub struct Summarizer {
    llm: Arc<LlmClient>,
}

impl Summarizer {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn summarize(&self, text: &str) -> String {
        self.llm
            .get_response(&prompts::summarization(text), None)
            .await
    }
}
