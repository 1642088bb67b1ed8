use async_trait::async_trait;

use super::client::OllamaClient;
use super::types::Summarizer;
use super::ServiceError;

const SUMMARY_SYSTEM_PROMPT: &str = "\
You summarize medical documents for family caregivers. Write a short, \
plain-language summary: what the document is, key findings, medications \
and any follow-up actions. Do not invent information that is not in the text.";

/// Summarizer backed by Ollama `/api/generate`.
pub struct OllamaSummarizer {
    client: OllamaClient,
    model: String,
}

impl OllamaSummarizer {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

fn build_prompt(text: &str) -> String {
    format!("Summarize the following document.\n\n---\n{}\n---", text.trim())
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, ServiceError> {
        let start = std::time::Instant::now();
        let summary = self
            .client
            .generate(&self.model, &build_prompt(text), SUMMARY_SYSTEM_PROMPT)
            .await?;
        tracing::info!(
            model = %self.model,
            input_len = text.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "Summary generated"
        );
        Ok(summary.trim().to_string())
    }
}
