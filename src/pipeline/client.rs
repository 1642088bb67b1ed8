use serde::{Deserialize, Serialize};

use super::ServiceError;

/// Async HTTP client for a local Ollama instance.
///
/// Only the two calls the pipeline needs: text generation for summaries
/// and vision chat for image OCR.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `/api/generate` with streaming disabled.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = check_status(response).await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ResponseParsing(e.to_string()))?;
        Ok(parsed.response)
    }

    /// `/api/chat` with base64 images attached to the user message.
    /// Chat-template vision models reject images on `/api/generate`.
    pub async fn chat_with_images(
        &self,
        model: &str,
        prompt: &str,
        images: Vec<String>,
        system: Option<&str>,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/api/chat", self.base_url);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
                images: None,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
            images: Some(images),
        });
        let body = ChatRequest {
            model,
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = check_status(response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ResponseParsing(e.to_string()))?;
        Ok(parsed.message.content)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_connect() {
            ServiceError::Connection(self.base_url.clone())
        } else {
            ServiceError::HttpClient(e.to_string())
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Api {
        status: status.as_u16(),
        body,
    })
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}
