use async_trait::async_trait;

use super::ServiceError;

/// Turns a stored file into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, file_ref: &str) -> Result<String, ServiceError>;
}

/// Produces a short summary of extracted text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, ServiceError>;
}
