pub mod client;
pub mod ocr;
pub mod orchestrator;
pub mod summarizer;
pub mod types;

pub use client::OllamaClient;
pub use ocr::FileTextExtractor;
pub use orchestrator::DocumentPipeline;
pub use summarizer::OllamaSummarizer;
pub use types::{Summarizer, TextExtractor};

use thiserror::Error;

/// Failure of an external extraction or summarization call.
///
/// These never escape the pipeline: the orchestrator records the message
/// on the document's error field.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Cannot connect to model server at {0}")]
    Connection(String),

    #[error("Model server returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Cannot read stored file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("Failed to parse model response: {0}")]
    ResponseParsing(String),
}
