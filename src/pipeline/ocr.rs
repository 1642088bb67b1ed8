//! Production `TextExtractor`: plain-text files are read directly, images
//! go through an Ollama vision model.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;

use super::client::OllamaClient;
use super::types::TextExtractor;
use super::ServiceError;
use crate::storage::FileStore;

const OCR_SYSTEM_PROMPT: &str = "\
You are a medical document text extractor. Extract ALL visible text from \
the provided document image. Preserve headings, lists and table rows. \
Do not add commentary.";

const OCR_USER_PROMPT: &str = "Extract all visible text from this document image.";

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "text"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Text,
    Image,
    Other,
}

fn classify(file_ref: &str) -> FileKind {
    let ext = Path::new(file_ref)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        FileKind::Text
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        FileKind::Image
    } else {
        FileKind::Other
    }
}

pub struct FileTextExtractor {
    files: Arc<FileStore>,
    client: OllamaClient,
    model: String,
}

impl FileTextExtractor {
    pub fn new(files: Arc<FileStore>, client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            files,
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextExtractor for FileTextExtractor {
    async fn extract(&self, file_ref: &str) -> Result<String, ServiceError> {
        let kind = classify(file_ref);
        if kind == FileKind::Other {
            return Err(ServiceError::Unsupported(file_ref.to_string()));
        }

        let path = self
            .files
            .resolve(file_ref)
            .map_err(|e| ServiceError::Unsupported(e.to_string()))?;
        let bytes = tokio::fs::read(&path).await?;

        match kind {
            FileKind::Text => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            FileKind::Image => {
                let start = std::time::Instant::now();
                let image = base64::engine::general_purpose::STANDARD.encode(&bytes);
                let text = self
                    .client
                    .chat_with_images(&self.model, OCR_USER_PROMPT, vec![image], Some(OCR_SYSTEM_PROMPT))
                    .await?;
                tracing::info!(
                    model = %self.model,
                    image_size = bytes.len(),
                    elapsed_ms = %start.elapsed().as_millis(),
                    text_len = text.len(),
                    "Vision OCR extraction complete"
                );
                Ok(text)
            }
            FileKind::Other => Err(ServiceError::Unsupported(file_ref.to_string())),
        }
    }
}
