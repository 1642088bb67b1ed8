//! Uploaded file bytes on disk.
//!
//! A document's `file_ref` is the bare file name under the uploads
//! directory. Anything that could escape that directory is rejected.

use std::path::{Path, PathBuf};

use base64::Engine;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Base64 decode failed: {0}")]
    InvalidEncoding(String),

    #[error("File is empty")]
    Empty,

    #[error("File is {size} bytes; limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Invalid file reference: {0}")]
    InvalidRef(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidEncoding(_) | StorageError::Empty | StorageError::TooLarge { .. } => {
                CoreError::Validation(err.to_string())
            }
            StorageError::InvalidRef(_) => CoreError::not_found("File"),
            StorageError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                CoreError::not_found("File")
            }
            StorageError::Io(e) => CoreError::Io(e),
        }
    }
}

/// Decoded upload payload.
#[derive(Debug)]
pub struct DecodedUpload {
    pub bytes: Vec<u8>,
    /// Media type from the `data:` header, when one was present.
    pub media_type: Option<String>,
}

/// Decode a `data:<type>;base64,<payload>` URL. A bare base64 string is
/// accepted as well.
pub fn decode_data_url(data_url: &str) -> Result<DecodedUpload, StorageError> {
    let (media_type, base64_data) = match data_url.find(',') {
        Some(idx) => {
            let header = &data_url[..idx];
            let media_type = header
                .strip_prefix("data:")
                .and_then(|rest| rest.split(';').next())
                .filter(|mt| !mt.is_empty())
                .map(str::to_string);
            (media_type, &data_url[idx + 1..])
        }
        None => (None, data_url),
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(base64_data.trim())
        .map_err(|e| StorageError::InvalidEncoding(e.to_string()))?;
    Ok(DecodedUpload { bytes, media_type })
}

/// Detect file extension from magic bytes, then the declared media type.
pub fn detect_extension(bytes: &[u8], media_type: Option<&str>) -> &'static str {
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        "jpg"
    } else if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
    {
        "png"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else if bytes.len() >= 5 && &bytes[0..5] == b"%PDF-" {
        "pdf"
    } else if media_type.is_some_and(|mt| mt.starts_with("text/")) {
        "txt"
    } else if let Some(ext) = media_type
        .and_then(mime_guess::get_mime_extensions_str)
        .and_then(|exts| exts.first().copied())
    {
        ext
    } else if std::str::from_utf8(bytes).is_ok() {
        "txt"
    } else {
        "bin"
    }
}

/// Flat directory of uploaded files.
pub struct FileStore {
    root: PathBuf,
    max_bytes: usize,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Write bytes under a fresh name and return its `file_ref`.
    pub async fn save(&self, bytes: &[u8], extension: &str) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(StorageError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let file_ref = format!("{}.{extension}", Uuid::new_v4());
        tokio::fs::write(self.root.join(&file_ref), bytes).await?;
        tracing::debug!(file_ref = %file_ref, size = bytes.len(), "Stored upload");
        Ok(file_ref)
    }

    pub fn resolve(&self, file_ref: &str) -> Result<PathBuf, StorageError> {
        let valid = !file_ref.is_empty()
            && !file_ref.contains(['/', '\\'])
            && file_ref != "."
            && file_ref != "..";
        if !valid {
            return Err(StorageError::InvalidRef(file_ref.to_string()));
        }
        Ok(self.root.join(file_ref))
    }

    pub async fn read(&self, file_ref: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(file_ref)?;
        Ok(tokio::fs::read(path).await?)
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn delete(&self, file_ref: &str) -> Result<(), StorageError> {
        let path = self.resolve(file_ref)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Content type to serve a stored file with.
pub fn content_type_for(file_ref: &str) -> String {
    mime_guess::from_path(file_ref)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
