use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ExtractionStatus, SummaryStatus};

/// Longest accepted document name, in characters.
pub const MAX_NAME_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub category: String,
    pub tags: Vec<String>,
    pub file_ref: String,
    pub uploaded_at: DateTime<Utc>,
    pub extracted_text: Option<String>,
    pub extraction_status: ExtractionStatus,
    pub extraction_error: Option<String>,
    pub summary: Option<String>,
    pub summary_status: SummaryStatus,
    pub summary_error: Option<String>,
}

impl Document {
    /// Extracted text, if present and not whitespace-only.
    pub fn usable_text(&self) -> Option<&str> {
        self.extracted_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Owner-editable fields supplied at upload time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Owner edit of name, category or tags. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Partial update for a stored document.
///
/// `None` leaves the column untouched. The doubly-optional fields use
/// `Some(None)` to clear a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub extracted_text: Option<Option<String>>,
    pub extraction_status: Option<ExtractionStatus>,
    pub extraction_error: Option<Option<String>>,
    pub summary: Option<Option<String>>,
    pub summary_status: Option<SummaryStatus>,
    pub summary_error: Option<Option<String>>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Extraction finished with usable text. Any previous summary was
    /// derived from older text and is dropped.
    pub fn extraction_succeeded(text: String) -> Self {
        Self {
            extracted_text: Some(Some(text)),
            extraction_status: Some(ExtractionStatus::Completed),
            extraction_error: Some(None),
            summary: Some(None),
            summary_status: Some(SummaryStatus::None),
            summary_error: Some(None),
            ..Self::default()
        }
    }

    pub fn extraction_failed(message: impl Into<String>) -> Self {
        Self {
            extraction_status: Some(ExtractionStatus::Error),
            extraction_error: Some(Some(message.into())),
            ..Self::default()
        }
    }

    pub fn summary_succeeded(summary: String) -> Self {
        Self {
            summary: Some(Some(summary)),
            summary_status: Some(SummaryStatus::Completed),
            summary_error: Some(None),
            ..Self::default()
        }
    }

    pub fn summary_failed(message: impl Into<String>) -> Self {
        Self {
            summary_status: Some(SummaryStatus::Error),
            summary_error: Some(Some(message.into())),
            ..Self::default()
        }
    }

    /// Apply to an in-memory document. Immutable fields are never touched.
    pub fn apply(&self, doc: &mut Document) {
        if let Some(name) = &self.name {
            doc.name = name.clone();
        }
        if let Some(category) = &self.category {
            doc.category = category.clone();
        }
        if let Some(tags) = &self.tags {
            doc.tags = tags.clone();
        }
        if let Some(text) = &self.extracted_text {
            doc.extracted_text = text.clone();
        }
        if let Some(status) = self.extraction_status {
            doc.extraction_status = status;
        }
        if let Some(error) = &self.extraction_error {
            doc.extraction_error = error.clone();
        }
        if let Some(summary) = &self.summary {
            doc.summary = summary.clone();
        }
        if let Some(status) = self.summary_status {
            doc.summary_status = status;
        }
        if let Some(error) = &self.summary_error {
            doc.summary_error = error.clone();
        }
    }
}

/// Trim tags, drop blanks and duplicates while keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
