//! Core data models used throughout Article Shelf.
//!
//! [`Article`] is the only persistent entity; everything else describes the
//! outcome of an import batch or a search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of importing a single bibliography item. Absent on articles
/// that were entered by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Success,
    Failed,
    Partial,
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImportStatus::Success => "success",
            ImportStatus::Failed => "failed",
            ImportStatus::Partial => "partial",
        };
        f.write_str(s)
    }
}

/// A stored article record, one element of the JSON array in the store file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_status: Option<ImportStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_strategy: Option<String>,
}

impl Article {
    /// Text indexed for search: title, abstract, and full text.
    pub fn document_text(&self) -> String {
        let mut doc = self.title.clone();
        for part in [&self.abstract_text, &self.text].into_iter().flatten() {
            if !part.is_empty() {
                doc.push('\n');
                doc.push_str(part);
            }
        }
        doc
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Fields supplied when creating an article. `id` and `created_at` are
/// assigned by the store when absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewArticle {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub import_status: Option<ImportStatus>,
    #[serde(default)]
    pub import_error: Option<String>,
    #[serde(default)]
    pub extraction_strategy: Option<String>,
}

impl NewArticle {
    /// Manual entry, mirroring the add form: authors are a comma-separated
    /// string and the text falls back to the abstract.
    pub fn manual(
        title: &str,
        authors: &str,
        abstract_text: Option<String>,
        url: Option<String>,
        text: Option<String>,
    ) -> Self {
        let authors = authors
            .split(',')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        let abstract_text = abstract_text.filter(|a| !a.trim().is_empty());
        let text = text
            .filter(|t| !t.trim().is_empty())
            .or_else(|| abstract_text.clone())
            .map(|t| t.trim().to_string());
        Self {
            title: title.trim().to_string(),
            authors,
            abstract_text,
            url: url.filter(|u| !u.trim().is_empty()),
            text,
            ..Default::default()
        }
    }
}

/// One failed or partial item in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportIssue {
    pub title: String,
    pub domain: Option<String>,
    pub reason: String,
    pub status: ImportStatus,
    /// Status code when the article page answered with a non-2xx.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

/// Summary of one import batch (or rescan).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub offset: u64,
    pub next_offset: u64,
    pub fetched: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<ImportIssue>,
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub article: Article,
    pub score: f64,
}
