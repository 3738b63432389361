//! Flat JSON record store.
//!
//! The whole article list lives in one JSON array. Every operation reloads
//! the file, so hand edits between calls are picked up, and every mutation
//! rewrites it in full through a sibling temp file and a rename.

use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{Article, NewArticle};

pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every article in store order. A missing file is an empty store.
    pub fn load(&self) -> Result<Vec<Article>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let articles: Vec<Article> =
            serde_json::from_str(&content).map_err(|e| self.corrupt(e.to_string()))?;

        let mut seen = HashSet::new();
        for (i, a) in articles.iter().enumerate() {
            if a.title.trim().is_empty() {
                return Err(self.corrupt(format!("record {} has an empty title", i)));
            }
            if !seen.insert(a.id.as_str()) {
                return Err(self.corrupt(format!("duplicate id {}", a.id)));
            }
        }

        Ok(articles)
    }

    /// Append a new article, assigning `id` and `created_at` when absent.
    pub fn append(&self, new: NewArticle) -> Result<Article, StoreError> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::Invalid("title is required".to_string()));
        }

        let mut articles = self.load()?;

        let id = new
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if articles.iter().any(|a| a.id == id) {
            return Err(StoreError::Invalid(format!("id already exists: {}", id)));
        }

        let article = Article {
            id,
            title,
            authors: new.authors,
            abstract_text: new.abstract_text,
            url: new.url,
            doi: new.doi,
            text: new.text,
            created_at: new.created_at.unwrap_or_else(Utc::now),
            import_status: new.import_status,
            import_error: new.import_error,
            extraction_strategy: new.extraction_strategy,
        };

        articles.push(article.clone());
        self.save(&articles)?;
        Ok(article)
    }

    /// Remove an article. Returns `false` (and leaves the file alone) when
    /// no article has this id.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut articles = self.load()?;
        let before = articles.len();
        articles.retain(|a| a.id != id);
        if articles.len() == before {
            return Ok(false);
        }
        self.save(&articles)?;
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Result<Option<Article>, StoreError> {
        Ok(self.load()?.into_iter().find(|a| a.id == id))
    }

    /// Replace the stored record with the same id. `id` and `created_at`
    /// of the stored record are kept.
    pub fn update(&self, article: &Article) -> Result<bool, StoreError> {
        if article.title.trim().is_empty() {
            return Err(StoreError::Invalid("title is required".to_string()));
        }
        let mut articles = self.load()?;
        let Some(slot) = articles.iter_mut().find(|a| a.id == article.id) else {
            return Ok(false);
        };
        let created_at = slot.created_at;
        *slot = article.clone();
        slot.created_at = created_at;
        self.save(&articles)?;
        Ok(true)
    }

    /// First article sharing the URL or DOI. URLs match with scheme and host
    /// case folded and a trailing slash ignored; the path stays
    /// case-sensitive. DOIs match case-insensitively.
    pub fn find_duplicate(
        &self,
        url: Option<&str>,
        doi: Option<&str>,
    ) -> Result<Option<Article>, StoreError> {
        let url = url.map(url_key).filter(|u| !u.is_empty());
        let doi = doi.map(doi_key).filter(|d| !d.is_empty());
        if url.is_none() && doi.is_none() {
            return Ok(None);
        }

        Ok(self.load()?.into_iter().find(|a| {
            let url_match = match (&url, &a.url) {
                (Some(u), Some(other)) => *u == url_key(other),
                _ => false,
            };
            let doi_match = match (&doi, &a.doi) {
                (Some(d), Some(other)) => *d == doi_key(other),
                _ => false,
            };
            url_match || doi_match
        }))
    }

    fn save(&self, articles: &[Article]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(articles)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        write_atomic(&self.path, json.as_bytes())
    }

    fn corrupt(&self, message: String) -> StoreError {
        StoreError::Corrupt {
            path: self.path.clone(),
            message,
        }
    }
}

fn url_key(raw: &str) -> String {
    let raw = raw.trim();
    // `Url` lowercases scheme and host on parse.
    match url::Url::parse(raw) {
        Ok(parsed) => parsed.as_str().trim_end_matches('/').to_string(),
        Err(_) => raw.trim_end_matches('/').to_string(),
    }
}

fn doi_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Write `bytes` to a temp file next to `path`, then rename over it.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    std::fs::write(&tmp, bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
