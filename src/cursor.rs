//! Persisted import offset cursor.
//!
//! Records how many bibliography items have been processed so "next batch"
//! resumes instead of re-importing. Stored as a tiny JSON object next to the
//! article store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::StoreError;
use crate::store::write_atomic;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorState {
    pub offset: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct ImportCursor {
    path: PathBuf,
}

impl ImportCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state; a missing file means offset 0.
    pub fn state(&self) -> Result<CursorState, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(CursorState::default()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CursorState::default()),
            Err(e) => Err(StoreError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    pub fn offset(&self) -> Result<u64, StoreError> {
        Ok(self.state()?.offset)
    }

    pub fn set(&self, offset: u64) -> Result<(), StoreError> {
        let state = CursorState {
            offset,
            updated_at: Some(Utc::now()),
        };
        let json =
            serde_json::to_string_pretty(&state).map_err(|e| StoreError::Invalid(e.to_string()))?;
        write_atomic(&self.path, json.as_bytes())
    }

    pub fn reset(&self) -> Result<(), StoreError> {
        self.set(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn starts_at_zero() {
        let tmp = TempDir::new().unwrap();
        let cursor = ImportCursor::new(tmp.path().join("cursor.json"));
        assert_eq!(cursor.offset().unwrap(), 0);
    }

    #[test]
    fn set_and_reset() {
        let tmp = TempDir::new().unwrap();
        let cursor = ImportCursor::new(tmp.path().join("nested").join("cursor.json"));
        cursor.set(15).unwrap();
        assert_eq!(cursor.offset().unwrap(), 15);
        assert!(cursor.state().unwrap().updated_at.is_some());

        cursor.reset().unwrap();
        assert_eq!(cursor.offset().unwrap(), 0);
    }

    #[test]
    fn garbage_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cursor.json");
        std::fs::write(&path, "offset=3").unwrap();
        let err = ImportCursor::new(path).offset().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
