//! Error taxonomy for the import, search, and analysis pipeline.
//!
//! Per-item failures ([`ExtractionFailure`], [`RenderFailure`]) are recorded
//! on the article and never abort a batch. [`StoreError`] and
//! [`AnalysisFailure`] abort the current operation and reach the user as-is.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionFailure {
    /// Every strategy produced less than the minimum amount of text.
    /// `best` keeps the longest candidate so callers can store partial text.
    #[error("content-too-short: {chars} chars extracted")]
    ContentTooShort { chars: usize, best: String },

    #[error("http-error: status {status}")]
    Http { status: u16 },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("network-error: {0}")]
    Network(String),

    #[error("unsupported-content-type: {0}")]
    UnsupportedContentType(String),

    #[error("pdf-error: {0}")]
    Pdf(String),
}

impl ExtractionFailure {
    /// Short machine-readable reason, stored on failed articles.
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractionFailure::ContentTooShort { .. } => "content-too-short",
            ExtractionFailure::Http { .. } => "http-error",
            ExtractionFailure::Timeout(_) => "timeout",
            ExtractionFailure::Network(_) => "network-error",
            ExtractionFailure::UnsupportedContentType(_) => "unsupported-content-type",
            ExtractionFailure::Pdf(_) => "pdf-error",
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ExtractionFailure::Http { status } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderFailure {
    #[error("render timeout after {0}s")]
    Timeout(u64),

    #[error("browser crashed: {0}")]
    Crash(String),

    #[error("browser driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("browser returned an empty document")]
    EmptyDocument,
}

impl RenderFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            RenderFailure::Timeout(_) => "render-timeout",
            RenderFailure::Crash(_) => "render-crash",
            RenderFailure::DriverUnavailable(_) => "driver-unavailable",
            RenderFailure::EmptyDocument => "render-empty",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisFailure {
    #[error("no API credential: set OPENAI_API_KEY or openai_api_key in the secrets file")]
    NoCredential,

    #[error("API credential rejected (status {0})")]
    InvalidCredential(u16),

    #[error("rate limited or quota exceeded: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("language model API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing file exists but cannot be trusted. Never auto-repaired.
    #[error("corrupt store {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid article: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum BibliographyError {
    #[error("bibliography API unreachable: {0}")]
    Unreachable(String),

    #[error("bibliography API rejected the session cookies (status {0})")]
    Unauthorized(u16),

    #[error("bibliography API error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("unrecognized bibliography response: {0}")]
    Malformed(String),
}

/// Failures that abort a whole batch. Per-item problems never surface here.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Bibliography(#[from] BibliographyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid import request: {0}")]
    InvalidRequest(String),
}
