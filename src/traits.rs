//! Seams between the import runner and the outside world.
//!
//! The [`ImportRunner`](crate::import::ImportRunner) talks to the
//! bibliography API, article pages, and the headless browser only through
//! these traits, so tests (and alternative backends) can swap any of them.
//!
//! ```text
//! ┌────────────────┐  ┌───────────────┐  ┌──────────────┐
//! │ MetadataSource │  │ PageExtractor │  │ PageRenderer │
//! │ (bibliography) │  │ (HTTP + HTML) │  │  (Chromium)  │
//! └───────┬────────┘  └───────┬───────┘  └──────┬───────┘
//!         └──────────────┬────┴─────────────────┘
//!                        ▼
//!              ImportRunner::run_batch()
//! ```

use async_trait::async_trait;

use crate::bibliography::{BibItem, PageRequest};
use crate::errors::{BibliographyError, ExtractionFailure, RenderFailure};
use crate::extract::Extraction;
use crate::render::RenderedPage;

/// Source of article metadata, one page at a time.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch up to `request.size` items starting at `request.offset`.
    ///
    /// An error means the page as a whole could not be obtained; the runner
    /// aborts the batch without touching the cursor.
    async fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<BibItem>, BibliographyError>;
}

/// Static text extraction for a single URL.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Fetch `url` once (with the given cookie header) and extract its text.
    async fn extract(
        &self,
        url: &str,
        cookies: Option<&str>,
    ) -> Result<Extraction, ExtractionFailure>;

    /// Run the same extraction strategies over already-fetched HTML.
    fn extract_html(&self, html: &str) -> Result<Extraction, ExtractionFailure>;
}

/// Factory for scoped rendering sessions.
pub trait PageRenderer: Send + Sync {
    /// Open a session. Implementations must defer expensive startup until
    /// the first [`RenderSession::render`] call and release everything on drop.
    fn open_session(&self) -> Box<dyn RenderSession>;
}

/// One batch worth of browser state.
#[async_trait]
pub trait RenderSession: Send {
    async fn render(&mut self, url: &str, timeout_secs: u64) -> Result<RenderedPage, RenderFailure>;
}
