//! Import batch runner.
//!
//! Pulls one page of metadata from the bibliography API, turns each item into
//! an [`Article`](crate::models::Article) with as much text as can be
//! extracted, and advances the persisted offset cursor.
//!
//! # Pipeline
//!
//! ```text
//! cursor ──► MetadataSource::fetch_page(offset, size)
//!                 │
//!                 ▼  for each item, in page order
//!          already stored (url / doi)? ──yes──► skipped
//!                 │ no
//!                 ▼
//!          PageExtractor::extract ──ContentTooShort──► RenderSession::render
//!                 │                                          │
//!                 ▼                                          ▼
//!          success / failed                   success / partial / failed
//!                 │
//!                 ▼
//!          RecordStore::append, cursor = offset + processed
//! ```
//!
//! Per-item failures are recorded on the article and in the
//! [`BatchReport`]; they never abort the batch. A page that cannot be
//! fetched, or a store write that fails, aborts it. Because the cursor is
//! written after every committed item, an aborted batch resumes right after
//! the last article that reached the store.

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::bibliography::{BibItem, BibliographyClient, PageRequest};
use crate::config::{BibliographyConfig, Config};
use crate::cursor::ImportCursor;
use crate::errors::{BibliographyError, ExtractionFailure, ImportError};
use crate::extract::ContentExtractor;
use crate::models::{BatchReport, ImportIssue, ImportStatus, NewArticle};
use crate::progress::{
    ImportProgressEvent, ImportProgressReporter, ItemOutcome, NoProgress, ProgressMode,
};
use crate::render::ChromiumRenderer;
use crate::store::RecordStore;
use crate::traits::{MetadataSource, PageExtractor, PageRenderer, RenderSession};

/// Title stored for items that arrive without one.
pub const UNTITLED: &str = "Untitled";

/// One "import next batch" request.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub collection_id: String,
    pub endpoint: String,
    /// Raw `Cookie` header value, passed through untouched.
    pub cookies: Option<String>,
    /// Start here instead of at the persisted cursor.
    pub offset: Option<u64>,
    pub size: u64,
}

/// Result of probing the bibliography API with the user's cookies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CookieCheck {
    pub ok: bool,
    /// `valid`, `rejected`, or `error`.
    pub status: String,
    pub items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Text obtained for one URL.
#[derive(Debug)]
enum Acquired {
    Complete { text: String, strategy: String },
    Partial { text: String, reason: String },
    Failed { reason: String, http_status: Option<u16> },
}

pub struct ImportRunner {
    store: RecordStore,
    cursor: ImportCursor,
    source: Box<dyn MetadataSource>,
    extractor: Box<dyn PageExtractor>,
    renderer: Box<dyn PageRenderer>,
    render_timeout_secs: u64,
    progress: Box<dyn ImportProgressReporter>,
}

impl ImportRunner {
    pub fn new(
        store: RecordStore,
        cursor: ImportCursor,
        source: Box<dyn MetadataSource>,
        extractor: Box<dyn PageExtractor>,
        renderer: Box<dyn PageRenderer>,
        render_timeout_secs: u64,
    ) -> Self {
        Self {
            store,
            cursor,
            source,
            extractor,
            renderer,
            render_timeout_secs,
            progress: Box::new(NoProgress),
        }
    }

    /// Runner wired to the real bibliography client, HTTP extractor, and
    /// Chromium renderer.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let bib_timeout = config
            .bibliography
            .as_ref()
            .map(|b| b.timeout_secs)
            .unwrap_or(30);
        Ok(Self::new(
            RecordStore::new(&config.store.path),
            ImportCursor::new(config.store.cursor_path()),
            Box::new(BibliographyClient::new(bib_timeout)?),
            Box::new(ContentExtractor::new(&config.extraction)?),
            Box::new(ChromiumRenderer::new(&config.render)),
            config.render.timeout_secs,
        ))
    }

    pub fn with_progress(mut self, progress: Box<dyn ImportProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn cursor(&self) -> &ImportCursor {
        &self.cursor
    }

    /// Import the next page of the collection.
    pub async fn run_batch(&self, request: &BatchRequest) -> Result<BatchReport, ImportError> {
        if request.size == 0 {
            return Err(ImportError::InvalidRequest(
                "batch size must be > 0".to_string(),
            ));
        }

        let offset = match request.offset {
            Some(o) => o,
            None => self.cursor.offset()?,
        };
        let cookies = request.cookies.as_deref();

        let items = self
            .source
            .fetch_page(&PageRequest {
                endpoint: &request.endpoint,
                collection_id: &request.collection_id,
                offset,
                size: request.size,
                cookies,
            })
            .await
            .inspect_err(|e| warn!(offset, error = %e, "bibliography fetch failed; cursor unchanged"))?;

        info!(offset, fetched = items.len(), "import batch started");
        let total = items.len() as u64;
        self.progress.report(ImportProgressEvent::Fetched {
            offset,
            count: total,
        });

        let mut report = BatchReport {
            offset,
            next_offset: offset,
            fetched: items.len(),
            ..Default::default()
        };

        // Opened per batch; the browser itself only starts on first render.
        let mut session = self.renderer.open_session();

        for (i, item) in items.iter().enumerate() {
            let title = item
                .title
                .clone()
                .unwrap_or_else(|| UNTITLED.to_string());

            let outcome = if self
                .store
                .find_duplicate(item.url.as_deref(), item.doi.as_deref())?
                .is_some()
            {
                info!(title = %title, "already in store; skipped");
                report.skipped += 1;
                ItemOutcome::Skipped
            } else {
                let status = self
                    .import_item(item, &title, cookies, session.as_mut(), &mut report)
                    .await?;
                ItemOutcome::Imported(status)
            };

            let processed = offset + i as u64 + 1;
            self.cursor.set(processed)?;
            report.next_offset = processed;

            self.progress.report(ImportProgressEvent::Item {
                n: i as u64 + 1,
                total,
                title,
                outcome,
            });
        }

        if items.is_empty() && request.offset.is_some() {
            self.cursor.set(offset)?;
        }

        info!(
            succeeded = report.succeeded,
            partial = report.partial,
            failed = report.failed,
            skipped = report.skipped,
            next_offset = report.next_offset,
            "import batch finished"
        );
        Ok(report)
    }

    async fn import_item(
        &self,
        item: &BibItem,
        title: &str,
        cookies: Option<&str>,
        session: &mut dyn RenderSession,
        report: &mut BatchReport,
    ) -> Result<ImportStatus, ImportError> {
        let target = item.target_url();
        let acquired = match &target {
            Some(url) => self.acquire_text(url, cookies, session).await,
            None => Acquired::Failed {
                reason: "no-url".to_string(),
                http_status: None,
            },
        };

        let mut article = NewArticle {
            title: title.to_string(),
            authors: item.authors.clone(),
            abstract_text: item.abstract_text.clone(),
            url: target.clone(),
            doi: item.doi.clone(),
            ..Default::default()
        };

        let status = match acquired {
            Acquired::Complete { text, strategy } => {
                article.text = Some(text);
                article.extraction_strategy = Some(strategy);
                report.succeeded += 1;
                ImportStatus::Success
            }
            Acquired::Partial { text, reason } => {
                article.text = Some(text);
                report.partial += 1;
                report
                    .failures
                    .push(issue(title, target.as_deref(), &reason, ImportStatus::Partial));
                article.import_error = Some(reason);
                ImportStatus::Partial
            }
            Acquired::Failed {
                reason,
                http_status,
            } => {
                report.failed += 1;
                let mut failure = issue(title, target.as_deref(), &reason, ImportStatus::Failed);
                failure.http_status = http_status;
                report.failures.push(failure);
                article.import_error = Some(reason);
                ImportStatus::Failed
            }
        };
        article.import_status = Some(status);

        self.store.append(article)?;
        info!(title, status = %status, "article imported");
        Ok(status)
    }

    /// Static extraction first; a rendered page only when the static text
    /// is too short.
    async fn acquire_text(
        &self,
        url: &str,
        cookies: Option<&str>,
        session: &mut dyn RenderSession,
    ) -> Acquired {
        let static_best = match self.extractor.extract(url, cookies).await {
            Ok(extraction) => {
                return Acquired::Complete {
                    text: extraction.text,
                    strategy: extraction.strategy,
                }
            }
            Err(ExtractionFailure::ContentTooShort { best, .. }) => best,
            Err(e) => {
                warn!(url, reason = e.reason(), error = %e, "extraction failed");
                return Acquired::Failed {
                    reason: e.to_string(),
                    http_status: e.http_status(),
                };
            }
        };

        info!(url, chars = static_best.chars().count(), "static text too short; rendering");
        let (rendered_best, reason) = match session.render(url, self.render_timeout_secs).await {
            Ok(page) => match self.extractor.extract_html(&page.html) {
                Ok(extraction) => {
                    return Acquired::Complete {
                        text: extraction.text,
                        strategy: format!("rendered:{}", extraction.strategy),
                    }
                }
                Err(ExtractionFailure::ContentTooShort { best, .. }) => {
                    (best, "content-too-short".to_string())
                }
                Err(e) => (String::new(), e.to_string()),
            },
            Err(e) => {
                warn!(url, reason = e.reason(), error = %e, "render failed");
                (String::new(), format!("content-too-short; {}", e.reason()))
            }
        };

        let best = if rendered_best.chars().count() > static_best.chars().count() {
            rendered_best
        } else {
            static_best
        };
        if best.trim().is_empty() {
            Acquired::Failed {
                reason,
                http_status: None,
            }
        } else {
            Acquired::Partial { text: best, reason }
        }
    }

    /// Probe the bibliography API with a one-item page.
    pub async fn validate_cookies(
        &self,
        endpoint: &str,
        collection_id: &str,
        cookies: Option<&str>,
    ) -> CookieCheck {
        let result = self
            .source
            .fetch_page(&PageRequest {
                endpoint,
                collection_id,
                offset: 0,
                size: 1,
                cookies,
            })
            .await;

        match result {
            Ok(items) => CookieCheck {
                ok: true,
                status: "valid".to_string(),
                items: items.len(),
                message: None,
            },
            Err(e @ BibliographyError::Unauthorized(_)) => CookieCheck {
                ok: false,
                status: "rejected".to_string(),
                items: 0,
                message: Some(e.to_string()),
            },
            Err(e) => CookieCheck {
                ok: false,
                status: "error".to_string(),
                items: 0,
                message: Some(e.to_string()),
            },
        }
    }

    /// Retry extraction for stored articles that have a URL but no text.
    /// Articles are updated in place; nothing is appended and the cursor is
    /// untouched.
    pub async fn rescan(&self, cookies: Option<&str>) -> Result<BatchReport, ImportError> {
        let candidates: Vec<_> = self
            .store
            .load()?
            .into_iter()
            .filter(|a| a.url.is_some() && !a.has_text())
            .collect();

        info!(candidates = candidates.len(), "rescan started");
        let total = candidates.len() as u64;
        let mut report = BatchReport {
            fetched: candidates.len(),
            ..Default::default()
        };
        let mut session = self.renderer.open_session();

        for (i, mut article) in candidates.into_iter().enumerate() {
            let Some(url) = article.url.clone() else {
                continue;
            };
            // Manually entered articles keep `import_status` unset.
            let imported = article.import_status.is_some();
            let status = match self.acquire_text(&url, cookies, session.as_mut()).await {
                Acquired::Complete { text, strategy } => {
                    article.text = Some(text);
                    article.extraction_strategy = Some(strategy);
                    if imported {
                        article.import_error = None;
                    }
                    report.succeeded += 1;
                    ImportStatus::Success
                }
                Acquired::Partial { text, reason } => {
                    article.text = Some(text);
                    report
                        .failures
                        .push(issue(&article.title, Some(url.as_str()), &reason, ImportStatus::Partial));
                    if imported {
                        article.import_error = Some(reason);
                    }
                    report.partial += 1;
                    ImportStatus::Partial
                }
                Acquired::Failed {
                    reason,
                    http_status,
                } => {
                    let mut failure =
                        issue(&article.title, Some(url.as_str()), &reason, ImportStatus::Failed);
                    failure.http_status = http_status;
                    report.failures.push(failure);
                    if imported {
                        article.import_error = Some(reason);
                    }
                    report.failed += 1;
                    ImportStatus::Failed
                }
            };
            if imported {
                article.import_status = Some(status);
            }
            self.store.update(&article)?;

            self.progress.report(ImportProgressEvent::Item {
                n: i as u64 + 1,
                total,
                title: article.title.clone(),
                outcome: ItemOutcome::Imported(status),
            });
        }

        info!(
            succeeded = report.succeeded,
            partial = report.partial,
            failed = report.failed,
            "rescan finished"
        );
        Ok(report)
    }
}

// ============ CLI entry points ============

/// Cookie header for CLI commands: `--cookies` wins over `--cookies-file`.
pub fn read_cookies(inline: Option<String>, file: Option<&Path>) -> anyhow::Result<Option<String>> {
    if let Some(c) = inline.filter(|c| !c.trim().is_empty()) {
        return Ok(Some(c.trim().to_string()));
    }
    match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read cookies file: {}", path.display()))?;
            let content = content.trim();
            Ok((!content.is_empty()).then(|| content.to_string()))
        }
        None => Ok(None),
    }
}

fn bibliography_config(config: &Config) -> anyhow::Result<&BibliographyConfig> {
    config
        .bibliography
        .as_ref()
        .context("No [bibliography] section in config; set endpoint and collection_id")
}

pub async fn run_import_next(
    config: &Config,
    size: Option<u64>,
    offset: Option<u64>,
    cookies: Option<String>,
    progress: ProgressMode,
) -> anyhow::Result<()> {
    let bib = bibliography_config(config)?;
    let runner = ImportRunner::from_config(config)?.with_progress(progress.reporter());
    let request = BatchRequest {
        collection_id: bib.collection_id.clone(),
        endpoint: bib.endpoint.clone(),
        cookies,
        offset,
        size: size.unwrap_or(bib.batch_size),
    };

    let report = runner.run_batch(&request).await?;
    print_report("import", &report);
    println!("  cursor: {} -> {}", report.offset, report.next_offset);
    if report.fetched == 0 {
        println!("  collection exhausted (run `shelf import reset` to start over)");
    }
    println!("ok");
    Ok(())
}

pub async fn run_rescan(
    config: &Config,
    cookies: Option<String>,
    progress: ProgressMode,
) -> anyhow::Result<()> {
    let runner = ImportRunner::from_config(config)?.with_progress(progress.reporter());
    let report = runner.rescan(cookies.as_deref()).await?;
    print_report("rescan", &report);
    println!("ok");
    Ok(())
}

pub fn run_import_status(config: &Config) -> anyhow::Result<()> {
    let cursor = ImportCursor::new(config.store.cursor_path());
    let state = cursor.state()?;
    println!("import cursor");
    println!("  offset: {}", state.offset);
    match state.updated_at {
        Some(ts) => println!("  updated: {}", ts.format("%Y-%m-%dT%H:%M:%SZ")),
        None => println!("  updated: never"),
    }
    println!("  file: {}", cursor.path().display());
    Ok(())
}

pub fn run_import_reset(config: &Config) -> anyhow::Result<()> {
    ImportCursor::new(config.store.cursor_path()).reset()?;
    println!("Import cursor reset to 0.");
    Ok(())
}

pub async fn run_validate_cookies(config: &Config, cookies: Option<String>) -> anyhow::Result<()> {
    let bib = bibliography_config(config)?;
    let runner = ImportRunner::from_config(config)?;
    let check = runner
        .validate_cookies(&bib.endpoint, &bib.collection_id, cookies.as_deref())
        .await;
    println!("cookies {}", check.status);
    if let Some(ref msg) = check.message {
        println!("  {}", msg);
    }
    if !check.ok {
        anyhow::bail!("cookie validation failed");
    }
    Ok(())
}

fn print_report(label: &str, report: &BatchReport) {
    println!("{}", label);
    println!("  fetched: {}", report.fetched);
    println!("  succeeded: {}", report.succeeded);
    println!("  partial: {}", report.partial);
    println!("  failed: {}", report.failed);
    println!("  skipped: {}", report.skipped);
    if !report.failures.is_empty() {
        println!("  issues:");
        for f in &report.failures {
            println!(
                "    [{}] {} ({}): {}",
                f.status,
                f.title,
                f.domain.as_deref().unwrap_or("no url"),
                f.reason
            );
        }
    }
}

fn issue(title: &str, url: Option<&str>, reason: &str, status: ImportStatus) -> ImportIssue {
    ImportIssue {
        title: title.to_string(),
        domain: url.and_then(domain_of),
        reason: reason.to_string(),
        status,
        http_status: None,
    }
}

/// Host of a URL without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}
