//! Headless-browser rendering fallback.
//!
//! Used when static extraction finds too little text (pages that build their
//! content with JavaScript). Each render runs Chromium/Chrome in headless
//! mode with `--dump-dom` and returns the settled DOM.
//!
//! A [`BrowserSession`] is the scoped resource for one import batch: it
//! resolves the browser binary and creates a private profile directory on
//! first use, reuses both for every render in the batch, and removes the
//! profile when dropped. Child processes are spawned with kill-on-drop, so a
//! timed-out or abandoned render never leaves a browser running.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::errors::RenderFailure;
use crate::traits::{PageRenderer, RenderSession};

/// Binary names tried on `PATH` when no browser is configured.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Rendered DOM of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
}

/// Renderer backed by a locally installed Chromium.
pub struct ChromiumRenderer {
    config: RenderConfig,
}

impl ChromiumRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl PageRenderer for ChromiumRenderer {
    fn open_session(&self) -> Box<dyn RenderSession> {
        if self.config.enabled {
            Box::new(BrowserSession::new(self.config.clone()))
        } else {
            Box::new(DisabledSession)
        }
    }
}

/// Session used when `[render] enabled = false`.
pub struct DisabledSession;

#[async_trait]
impl RenderSession for DisabledSession {
    async fn render(&mut self, _url: &str, _timeout_secs: u64) -> Result<RenderedPage, RenderFailure> {
        Err(RenderFailure::DriverUnavailable(
            "rendering disabled in config".to_string(),
        ))
    }
}

/// Lazily started browser state for one batch.
pub struct BrowserSession {
    config: RenderConfig,
    started: Option<Started>,
}

struct Started {
    browser: PathBuf,
    profile_dir: PathBuf,
    renders: usize,
}

impl BrowserSession {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            started: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    pub fn profile_dir(&self) -> Option<&Path> {
        self.started.as_ref().map(|s| s.profile_dir.as_path())
    }

    fn ensure_started(&mut self) -> Result<&mut Started, RenderFailure> {
        let started = match self.started.take() {
            Some(s) => s,
            None => start(&self.config)?,
        };
        Ok(self.started.insert(started))
    }
}

fn start(config: &RenderConfig) -> Result<Started, RenderFailure> {
    let browser = resolve_browser(config.browser.as_deref())?;
    let profile_dir = std::env::temp_dir().join(format!("article-shelf-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&profile_dir).map_err(|e| {
        RenderFailure::DriverUnavailable(format!(
            "cannot create browser profile dir {}: {}",
            profile_dir.display(),
            e
        ))
    })?;
    info!(browser = %browser.display(), "browser session started");
    Ok(Started {
        browser,
        profile_dir,
        renders: 0,
    })
}

#[async_trait]
impl RenderSession for BrowserSession {
    async fn render(&mut self, url: &str, timeout_secs: u64) -> Result<RenderedPage, RenderFailure> {
        let started = self.ensure_started()?;
        started.renders += 1;

        let settle_ms = settle_budget_ms(timeout_secs);

        let mut cmd = tokio::process::Command::new(&started.browser);
        cmd.args([
            "--headless=new",
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--no-first-run",
            "--no-default-browser-check",
        ])
        .arg(format!("--user-data-dir={}", started.profile_dir.display()))
        .arg(format!("--virtual-time-budget={}", settle_ms))
        .arg("--dump-dom")
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                RenderFailure::DriverUnavailable(format!(
                    "{}: {}",
                    started.browser.display(),
                    e
                ))
            }
            _ => RenderFailure::Crash(format!("spawn failed: {}", e)),
        })?;

        // Dropping the pending future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(RenderFailure::Crash(e.to_string())),
            Err(_) => {
                warn!(url, timeout_secs, "render timed out");
                return Err(RenderFailure::Timeout(timeout_secs));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderFailure::Crash(format!(
                "{}: {}",
                output.status,
                tail(stderr.trim(), 400)
            )));
        }

        let html = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if html.is_empty() {
            return Err(RenderFailure::EmptyDocument);
        }

        debug!(url, bytes = html.len(), "page rendered");
        Ok(RenderedPage {
            url: url.to_string(),
            html,
        })
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(started) = self.started.take() {
            if let Err(e) = std::fs::remove_dir_all(&started.profile_dir) {
                debug!(error = %e, "failed to remove browser profile dir");
            }
            info!(renders = started.renders, "browser session released");
        }
    }
}

fn resolve_browser(configured: Option<&Path>) -> Result<PathBuf, RenderFailure> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        if path.components().count() == 1 {
            if let Some(found) = find_on_path(&path.to_string_lossy()) {
                return Ok(found);
            }
        }
        return Err(RenderFailure::DriverUnavailable(format!(
            "configured browser not found: {}",
            path.display()
        )));
    }

    BROWSER_CANDIDATES
        .iter()
        .find_map(|name| find_on_path(name))
        .ok_or_else(|| {
            RenderFailure::DriverUnavailable(format!(
                "no browser found on PATH (tried {})",
                BROWSER_CANDIDATES.join(", ")
            ))
        })
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn tail(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    let skip = count - max_chars;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Virtual-time budget for page scripts: two thirds of the deadline, leaving
/// the rest for process startup and DOM serialization.
fn settle_budget_ms(timeout_secs: u64) -> u64 {
    timeout_secs.saturating_mul(1000).saturating_mul(2) / 3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(browser: PathBuf) -> RenderConfig {
        RenderConfig {
            enabled: true,
            browser: Some(browser),
            timeout_secs: 15,
        }
    }

    #[test]
    fn settle_budget_saturates() {
        assert_eq!(settle_budget_ms(15), 10_000);
        assert_eq!(settle_budget_ms(0), 0);
        assert_eq!(settle_budget_ms(u64::MAX), u64::MAX / 3);
    }

    #[tokio::test]
    async fn missing_browser_is_driver_unavailable() {
        let mut session = BrowserSession::new(config_with(PathBuf::from(
            "/nonexistent/dir/chromium-for-tests",
        )));
        let err = session.render("http://example.org", 5).await.unwrap_err();
        assert!(matches!(err, RenderFailure::DriverUnavailable(_)));
        assert!(!session.is_started());
    }

    #[tokio::test]
    async fn disabled_session_reports_driver_unavailable() {
        let renderer = ChromiumRenderer::new(&RenderConfig {
            enabled: false,
            browser: None,
            timeout_secs: 15,
        });
        let mut session = renderer.open_session();
        let err = session.render("http://example.org", 5).await.unwrap_err();
        assert_eq!(err.reason(), "driver-unavailable");
    }

    #[test]
    fn tail_keeps_last_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("ééé", 2), "éé");
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// Stand-in "browser": a shell script with the given body.
        fn fake_browser(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("fake-chromium");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[tokio::test]
        async fn dumps_dom_and_releases_profile() {
            let dir = TempDir::new().unwrap();
            let browser = fake_browser(&dir, "echo '<html><body><article>rendered</article></body></html>'");
            let mut session = BrowserSession::new(config_with(browser));

            let page = session.render("http://example.org/a", 5).await.unwrap();
            assert!(page.html.contains("rendered"));
            let profile = session.profile_dir().unwrap().to_path_buf();
            assert!(profile.exists());

            // Reused for the second render.
            session.render("http://example.org/b", 5).await.unwrap();
            assert_eq!(session.profile_dir().unwrap(), profile.as_path());

            drop(session);
            assert!(!profile.exists());
        }

        #[tokio::test]
        async fn nonzero_exit_is_crash() {
            let dir = TempDir::new().unwrap();
            let browser = fake_browser(&dir, "echo 'out of memory' >&2\nexit 3");
            let mut session = BrowserSession::new(config_with(browser));
            let err = session.render("http://example.org", 5).await.unwrap_err();
            match err {
                RenderFailure::Crash(msg) => assert!(msg.contains("out of memory")),
                other => panic!("expected crash, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn slow_browser_times_out() {
            let dir = TempDir::new().unwrap();
            let browser = fake_browser(&dir, "sleep 10");
            let mut session = BrowserSession::new(config_with(browser));
            let err = session.render("http://example.org", 1).await.unwrap_err();
            assert_eq!(err, RenderFailure::Timeout(1));
        }

        #[tokio::test]
        async fn empty_output_is_empty_document() {
            let dir = TempDir::new().unwrap();
            let browser = fake_browser(&dir, "exit 0");
            let mut session = BrowserSession::new(config_with(browser));
            let err = session.render("http://example.org", 5).await.unwrap_err();
            assert_eq!(err, RenderFailure::EmptyDocument);
        }
    }
}
