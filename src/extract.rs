//! Article text extraction.
//!
//! [`ContentExtractor`] fetches a URL once (passing session cookies through
//! verbatim) and turns the response into plain text. HTML goes through an
//! ordered list of [`Strategy`] heuristics; the first one that clears the
//! minimum length wins. PDF bodies are handled by `pdf-extract`.
//!
//! The extractor never retries. Whether to fall back to a rendered page is
//! the import runner's decision.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;

use crate::config::{Config, ExtractionConfig};
use crate::errors::ExtractionFailure;
use crate::traits::PageExtractor;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_HTML: &str = "text/html";
pub const MIME_XHTML: &str = "application/xhtml+xml";
pub const MIME_TEXT: &str = "text/plain";

/// Elements whose text never counts as article content.
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Text extracted from one page, plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub strategy: String,
    pub content_type: String,
}

/// One HTML heuristic. Returns candidate text, or `None` when the page has
/// nothing the heuristic recognizes.
pub struct Strategy {
    pub name: &'static str,
    pub run: fn(&Html) -> Option<String>,
}

/// HTML strategies in priority order.
pub const HTML_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "article-tag",
        run: article_tag,
    },
    Strategy {
        name: "main-tag",
        run: main_tag,
    },
    Strategy {
        name: "largest-block",
        run: largest_block,
    },
    Strategy {
        name: "paragraphs",
        run: paragraphs,
    },
];

fn article_tag(doc: &Html) -> Option<String> {
    first_match(doc, "article")
}

fn main_tag(doc: &Html) -> Option<String> {
    first_match(doc, "main").or_else(|| first_match(doc, "[role='main']"))
}

fn largest_block(doc: &Html) -> Option<String> {
    let selector = Selector::parse("div, section, article, main").ok()?;
    doc.select(&selector)
        .map(|el| element_text(el, "\n"))
        .max_by_key(|t| t.chars().count())
        .filter(|t| !t.is_empty())
}

fn paragraphs(doc: &Html) -> Option<String> {
    let selector = Selector::parse("p").ok()?;
    let paras: Vec<String> = doc
        .select(&selector)
        .map(|el| element_text(el, " "))
        .filter(|t| !t.is_empty())
        .collect();
    if paras.is_empty() {
        None
    } else {
        Some(paras.join("\n\n"))
    }
}

fn first_match(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector)
        .next()
        .map(|el| element_text(el, "\n"))
        .filter(|t| !t.is_empty())
}

/// Visible text of an element: trimmed text nodes joined by `sep`, with
/// script/style content dropped.
fn element_text(el: ElementRef<'_>, sep: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIP_TAGS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let t = text.trim();
        if !t.is_empty() {
            parts.push(t);
        }
    }
    parts.join(sep)
}

/// Run the strategy chain over an HTML document.
pub fn extract_from_html(html: &str, min_chars: usize) -> Result<Extraction, ExtractionFailure> {
    let doc = Html::parse_document(html);
    let mut best = String::new();

    for strategy in HTML_STRATEGIES {
        let Some(candidate) = (strategy.run)(&doc) else {
            continue;
        };
        let chars = candidate.chars().count();
        debug!(strategy = strategy.name, chars, "extraction candidate");
        if chars > min_chars {
            return Ok(Extraction {
                text: candidate,
                strategy: strategy.name.to_string(),
                content_type: MIME_HTML.to_string(),
            });
        }
        if chars > best.chars().count() {
            best = candidate;
        }
    }

    Err(too_short(best))
}

/// Extract text from a fetched body according to its content type.
pub fn extract_text(
    bytes: &[u8],
    content_type: &str,
    url: &str,
    min_chars: usize,
) -> Result<Extraction, ExtractionFailure> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if mime == MIME_PDF || bytes.starts_with(b"%PDF") || url.to_lowercase().ends_with(".pdf") {
        let text = extract_pdf_text(bytes)?;
        return check_length(text, "pdf", MIME_PDF, min_chars);
    }

    let body = String::from_utf8_lossy(bytes);

    if mime == MIME_HTML || mime == MIME_XHTML || (mime.is_empty() && looks_like_markup(&body)) {
        return extract_from_html(&body, min_chars);
    }

    if mime == MIME_TEXT {
        let text = body.trim().to_string();
        return check_length(text, "plain-text", MIME_TEXT, min_chars);
    }

    Err(ExtractionFailure::UnsupportedContentType(
        if mime.is_empty() {
            "(none)".to_string()
        } else {
            mime
        },
    ))
}

pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractionFailure> {
    pdf_extract::extract_text_from_mem(bytes)
        .map(|t| t.trim().to_string())
        .map_err(|e| ExtractionFailure::Pdf(e.to_string()))
}

fn check_length(
    text: String,
    strategy: &str,
    content_type: &str,
    min_chars: usize,
) -> Result<Extraction, ExtractionFailure> {
    if text.chars().count() > min_chars {
        Ok(Extraction {
            text,
            strategy: strategy.to_string(),
            content_type: content_type.to_string(),
        })
    } else {
        Err(too_short(text))
    }
}

fn too_short(best: String) -> ExtractionFailure {
    ExtractionFailure::ContentTooShort {
        chars: best.chars().count(),
        best,
    }
}

fn looks_like_markup(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with('<')
}

/// HTTP-backed extractor.
pub struct ContentExtractor {
    client: reqwest::Client,
    min_chars: usize,
}

impl ContentExtractor {
    pub fn new(config: &ExtractionConfig) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/pdf;q=0.9,*/*;q=0.8",
            ),
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            min_chars: config.min_chars,
        })
    }

    /// Fetch `url` once and extract its text.
    pub async fn extract(
        &self,
        url: &str,
        cookies: Option<&str>,
    ) -> Result<Extraction, ExtractionFailure> {
        let mut req = self.client.get(url);
        if let Some(cookie) = cookies.map(str::trim).filter(|c| !c.is_empty()) {
            req = req.header(reqwest::header::COOKIE, cookie);
        }

        let resp = req.send().await.map_err(classify_transport)?;
        let status = resp.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "fetch rejected");
            return Err(ExtractionFailure::Http {
                status: status.as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = resp.bytes().await.map_err(classify_transport)?;

        extract_text(&bytes, &content_type, url, self.min_chars)
    }
}

fn classify_transport(e: reqwest::Error) -> ExtractionFailure {
    if e.is_timeout() {
        ExtractionFailure::Timeout(e.to_string())
    } else {
        ExtractionFailure::Network(e.to_string())
    }
}

#[async_trait]
impl PageExtractor for ContentExtractor {
    async fn extract(
        &self,
        url: &str,
        cookies: Option<&str>,
    ) -> Result<Extraction, ExtractionFailure> {
        ContentExtractor::extract(self, url, cookies).await
    }

    fn extract_html(&self, html: &str) -> Result<Extraction, ExtractionFailure> {
        extract_from_html(html, self.min_chars)
    }
}

/// CLI entry point: extract one URL and print the text.
pub async fn run_extract(config: &Config, url: &str, cookies: Option<String>) -> anyhow::Result<()> {
    let extractor = ContentExtractor::new(&config.extraction)?;
    let extraction = extractor.extract(url, cookies.as_deref()).await?;
    println!("--- {} ({}, {} chars) ---", url, extraction.strategy, extraction.text.chars().count());
    println!("{}", extraction.text);
    Ok(())
}
