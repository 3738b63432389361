//! In-process stand-ins for the bibliography API, article pages, the chat
//! completion endpoint, and the headless browser.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use article_shelf::errors::RenderFailure;
use article_shelf::render::RenderedPage;
use article_shelf::traits::{PageRenderer, RenderSession};

pub const GOOD_COOKIE: &str = "session=letmein";

/// Behavior of the mock site.
#[derive(Clone, Default)]
pub struct MockSite {
    /// Number of items in the collection.
    pub total: usize,
    /// Item pages answering 404.
    pub missing: Vec<usize>,
    /// Item pages whose static HTML is a JavaScript shell.
    pub js_only: Vec<usize>,
    /// When set, the bibliography API answers 401 to any other cookie.
    pub require_cookie: bool,
}

struct SiteState {
    site: MockSite,
    base: String,
    api_hits: AtomicUsize,
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    size: Option<usize>,
    #[serde(default)]
    collection_id: Option<String>,
}

pub struct RunningSite {
    pub base: String,
    state: Arc<SiteState>,
}

impl RunningSite {
    pub fn endpoint(&self) -> String {
        format!("{}/api/items", self.base)
    }

    pub fn api_hits(&self) -> usize {
        self.state.api_hits.load(Ordering::SeqCst)
    }
}

pub fn article_body(n: usize) -> String {
    let sentence = format!("Paper {} studies metabolic engineering of yeast strains. ", n);
    sentence.repeat(12)
}

/// Serve the mock site on an ephemeral port.
pub async fn start_site(site: MockSite) -> RunningSite {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let state = Arc::new(SiteState {
        site,
        base: base.clone(),
        api_hits: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/api/items", get(items))
        .route("/page/{n}", get(page))
        .route("/private", get(private_page))
        .route("/v1/chat/completions", post(completion))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    RunningSite { base, state }
}

async fn items(
    State(state): State<Arc<SiteState>>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> Response {
    state.api_hits.fetch_add(1, Ordering::SeqCst);
    if state.site.require_cookie {
        let cookie = headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if cookie != GOOD_COOKIE {
            return (StatusCode::UNAUTHORIZED, "login required").into_response();
        }
    }
    assert_eq!(q.collection_id.as_deref(), Some("biofoundry"));

    let size = q.size.unwrap_or(10);
    let items: Vec<serde_json::Value> = (q.offset..state.site.total)
        .take(size)
        .map(|n| {
            serde_json::json!({
                "title": format!("Paper {}", n),
                "authors": [{"given": "Ada", "family": format!("Author{}", n)}],
                "abstract": format!("Abstract of paper {}", n),
                "url": format!("{}/page/{}", state.base, n),
            })
        })
        .collect();

    Json(serde_json::json!({ "total": state.site.total, "results": items })).into_response()
}

async fn page(State(state): State<Arc<SiteState>>, Path(n): Path<usize>) -> Response {
    if state.site.missing.contains(&n) {
        return (StatusCode::NOT_FOUND, "not here").into_response();
    }
    if state.site.js_only.contains(&n) {
        return Html("<html><body><div id=\"app\">Loading…</div><script>render()</script></body></html>")
            .into_response();
    }
    Html(format!(
        "<html><head><title>Paper {n}</title></head><body><nav>Home | About</nav>\
         <article><h1>Paper {n}</h1><p>{}</p></article></body></html>",
        article_body(n)
    ))
    .into_response()
}

async fn private_page(headers: HeaderMap) -> Response {
    let cookie = headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if cookie != GOOD_COOKIE {
        return (StatusCode::UNAUTHORIZED, "login required").into_response();
    }
    Html(format!(
        "<html><body><main><p>{}</p></main></body></html>",
        article_body(99)
    ))
    .into_response()
}

async fn completion(headers: HeaderMap) -> Response {
    if headers.get("authorization").is_none() {
        return (StatusCode::UNAUTHORIZED, "no key").into_response();
    }
    Json(serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": "Yeast dominates the collection."}}]
    }))
    .into_response()
}

/// Browser stand-in that returns a full article for any URL.
#[derive(Clone, Default)]
pub struct FakeRenderer {
    pub sessions: Arc<AtomicUsize>,
    pub renders: Arc<AtomicUsize>,
}

struct FakeSession {
    renders: Arc<AtomicUsize>,
}

impl PageRenderer for FakeRenderer {
    fn open_session(&self) -> Box<dyn RenderSession> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeSession {
            renders: self.renders.clone(),
        })
    }
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn render(&mut self, url: &str, _timeout_secs: u64) -> Result<RenderedPage, RenderFailure> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(RenderedPage {
            url: url.to_string(),
            html: format!(
                "<html><body><article><p>{}</p></article></body></html>",
                article_body(1000)
            ),
        })
    }
}
