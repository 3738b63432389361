//! HTTP JSON API.
//!
//! Exposes the same operations as the CLI so a browser front end (or
//! `curl`) can drive the library.
//!
//! # Endpoints
//!
//! | Method   | Path                | Description |
//! |----------|---------------------|-------------|
//! | `GET`    | `/health`           | Health check (returns version) |
//! | `GET`    | `/articles`         | All stored articles |
//! | `POST`   | `/articles`         | Add an article by hand |
//! | `GET`    | `/articles/{id}`    | One article |
//! | `DELETE` | `/articles/{id}`    | Delete an article |
//! | `POST`   | `/import/next`      | Import the next bibliography batch |
//! | `POST`   | `/import/reset`     | Rewind the import cursor to 0 |
//! | `GET`    | `/import/status`    | Cursor state |
//! | `POST`   | `/import/rescan`    | Retry extraction for articles without text |
//! | `POST`   | `/cookies/validate` | Probe the bibliography API with cookies |
//! | `POST`   | `/search`           | TF-IDF search |
//! | `POST`   | `/analyze`          | Search, then ask the language model |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "title is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `no_credential`
//! (401), `rate_limited` (429), `corrupt_store` (500), `internal` (500),
//! `upstream_error` (502).
//!
//! # Concurrency
//!
//! Every handler that writes the store, the cursor, or calls out to a
//! remote service takes the same async mutex, so actions run one at a time
//! in arrival order. Plain reads do not wait.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::analysis::AnalysisClient;
use crate::config::Config;
use crate::cursor::CursorState;
use crate::errors::{AnalysisFailure, BibliographyError, ImportError, StoreError};
use crate::import::{BatchRequest, CookieCheck, ImportRunner};
use crate::models::{Article, BatchReport, NewArticle, SearchHit};
use crate::search::rank;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    runner: Arc<ImportRunner>,
    analysis: Arc<AnalysisClient>,
    /// Serializes mutating and long-running actions.
    busy: Arc<Mutex<()>>,
}

/// Starts the HTTP server on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let runner = ImportRunner::from_config(config)?;
    let analysis = AnalysisClient::new(&config.analysis)?;
    let app = router(config.clone(), runner, analysis);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("Article Shelf listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router. Split out so tests can serve it on an
/// ephemeral port with their own runner.
pub fn router(config: Config, runner: ImportRunner, analysis: AnalysisClient) -> Router {
    let state = AppState {
        config: Arc::new(config),
        runner: Arc::new(runner),
        analysis: Arc::new(analysis),
        busy: Arc::new(Mutex::new(())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/articles", get(handle_list).post(handle_add))
        .route("/articles/{id}", get(handle_get).delete(handle_delete))
        .route("/import/next", post(handle_import_next))
        .route("/import/reset", post(handle_import_reset))
        .route("/import/status", get(handle_import_status))
        .route("/import/rescan", post(handle_rescan))
        .route("/cookies/validate", post(handle_validate_cookies))
        .route("/search", post(handle_search))
        .route("/analyze", post(handle_analyze))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Corrupt { .. } => {
                app_error(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_store", e.to_string())
            }
            StoreError::Invalid(_) => bad_request(e.to_string()),
            StoreError::Io { .. } => {
                app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
            }
        }
    }
}

impl From<ImportError> for AppError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Store(inner) => inner.into(),
            ImportError::InvalidRequest(_) => bad_request(e.to_string()),
            ImportError::Bibliography(BibliographyError::Unauthorized(_)) => app_error(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                format!("{}; refresh the session cookies", e),
            ),
            ImportError::Bibliography(_) => {
                app_error(StatusCode::BAD_GATEWAY, "upstream_error", e.to_string())
            }
        }
    }
}

impl From<AnalysisFailure> for AppError {
    fn from(e: AnalysisFailure) -> Self {
        match e {
            AnalysisFailure::NoCredential | AnalysisFailure::InvalidCredential(_) => {
                app_error(StatusCode::UNAUTHORIZED, "no_credential", e.to_string())
            }
            AnalysisFailure::RateLimited(_) => {
                app_error(StatusCode::TOO_MANY_REQUESTS, "rate_limited", e.to_string())
            }
            _ => app_error(StatusCode::BAD_GATEWAY, "upstream_error", e.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /articles ============

async fn handle_list(State(state): State<AppState>) -> Result<Json<Vec<Article>>, AppError> {
    Ok(Json(state.runner.store().load()?))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Article>, AppError> {
    state
        .runner
        .store()
        .get(&id)?
        .map(Json)
        .ok_or_else(|| not_found(format!("article not found: {}", id)))
}

/// Body of `POST /articles`: the manual-entry form.
#[derive(Deserialize)]
struct AddRequest {
    title: String,
    /// Comma-separated.
    #[serde(default)]
    authors: String,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

async fn handle_add(
    State(state): State<AppState>,
    Json(req): Json<AddRequest>,
) -> Result<(StatusCode, Json<Article>), AppError> {
    let _guard = state.busy.lock().await;
    let new = NewArticle::manual(&req.title, &req.authors, req.abstract_text, req.url, req.text);
    let article = state.runner.store().append(new)?;
    info!(id = %article.id, "article added");
    Ok((StatusCode::CREATED, Json(article)))
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let _guard = state.busy.lock().await;
    if state.runner.store().delete(&id)? {
        Ok(Json(DeleteResponse { deleted: true }))
    } else {
        Err(not_found(format!("article not found: {}", id)))
    }
}

// ============ /import ============

#[derive(Deserialize, Default)]
struct ImportNextRequest {
    #[serde(default)]
    cookies: Option<String>,
    #[serde(default)]
    offset: Option<u64>,
    #[serde(default)]
    size: Option<u64>,
}

async fn handle_import_next(
    State(state): State<AppState>,
    body: Option<Json<ImportNextRequest>>,
) -> Result<Json<BatchReport>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let bib = state
        .config
        .bibliography
        .as_ref()
        .ok_or_else(|| bad_request("no [bibliography] section in config"))?;

    let request = BatchRequest {
        collection_id: bib.collection_id.clone(),
        endpoint: bib.endpoint.clone(),
        cookies: req.cookies,
        offset: req.offset,
        size: req.size.unwrap_or(bib.batch_size),
    };

    let _guard = state.busy.lock().await;
    let report = state.runner.run_batch(&request).await.inspect_err(|e| {
        warn!(error = %e, "import batch failed");
    })?;
    Ok(Json(report))
}

async fn handle_import_reset(State(state): State<AppState>) -> Result<Json<CursorState>, AppError> {
    let _guard = state.busy.lock().await;
    state.runner.cursor().reset()?;
    Ok(Json(state.runner.cursor().state()?))
}

async fn handle_import_status(State(state): State<AppState>) -> Result<Json<CursorState>, AppError> {
    Ok(Json(state.runner.cursor().state()?))
}

#[derive(Deserialize, Default)]
struct CookiesRequest {
    #[serde(default)]
    cookies: Option<String>,
}

async fn handle_rescan(
    State(state): State<AppState>,
    body: Option<Json<CookiesRequest>>,
) -> Result<Json<BatchReport>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let _guard = state.busy.lock().await;
    Ok(Json(state.runner.rescan(req.cookies.as_deref()).await?))
}

async fn handle_validate_cookies(
    State(state): State<AppState>,
    body: Option<Json<CookiesRequest>>,
) -> Result<Json<CookieCheck>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let bib = state
        .config
        .bibliography
        .as_ref()
        .ok_or_else(|| bad_request("no [bibliography] section in config"))?;
    let _guard = state.busy.lock().await;
    let check = state
        .runner
        .validate_cookies(&bib.endpoint, &bib.collection_id, req.cookies.as_deref())
        .await;
    Ok(Json(check))
}

// ============ /search, /analyze ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = search_hits(&state, &req)?;
    Ok(Json(SearchResponse { results }))
}

#[derive(Serialize)]
struct AnalyzeResponse {
    answer: String,
    results: Vec<SearchHit>,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let results = search_hits(&state, &req)?;
    if results.is_empty() {
        return Err(not_found("no articles match the query"));
    }
    let _guard = state.busy.lock().await;
    let answer = state.analysis.analyze(&req.query, &results).await?;
    Ok(Json(AnalyzeResponse { answer, results }))
}

fn search_hits(state: &AppState, req: &SearchRequest) -> Result<Vec<SearchHit>, AppError> {
    let k = req.k.unwrap_or(state.config.retrieval.default_k);
    let articles = state.runner.store().load()?;
    Ok(rank(&req.query, &articles, k))
}
