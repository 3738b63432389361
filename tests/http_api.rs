//! HTTP API served on an ephemeral port, backed by the mock site.

mod common;

use serde_json::{json, Value};
use tempfile::TempDir;

use article_shelf::analysis::AnalysisClient;
use article_shelf::bibliography::BibliographyClient;
use article_shelf::config::Config;
use article_shelf::cursor::ImportCursor;
use article_shelf::extract::ContentExtractor;
use article_shelf::import::ImportRunner;
use article_shelf::server::router;
use article_shelf::store::RecordStore;

use common::{start_site, FakeRenderer, MockSite, RunningSite, GOOD_COOKIE};

struct Api {
    _tmp: TempDir,
    base: String,
    client: reqwest::Client,
}

async fn start_api(site: &RunningSite) -> Api {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    std::fs::write(root.join("secrets.toml"), "openai_api_key = \"sk-test\"\n").unwrap();

    let config: Config = toml::from_str(&format!(
        r#"
[store]
path = "{root}/articles.json"

[bibliography]
endpoint = "{endpoint}"
collection_id = "biofoundry"
batch_size = 4

[analysis]
endpoint = "{base}/v1/chat/completions"
secrets_path = "{root}/secrets.toml"
"#,
        root = root.display(),
        endpoint = site.endpoint(),
        base = site.base,
    ))
    .unwrap();

    let runner = ImportRunner::new(
        RecordStore::new(&config.store.path),
        ImportCursor::new(config.store.cursor_path()),
        Box::new(BibliographyClient::new(5).unwrap()),
        Box::new(ContentExtractor::new(&config.extraction).unwrap()),
        Box::new(FakeRenderer::default()),
        5,
    );
    let analysis = AnalysisClient::new(&config.analysis).unwrap();
    let app = router(config, runner, analysis);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Api {
        _tmp: tmp,
        base,
        client: reqwest::Client::new(),
    }
}

impl Api {
    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .delete(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn health() {
    let site = start_site(MockSite::default()).await;
    let api = start_api(&site).await;
    let (status, body) = api.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn article_crud() {
    let site = start_site(MockSite::default()).await;
    let api = start_api(&site).await;

    let (status, created) = api
        .post(
            "/articles",
            json!({"title": "Manual entry", "authors": "A. One, B. Two", "abstract": "Short abstract"}),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(created["authors"], json!(["A. One", "B. Two"]));
    // Text falls back to the abstract.
    assert_eq!(created["text"], "Short abstract");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, list) = api.get("/articles").await;
    assert_eq!(status, 200);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, one) = api.get(&format!("/articles/{}", id)).await;
    assert_eq!(status, 200);
    assert_eq!(one["title"], "Manual entry");

    let (status, err) = api.delete("/articles/does-not-exist").await;
    assert_eq!(status, 404);
    assert_eq!(err["error"]["code"], "not_found");

    let (status, _) = api.delete(&format!("/articles/{}", id)).await;
    assert_eq!(status, 200);
    let (_, list) = api.get("/articles").await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn empty_title_is_bad_request() {
    let site = start_site(MockSite::default()).await;
    let api = start_api(&site).await;
    let (status, err) = api.post("/articles", json!({"title": "   "})).await;
    assert_eq!(status, 400);
    assert_eq!(err["error"]["code"], "bad_request");
}

#[tokio::test]
async fn import_search_and_analyze() {
    let site = start_site(MockSite {
        total: 6,
        missing: vec![3],
        require_cookie: true,
        ..Default::default()
    })
    .await;
    let api = start_api(&site).await;

    let (status, err) = api.post("/import/next", json!({})).await;
    assert_eq!(status, 502);
    assert_eq!(err["error"]["code"], "upstream_error");

    let (status, check) = api
        .post("/cookies/validate", json!({"cookies": GOOD_COOKIE}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(check["ok"], true);

    let (status, report) = api
        .post("/import/next", json!({"cookies": GOOD_COOKIE}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(report["fetched"], 4);
    assert_eq!(report["succeeded"], 3);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["next_offset"], 4);

    let (_, cursor) = api.get("/import/status").await;
    assert_eq!(cursor["offset"], 4);

    let (status, results) = api
        .post("/search", json!({"query": "metabolic yeast", "k": 2}))
        .await;
    assert_eq!(status, 200);
    let hits = results["results"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0]["score"].as_f64().unwrap() >= hits[1]["score"].as_f64().unwrap());

    let (status, analysis) = api
        .post("/analyze", json!({"query": "metabolic yeast"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(analysis["answer"], "Yeast dominates the collection.");

    let (status, cursor) = api.post("/import/reset", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(cursor["offset"], 0);
}

#[tokio::test]
async fn empty_query_searches_to_nothing() {
    let site = start_site(MockSite::default()).await;
    let api = start_api(&site).await;
    let (status, body) = api
        .post("/articles", json!({"title": "Anything", "text": "Some text about yeast."}))
        .await;
    assert_eq!(status, 201, "{}", body);

    let (status, body) = api.post("/search", json!({"query": "  "})).await;
    assert_eq!(status, 200);
    assert!(body["results"].as_array().unwrap().is_empty());

    let (status, err) = api.post("/analyze", json!({"query": "  "})).await;
    assert_eq!(status, 400);
    assert_eq!(err["error"]["code"], "bad_request");
}
