//! Language-model analysis of search results.
//!
//! Builds a bounded text context from the top search hits and sends one
//! chat-completion request to an OpenAI-compatible endpoint. There is no
//! retry: a failed call is reported to the user, who can run it again.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{AnalysisConfig, Config};
use crate::errors::AnalysisFailure;
use crate::models::SearchHit;
use crate::search::{print_hits, rank};
use crate::store::RecordStore;

const API_KEY_ENV: &str = "OPENAI_API_KEY";

const SYSTEM_PROMPT: &str = "You are an expert research analyst. Analyze the provided articles \
and answer the user's query with insights, key findings, and synthesis from the articles.";

const SEPARATOR: &str = "\n\n---\n\n";

/// Secrets file layout. Only the one key is read.
#[derive(Debug, Deserialize)]
struct Secrets {
    openai_api_key: Option<String>,
}

/// Resolve the API key: environment first, then the secrets file.
pub fn resolve_api_key(secrets_path: Option<&Path>) -> Result<String, AnalysisFailure> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }

    let Some(path) = secrets_path else {
        return Err(AnalysisFailure::NoCredential);
    };
    let Ok(content) = std::fs::read_to_string(path) else {
        return Err(AnalysisFailure::NoCredential);
    };
    let secrets: Secrets = toml::from_str(&content).map_err(|_| AnalysisFailure::NoCredential)?;
    secrets
        .openai_api_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or(AnalysisFailure::NoCredential)
}

/// Context block sent to the model, capped at `max_chars` characters.
pub fn build_context(hits: &[SearchHit], max_chars: usize) -> String {
    let blocks: Vec<String> = hits
        .iter()
        .map(|hit| {
            let a = &hit.article;
            let authors = if a.authors.is_empty() {
                "Unknown".to_string()
            } else {
                a.authors.join(", ")
            };
            let body = [&a.text, &a.abstract_text]
                .into_iter()
                .flatten()
                .find(|t| !t.trim().is_empty())
                .map(String::as_str)
                .unwrap_or("No content");
            format!("**{}** by {}\n{}", a.title, authors, body)
        })
        .collect();

    let context = blocks.join(SEPARATOR);
    match context.char_indices().nth(max_chars) {
        Some((idx, _)) => context[..idx].to_string(),
        None => context,
    }
}

pub struct AnalysisClient {
    client: reqwest::Client,
    config: AnalysisConfig,
}

impl AnalysisClient {
    pub fn new(config: &AnalysisConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Ask the model to answer `query` from the given hits.
    pub async fn analyze(&self, query: &str, hits: &[SearchHit]) -> Result<String, AnalysisFailure> {
        let api_key = resolve_api_key(self.config.secrets_path.as_deref())?;
        let context = build_context(hits, self.config.max_context_chars);

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": format!("Query: {}\n\nArticles:\n{}", query, context)},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        debug!(
            model = %self.config.model,
            articles = hits.len(),
            context_chars = context.chars().count(),
            "sending analysis request"
        );

        let resp = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisFailure::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => AnalysisFailure::InvalidCredential(status.as_u16()),
                429 => AnalysisFailure::RateLimited(body_text),
                code => AnalysisFailure::Api {
                    status: code,
                    body: body_text,
                },
            });
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AnalysisFailure::MalformedResponse(e.to_string()))?;
        let answer = parse_completion(&json)?;
        info!(chars = answer.chars().count(), "analysis complete");
        Ok(answer)
    }
}

/// CLI entry point: search, then print the model's answer.
pub async fn run_analyze(config: &Config, query: &str, k: Option<usize>) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("query must not be empty");
    }
    let articles = RecordStore::new(&config.store.path).load()?;
    let hits = rank(query, &articles, k.unwrap_or(config.retrieval.default_k));
    if hits.is_empty() {
        println!("No matching articles; nothing to analyze.");
        return Ok(());
    }
    print_hits(&hits);
    println!();

    let client = AnalysisClient::new(&config.analysis)?;
    let answer = client.analyze(query, &hits).await?;
    println!("--- Analysis ---");
    println!("{}", answer);
    Ok(())
}

/// Pull `choices[0].message.content` out of a chat-completion response.
fn parse_completion(json: &serde_json::Value) -> Result<String, AnalysisFailure> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AnalysisFailure::MalformedResponse("missing choices[0].message.content".to_string())
        })
}
