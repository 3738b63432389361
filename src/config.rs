//! TOML configuration parsing and validation.
//!
//! Every command reads a single file (default `./config/shelf.toml`). All
//! sections except `[store]` are optional and fall back to the defaults below.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub bibliography: Option<BibliographyConfig>,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Where the import offset cursor lives. Defaults to
    /// `import_cursor.json` next to the store file.
    #[serde(default)]
    pub cursor_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn cursor_path(&self) -> PathBuf {
        match &self.cursor_path {
            Some(p) => p.clone(),
            None => self
                .path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("import_cursor.json"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BibliographyConfig {
    pub endpoint: String,
    pub collection_id: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_bibliography_timeout")]
    pub timeout_secs: u64,
}

fn default_batch_size() -> u64 {
    10
}
fn default_bibliography_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            timeout_secs: default_extraction_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_min_chars() -> usize {
    200
}
fn default_extraction_timeout() -> u64 {
    20
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit browser binary. When unset, well-known Chromium/Chrome
    /// names are searched on `PATH`.
    #[serde(default)]
    pub browser: Option<PathBuf>,
    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            browser: None,
            timeout_secs: default_render_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_render_timeout() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_analysis_model")]
    pub model: String,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_analysis_timeout")]
    pub timeout_secs: u64,
    /// TOML file holding `openai_api_key`, consulted when the
    /// `OPENAI_API_KEY` environment variable is not set.
    #[serde(default)]
    pub secrets_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: default_analysis_endpoint(),
            model: default_analysis_model(),
            max_context_chars: default_max_context_chars(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_analysis_timeout(),
            secrets_path: None,
        }
    }
}

fn default_analysis_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_analysis_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_context_chars() -> usize {
    12_000
}
fn default_max_tokens() -> u32 {
    1500
}
fn default_temperature() -> f32 {
    0.7
}
fn default_analysis_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
        }
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Defaults for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            store: StoreConfig {
                path: PathBuf::from("data/articles.json"),
                cursor_path: None,
            },
            bibliography: None,
            extraction: ExtractionConfig::default(),
            render: RenderConfig::default(),
            analysis: AnalysisConfig::default(),
            retrieval: RetrievalConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

const MAX_RENDER_TIMEOUT_SECS: u64 = 600;

fn validate(config: &Config) -> Result<()> {
    if config.store.path.as_os_str().is_empty() {
        anyhow::bail!("store.path must not be empty");
    }

    if let Some(bib) = &config.bibliography {
        if bib.endpoint.trim().is_empty() {
            anyhow::bail!("bibliography.endpoint must not be empty");
        }
        if bib.batch_size == 0 {
            anyhow::bail!("bibliography.batch_size must be > 0");
        }
    }

    if config.extraction.min_chars == 0 {
        anyhow::bail!("extraction.min_chars must be > 0");
    }

    if config.render.timeout_secs == 0 || config.render.timeout_secs > MAX_RENDER_TIMEOUT_SECS {
        anyhow::bail!(
            "render.timeout_secs must be in 1..={}",
            MAX_RENDER_TIMEOUT_SECS
        );
    }

    if config.analysis.max_context_chars == 0 {
        anyhow::bail!("analysis.max_context_chars must be > 0");
    }

    if !(0.0..=2.0).contains(&config.analysis.temperature) {
        anyhow::bail!("analysis.temperature must be in [0.0, 2.0]");
    }

    if config.retrieval.default_k == 0 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_gets_defaults() {
        let cfg: Config = toml::from_str("[store]\npath = \"data/a.json\"\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.extraction.min_chars, 200);
        assert_eq!(cfg.render.timeout_secs, 15);
        assert_eq!(cfg.retrieval.default_k, 5);
        assert!(cfg.bibliography.is_none());
        assert_eq!(
            cfg.store.cursor_path(),
            PathBuf::from("data/import_cursor.json")
        );
    }

    #[test]
    fn zero_batch_size_rejected() {
        let cfg: Config = toml::from_str(
            r#"
[store]
path = "a.json"

[bibliography]
endpoint = "http://localhost/api"
collection_id = "c1"
batch_size = 0
"#,
        )
        .unwrap();
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn render_timeout_bounds() {
        let mut cfg = Config::minimal();
        cfg.render.timeout_secs = 600;
        validate(&cfg).unwrap();
        cfg.render.timeout_secs = u64::MAX;
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("render.timeout_secs"));
    }

    #[test]
    fn explicit_cursor_path_wins() {
        let cfg: Config = toml::from_str(
            "[store]\npath = \"a/b.json\"\ncursor_path = \"c/cursor.json\"\n",
        )
        .unwrap();
        assert_eq!(cfg.store.cursor_path(), PathBuf::from("c/cursor.json"));
    }
}
