//! # Article Shelf CLI (`shelf`)
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf add` | Add an article by hand |
//! | `shelf list` | List stored articles |
//! | `shelf get <id>` | Show one article |
//! | `shelf delete <id>` | Delete an article |
//! | `shelf import next` | Import the next bibliography batch |
//! | `shelf import status` | Show the import cursor |
//! | `shelf import reset` | Rewind the import cursor to 0 |
//! | `shelf import rescan` | Retry extraction for articles without text |
//! | `shelf cookies validate` | Check session cookies against the bibliography API |
//! | `shelf extract <url>` | Extract and print the text of one page |
//! | `shelf search "<query>"` | TF-IDF search |
//! | `shelf analyze "<query>"` | Search, then ask the language model |
//! | `shelf serve` | Start the HTTP server |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use article_shelf::articles::{self, AddArgs};
use article_shelf::config::{self, Config};
use article_shelf::progress::ProgressMode;
use article_shelf::{analysis, extract, import, search, server};

/// Article Shelf: import, extract, search, and analyze research articles.
#[derive(Parser)]
#[command(name = "shelf", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an article by hand.
    Add {
        #[arg(long)]
        title: String,

        /// Comma-separated author names.
        #[arg(long, default_value = "")]
        authors: String,

        #[arg(long = "abstract")]
        abstract_text: Option<String>,

        #[arg(long)]
        url: Option<String>,

        /// Full text. Falls back to the abstract when omitted.
        #[arg(long)]
        text: Option<String>,
    },

    /// List stored articles.
    List,

    /// Show one article.
    Get { id: String },

    /// Delete an article.
    Delete { id: String },

    /// Bibliography import.
    Import {
        #[command(subcommand)]
        action: ImportAction,
    },

    /// Session cookie helpers.
    Cookies {
        #[command(subcommand)]
        action: CookiesAction,
    },

    /// Extract the text of one URL without storing it.
    Extract {
        url: String,

        #[command(flatten)]
        cookies: CookieArgs,
    },

    /// Rank stored articles against a query.
    Search {
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Search, then summarize the hits with the language model.
    Analyze {
        query: String,

        #[arg(long)]
        k: Option<usize>,
    },

    /// Start the HTTP server.
    Serve,
}

#[derive(Subcommand)]
enum ImportAction {
    /// Import the next batch, starting at the cursor.
    Next {
        /// Items per batch (defaults to `bibliography.batch_size`).
        #[arg(long)]
        size: Option<u64>,

        /// Start here instead of at the cursor.
        #[arg(long)]
        offset: Option<u64>,

        #[command(flatten)]
        cookies: CookieArgs,

        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Show the import cursor.
    Status,

    /// Rewind the import cursor to 0.
    Reset,

    /// Retry extraction for stored articles that have a URL but no text.
    Rescan {
        #[command(flatten)]
        cookies: CookieArgs,

        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },
}

#[derive(Subcommand)]
enum CookiesAction {
    /// Request one item with the given cookies and report the result.
    Validate {
        #[command(flatten)]
        cookies: CookieArgs,
    },
}

#[derive(clap::Args)]
struct CookieArgs {
    /// Raw `Cookie` header value.
    #[arg(long)]
    cookies: Option<String>,

    /// File holding the raw `Cookie` header value.
    #[arg(long)]
    cookies_file: Option<PathBuf>,
}

impl CookieArgs {
    fn resolve(self) -> Result<Option<String>> {
        import::read_cookies(self.cookies, self.cookies_file.as_deref())
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

fn progress_mode(arg: Option<ProgressArg>) -> ProgressMode {
    match arg {
        Some(ProgressArg::Off) => ProgressMode::Off,
        Some(ProgressArg::Human) => ProgressMode::Human,
        Some(ProgressArg::Json) => ProgressMode::Json,
        None => ProgressMode::default_for_tty(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // `extract` works without a config file, but a broken one is still an error.
    let cfg = match &cli.command {
        Commands::Extract { .. } if !cli.config.exists() => Config::minimal(),
        _ => config::load_config(&cli.config)?,
    };

    match cli.command {
        Commands::Add {
            title,
            authors,
            abstract_text,
            url,
            text,
        } => {
            articles::run_add(
                &cfg,
                AddArgs {
                    title,
                    authors,
                    abstract_text,
                    url,
                    text,
                },
            )?;
        }
        Commands::List => articles::run_list(&cfg)?,
        Commands::Get { id } => articles::run_get(&cfg, &id)?,
        Commands::Delete { id } => articles::run_delete(&cfg, &id)?,
        Commands::Import { action } => match action {
            ImportAction::Next {
                size,
                offset,
                cookies,
                progress,
            } => {
                import::run_import_next(
                    &cfg,
                    size,
                    offset,
                    cookies.resolve()?,
                    progress_mode(progress),
                )
                .await?;
            }
            ImportAction::Status => import::run_import_status(&cfg)?,
            ImportAction::Reset => import::run_import_reset(&cfg)?,
            ImportAction::Rescan { cookies, progress } => {
                import::run_rescan(&cfg, cookies.resolve()?, progress_mode(progress)).await?;
            }
        },
        Commands::Cookies { action } => match action {
            CookiesAction::Validate { cookies } => {
                import::run_validate_cookies(&cfg, cookies.resolve()?).await?;
            }
        },
        Commands::Extract { url, cookies } => {
            extract::run_extract(&cfg, &url, cookies.resolve()?).await?;
        }
        Commands::Search { query, k } => search::run_search(&cfg, &query, k)?,
        Commands::Analyze { query, k } => analysis::run_analyze(&cfg, &query, k).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
