//! # Article Shelf
//!
//! A single-user research article library. Articles are imported from a
//! bibliography API (or entered by hand), their full text is pulled from the
//! article pages, and the collection can be searched with TF-IDF and
//! summarized by a language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ Bibliography │──▶│   ImportRunner    │──▶│ RecordStore  │
//! │     API      │   │ extract → render │   │ (JSON file)  │
//! └──────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                  │
//!                          ┌───────────────────────┤
//!                          ▼                       ▼
//!                   ┌─────────────┐         ┌─────────────┐
//!                   │   TF-IDF    │────────▶│  Analysis   │
//!                   │   search    │         │ (chat API)  │
//!                   └─────────────┘         └─────────────┘
//! ```
//!
//! Both the `shelf` CLI and the HTTP server sit on top of these pieces.
//!
//! ## Quick Start
//!
//! ```bash
//! shelf add --title "Yeast biofoundries" --authors "A. Smith, B. Jones"
//! shelf import next --cookies-file cookies.txt
//! shelf search "strain engineering"
//! shelf analyze "what limits biofoundry throughput?"
//! shelf serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Article and report types |
//! | [`errors`] | Error taxonomy |
//! | [`store`] | JSON record store |
//! | [`cursor`] | Persisted import offset |
//! | [`bibliography`] | Bibliography API client |
//! | [`extract`] | HTTP fetch and HTML/PDF text extraction |
//! | [`render`] | Headless-browser fallback |
//! | [`traits`] | Seams used by the import runner |
//! | [`import`] | Import batch runner |
//! | [`progress`] | Import progress reporting |
//! | [`search`] | TF-IDF ranking |
//! | [`analysis`] | Language-model analysis |
//! | [`articles`] | Article CLI commands |
//! | [`server`] | HTTP JSON API |

pub mod analysis;
pub mod articles;
pub mod bibliography;
pub mod config;
pub mod cursor;
pub mod errors;
pub mod extract;
pub mod import;
pub mod models;
pub mod progress;
pub mod render;
pub mod search;
pub mod server;
pub mod store;
pub mod traits;
