//! Article commands: `shelf add`, `shelf list`, `shelf get`, `shelf delete`.
//!
//! Thin CLI wrappers over [`RecordStore`] that print to stdout.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::{Article, NewArticle};
use crate::store::RecordStore;

/// Fields of the manual-entry form.
pub struct AddArgs {
    pub title: String,
    pub authors: String,
    pub abstract_text: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
}

pub fn run_add(config: &Config, args: AddArgs) -> Result<()> {
    if args.title.trim().is_empty() {
        bail!("Title is required.");
    }
    let store = RecordStore::new(&config.store.path);
    let article = store.append(NewArticle::manual(
        &args.title,
        &args.authors,
        args.abstract_text,
        args.url,
        args.text,
    ))?;
    println!("Article added: {}", article.id);
    Ok(())
}

pub fn run_list(config: &Config) -> Result<()> {
    let articles = RecordStore::new(&config.store.path).load()?;
    if articles.is_empty() {
        println!("No articles.");
        return Ok(());
    }

    for a in &articles {
        let status = a
            .import_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "manual".to_string());
        println!(
            "{}  {:<8} {:>7}  {}",
            a.id,
            status,
            text_size(a),
            a.title
        );
    }
    println!();
    println!("{} articles", articles.len());
    Ok(())
}

pub fn run_get(config: &Config, id: &str) -> Result<()> {
    let Some(article) = RecordStore::new(&config.store.path).get(id)? else {
        bail!("article not found: {}", id);
    };
    print_article(&article);
    Ok(())
}

pub fn run_delete(config: &Config, id: &str) -> Result<()> {
    if RecordStore::new(&config.store.path).delete(id)? {
        println!("Deleted {}", id);
        Ok(())
    } else {
        bail!("article not found: {}", id);
    }
}

pub fn print_article(a: &Article) {
    println!("--- Article ---");
    println!("id:         {}", a.id);
    println!("title:      {}", a.title);
    if !a.authors.is_empty() {
        println!("authors:    {}", a.authors.join(", "));
    }
    if let Some(ref url) = a.url {
        println!("url:        {}", url);
    }
    if let Some(ref doi) = a.doi {
        println!("doi:        {}", doi);
    }
    println!("created_at: {}", a.created_at.format("%Y-%m-%dT%H:%M:%SZ"));
    if let Some(status) = a.import_status {
        println!("import:     {}", status);
    }
    if let Some(ref strategy) = a.extraction_strategy {
        println!("strategy:   {}", strategy);
    }
    if let Some(ref err) = a.import_error {
        println!("error:      {}", err);
    }
    println!();

    if let Some(ref abs) = a.abstract_text {
        println!("--- Abstract ---");
        println!("{}", abs);
        println!();
    }

    println!("--- Text ({}) ---", text_size(a));
    if let Some(ref text) = a.text {
        println!("{}", text);
    }
}

fn text_size(a: &Article) -> String {
    match a.text.as_deref() {
        Some(t) if !t.is_empty() => format!("{}ch", t.chars().count()),
        _ => "-".to_string(),
    }
}
