//! TF-IDF ranking over the stored articles.
//!
//! The index is rebuilt from scratch on every call: the library is small and
//! the store file can change between calls, so there is nothing worth caching.
//!
//! # Scoring
//!
//! - Tokens are lowercase alphanumeric runs of at least two characters,
//!   with English stop words removed.
//! - Term weight is `tf * idf` with raw counts and smoothed idf
//!   `ln((1 + n) / (1 + df)) + 1`, so a term present in every document still
//!   carries some weight.
//! - Document and query vectors are L2-normalized; the score is their
//!   cosine similarity clipped to `[0, 1]`.
//!
//! Articles scoring zero are dropped. Ties keep store order.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};

use crate::config::Config;
use crate::models::{Article, SearchHit};
use crate::store::RecordStore;

/// Sparse term-weight vector keyed by vocabulary index. Ordered so float
/// sums are reproducible.
type SparseVec = BTreeMap<usize, f64>;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "either",
    "else", "etc", "ever", "every", "few", "for", "from", "further", "had", "has", "have",
    "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how", "however",
    "i", "if", "in", "into", "is", "it", "its", "itself", "just", "may", "me", "might", "more",
    "most", "must", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "upon", "us", "very", "was", "we", "were", "what", "when", "where", "whether", "which",
    "while", "who", "whom", "whose", "why", "will", "with", "within", "without", "would", "yet",
    "you", "your", "yours", "yourself", "yourselves",
];

/// Split text into index terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// Rank `articles` against `query`, returning at most `k` hits with
/// non-increasing scores.
pub fn rank(query: &str, articles: &[Article], k: usize) -> Vec<SearchHit> {
    if k == 0 || articles.is_empty() {
        return Vec::new();
    }
    let query_terms = tokenize(query);
    if query_terms.is_empty() {
        return Vec::new();
    }

    let index = TfIdfIndex::build(articles.iter().map(|a| a.document_text()));
    let query_vec = index.vectorize(&query_terms);
    if query_vec.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, f64)> = index
        .docs
        .iter()
        .enumerate()
        .map(|(i, doc)| (i, cosine_similarity(&query_vec, doc).clamp(0.0, 1.0)))
        .filter(|(_, score)| *score > 0.0)
        .collect();

    // Stable sort keeps store order among equal scores.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(i, score)| SearchHit {
            article: articles[i].clone(),
            score,
        })
        .collect()
}

/// CLI entry point: rank the store and print the hits.
pub fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let articles = RecordStore::new(&config.store.path).load()?;
    let hits = rank(query, &articles, k.unwrap_or(config.retrieval.default_k));
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_hits(&hits);
    Ok(())
}

pub fn print_hits(hits: &[SearchHit]) {
    for (i, hit) in hits.iter().enumerate() {
        let a = &hit.article;
        println!("{}. [{:.3}] {}", i + 1, hit.score, a.title);
        if !a.authors.is_empty() {
            println!("    by {}", a.authors.join(", "));
        }
        if let Some(ref url) = a.url {
            println!("    {}", url);
        }
        println!("    id: {}", a.id);
        if let Some(abs) = a.abstract_text.as_deref().filter(|t| !t.trim().is_empty()) {
            println!("    abstract: {}", preview(abs, PREVIEW_CHARS));
        }
        if let Some(text) = a.text.as_deref().filter(|t| !t.trim().is_empty()) {
            println!("    text: {}", preview(text, PREVIEW_CHARS));
        }
    }
}

const PREVIEW_CHARS: usize = 500;

/// First `max` characters on one line, with `...` when cut.
fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

struct TfIdfIndex {
    vocab: HashMap<String, usize>,
    idf: Vec<f64>,
    docs: Vec<SparseVec>,
}

impl TfIdfIndex {
    fn build(documents: impl Iterator<Item = String>) -> Self {
        let mut vocab: HashMap<String, usize> = HashMap::new();
        let mut df: Vec<usize> = Vec::new();
        let mut counts: Vec<BTreeMap<usize, f64>> = Vec::new();

        for doc in documents {
            let mut tf: BTreeMap<usize, f64> = BTreeMap::new();
            for term in tokenize(&doc) {
                let next = vocab.len();
                let id = *vocab.entry(term).or_insert(next);
                if id == df.len() {
                    df.push(0);
                }
                *tf.entry(id).or_insert(0.0) += 1.0;
            }
            for id in tf.keys() {
                df[*id] += 1;
            }
            counts.push(tf);
        }

        let n = counts.len() as f64;
        let idf: Vec<f64> = df
            .iter()
            .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        let docs = counts
            .into_iter()
            .map(|tf| {
                let mut v: SparseVec = tf.into_iter().map(|(id, c)| (id, c * idf[id])).collect();
                l2_normalize(&mut v);
                v
            })
            .collect();

        Self { vocab, idf, docs }
    }

    /// Query vector in the corpus vocabulary. Unknown terms are dropped.
    fn vectorize(&self, terms: &[String]) -> SparseVec {
        let mut v: SparseVec = BTreeMap::new();
        for term in terms {
            if let Some(&id) = self.vocab.get(term) {
                *v.entry(id).or_insert(0.0) += self.idf[id];
            }
        }
        l2_normalize(&mut v);
        v
    }
}

fn l2_normalize(v: &mut SparseVec) {
    let norm = v.values().map(|x| x * x).sum::<f64>().sqrt();
    if norm > f64::EPSILON {
        for x in v.values_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two sparse vectors. Returns 0 when either is empty
/// or has zero norm.
pub fn cosine_similarity(a: &SparseVec, b: &SparseVec) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    let dot: f64 = small
        .iter()
        .filter_map(|(id, x)| large.get(id).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f64>().sqrt();

    let denom = norm_a * norm_b;
    if denom < f64::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(title: &str, text: &str) -> Article {
        Article {
            id: title.to_lowercase().replace(' ', "-"),
            title: title.to_string(),
            authors: vec![],
            abstract_text: None,
            url: None,
            doi: None,
            text: Some(text.to_string()),
            created_at: Utc::now(),
            import_status: None,
            import_error: None,
            extraction_strategy: None,
        }
    }

    fn corpus() -> Vec<Article> {
        vec![
            article("Yeast biofoundry", "Automated strain engineering of yeast in a biofoundry."),
            article("Protein folding", "Deep learning predicts protein structure."),
            article("Biofoundry economics", "Costs of running a biofoundry and automation."),
            article("Soil microbes", "Nitrogen cycling by soil bacteria."),
        ]
    }

    #[test]
    fn tokenize_drops_stop_words_and_short_tokens() {
        assert_eq!(
            tokenize("The CRISPR-Cas9 system is a tool, x y z"),
            vec!["crispr", "cas9", "system", "tool"]
        );
    }

    #[test]
    fn ranks_relevant_articles_first() {
        let hits = rank("biofoundry automation", &corpus(), 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].article.title, "Biofoundry economics");
        assert_eq!(hits[1].article.title, "Yeast biofoundry");
    }

    #[test]
    fn scores_bounded_and_non_increasing() {
        let hits = rank("protein yeast biofoundry soil", &corpus(), 10);
        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for h in &hits {
            assert!(h.score > 0.0 && h.score <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn truncates_to_k() {
        assert_eq!(rank("protein yeast biofoundry soil", &corpus(), 2).len(), 2);
        assert!(rank("biofoundry", &corpus(), 0).is_empty());
    }

    #[test]
    fn degenerate_inputs_return_nothing() {
        assert!(rank("biofoundry", &[], 5).is_empty());
        assert!(rank("", &corpus(), 5).is_empty());
        assert!(rank("the and of", &corpus(), 5).is_empty());
        assert!(rank("unrelatedterm", &corpus(), 5).is_empty());
    }

    #[test]
    fn ties_keep_store_order() {
        let mut first = article("Twin", "identical words here");
        first.id = "first".to_string();
        let mut second = article("Twin", "identical words here");
        second.id = "second".to_string();
        let hits = rank("identical", &[first, second], 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, hits[1].score);
        assert_eq!(hits[0].article.id, "first");
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v: SparseVec = [(0, 0.6), (3, 0.8)].into_iter().collect();
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&v, &BTreeMap::new()), 0.0);
    }

    #[test]
    fn preview_flattens_and_cuts() {
        assert_eq!(preview("short\n\n text", 500), "short text");
        let long = "ü".repeat(600);
        let cut = preview(&long, 500);
        assert_eq!(cut.chars().count(), 503);
        assert!(cut.ends_with("..."));
    }
}
