//! Bibliography API client.
//!
//! Fetches one page of item metadata for a collection. Bibliography services
//! disagree on response shape, so parsing is deliberately loose: the item
//! list may be the top-level array or sit under `results`, `items`,
//! `articles`, or `data`, and each field has a few accepted aliases.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::errors::BibliographyError;
use crate::traits::MetadataSource;

/// Keys that may hold the item list in an object response.
const LIST_KEYS: &[&str] = &["results", "items", "articles", "data"];

/// Parameters for one page request. Cookies are passed through verbatim.
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub endpoint: &'a str,
    pub collection_id: &'a str,
    pub offset: u64,
    pub size: u64,
    pub cookies: Option<&'a str>,
}

/// Metadata for one bibliography item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BibItem {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub url: Option<String>,
    pub doi: Option<String>,
}

impl BibItem {
    /// Extraction target: the item URL, or the DOI resolver link.
    pub fn target_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| self.doi.as_ref().map(|d| format!("https://doi.org/{}", d)))
    }
}

pub struct BibliographyClient {
    client: reqwest::Client,
}

impl BibliographyClient {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataSource for BibliographyClient {
    async fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<BibItem>, BibliographyError> {
        let offset = request.offset.to_string();
        let size = request.size.to_string();
        let mut req = self
            .client
            .get(request.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("collection_id", request.collection_id),
                ("offset", offset.as_str()),
                ("size", size.as_str()),
            ]);
        if let Some(cookie) = request.cookies.map(str::trim).filter(|c| !c.is_empty()) {
            req = req.header(reqwest::header::COOKIE, cookie);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| BibliographyError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(BibliographyError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BibliographyError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| BibliographyError::Malformed(e.to_string()))?;

        let mut items = parse_page(&json)?;
        items.truncate(request.size as usize);
        debug!(
            offset = request.offset,
            count = items.len(),
            "bibliography page fetched"
        );
        Ok(items)
    }
}

/// Parse a page response into items.
pub fn parse_page(json: &Value) -> Result<Vec<BibItem>, BibliographyError> {
    let list = match json {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => {
            let found = LIST_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_array));
            match found {
                Some(items) => items.as_slice(),
                None if map.contains_key("title") || map.contains_key("id") => {
                    return Ok(vec![parse_item(json)]);
                }
                None => {
                    return Err(BibliographyError::Malformed(
                        "no item list in response".to_string(),
                    ))
                }
            }
        }
        _ => {
            return Err(BibliographyError::Malformed(
                "expected a JSON array or object".to_string(),
            ))
        }
    };

    Ok(list.iter().map(parse_item).collect())
}

fn parse_item(item: &Value) -> BibItem {
    BibItem {
        title: first_str(item, &["title", "name"]),
        authors: parse_authors(item),
        abstract_text: first_str(item, &["abstract", "summary", "description"]),
        url: first_str(item, &["url", "link", "pdf_url", "pdf"]),
        doi: first_str(item, &["doi", "DOI"]).map(|d| clean_doi(&d)),
    }
}

fn first_str(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        item.get(*k)
            .and_then(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                // Some APIs wrap titles in a one-element array.
                Value::Array(a) => a.first().and_then(Value::as_str).map(|s| s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
    })
}

fn parse_authors(item: &Value) -> Vec<String> {
    let Some(raw) = item.get("authors").or_else(|| item.get("author")) else {
        return Vec::new();
    };

    match raw {
        Value::String(s) => {
            let sep = if s.contains(';') { ';' } else { ',' };
            s.split(sep)
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect()
        }
        Value::Array(list) => list.iter().filter_map(author_name).collect(),
        other => author_name(other).into_iter().collect(),
    }
}

fn author_name(v: &Value) -> Option<String> {
    let name = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Object(_) => {
            if let Some(n) = v.get("name").and_then(Value::as_str) {
                n.trim().to_string()
            } else {
                let given = v.get("given").and_then(Value::as_str).unwrap_or("").trim();
                let family = v.get("family").and_then(Value::as_str).unwrap_or("").trim();
                format!("{} {}", given, family).trim().to_string()
            }
        }
        _ => return None,
    };
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Strip resolver prefixes so DOIs compare equal however they were written.
pub fn clean_doi(doi: &str) -> String {
    let mut d = doi.trim();
    for prefix in ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"] {
        if let Some(rest) = d.strip_prefix(prefix) {
            d = rest;
        }
    }
    d.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_level_array() {
        let items = parse_page(&json!([
            {"title": "A", "url": "http://x/a"},
            {"title": "B"}
        ]))
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url.as_deref(), Some("http://x/a"));
        assert_eq!(items[1].url, None);
    }

    #[test]
    fn wrapped_list_and_aliases() {
        let items = parse_page(&json!({
            "total": 1,
            "items": [{
                "name": "Aliased",
                "link": "http://x/l",
                "summary": "sum",
                "author": "Doe, J.; Roe, R.",
                "DOI": "https://doi.org/10.1000/ABC"
            }]
        }))
        .unwrap();
        let item = &items[0];
        assert_eq!(item.title.as_deref(), Some("Aliased"));
        assert_eq!(item.url.as_deref(), Some("http://x/l"));
        assert_eq!(item.abstract_text.as_deref(), Some("sum"));
        assert_eq!(item.authors, vec!["Doe, J.", "Roe, R."]);
        assert_eq!(item.doi.as_deref(), Some("10.1000/ABC"));
    }

    #[test]
    fn structured_authors() {
        let items = parse_page(&json!({"results": [{
            "title": ["Wrapped title"],
            "authors": [{"given": "Ada", "family": "Lovelace"}, {"name": "Grace Hopper"}, "Alan Turing", 7]
        }]}))
        .unwrap();
        assert_eq!(items[0].title.as_deref(), Some("Wrapped title"));
        assert_eq!(
            items[0].authors,
            vec!["Ada Lovelace", "Grace Hopper", "Alan Turing"]
        );
    }

    #[test]
    fn single_item_object() {
        let items = parse_page(&json!({"id": 4, "title": "Solo"})).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Solo"));
    }

    #[test]
    fn unrecognized_shape_is_malformed() {
        assert!(matches!(
            parse_page(&json!({"status": "ok"})),
            Err(BibliographyError::Malformed(_))
        ));
        assert!(matches!(
            parse_page(&json!("nope")),
            Err(BibliographyError::Malformed(_))
        ));
    }

    #[test]
    fn doi_becomes_target_url() {
        let item = BibItem {
            doi: Some("10.1/xyz".to_string()),
            ..Default::default()
        };
        assert_eq!(item.target_url().as_deref(), Some("https://doi.org/10.1/xyz"));
        assert_eq!(clean_doi("doi:10.1/xyz "), "10.1/xyz");
    }
}
