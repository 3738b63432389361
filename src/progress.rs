//! Import progress reporting.
//!
//! Reports per-item progress during `shelf import next` and `shelf import
//! rescan` so long batches (each item may need a page fetch and a browser
//! render) show what is happening. Progress goes to **stderr** so stdout
//! stays parseable for scripts.

use std::io::Write;

use crate::models::ImportStatus;

/// A single progress event for an import batch.
#[derive(Clone, Debug)]
pub enum ImportProgressEvent {
    /// Bibliography page fetched; `count` items will be processed.
    Fetched { offset: u64, count: u64 },
    /// Item `n` of `total` finished with the given outcome.
    Item {
        n: u64,
        total: u64,
        title: String,
        outcome: ItemOutcome,
    },
}

/// What happened to one item.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ItemOutcome {
    Imported(ImportStatus),
    Skipped,
}

impl std::fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemOutcome::Imported(status) => write!(f, "{}", status),
            ItemOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

/// Reports import progress. Implementations write to stderr (human or JSON).
pub trait ImportProgressReporter: Send + Sync {
    fn report(&self, event: ImportProgressEvent);
}

/// Human-friendly progress on stderr: "import  3 / 10  success  Some title".
pub struct StderrProgress;

impl ImportProgressReporter for StderrProgress {
    fn report(&self, event: ImportProgressEvent) {
        let line = match &event {
            ImportProgressEvent::Fetched { offset, count } => {
                format!(
                    "import  fetched {} items at offset {}\n",
                    format_number(*count),
                    format_number(*offset)
                )
            }
            ImportProgressEvent::Item {
                n,
                total,
                title,
                outcome,
            } => format!(
                "import  {} / {}  {:<8} {}\n",
                format_number(*n),
                format_number(*total),
                outcome.to_string(),
                shorten(title, 60)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ImportProgressReporter for JsonProgress {
    fn report(&self, event: ImportProgressEvent) {
        let obj = match &event {
            ImportProgressEvent::Fetched { offset, count } => serde_json::json!({
                "event": "progress",
                "phase": "fetched",
                "offset": offset,
                "count": count
            }),
            ImportProgressEvent::Item {
                n,
                total,
                title,
                outcome,
            } => serde_json::json!({
                "event": "progress",
                "phase": "item",
                "n": n,
                "total": total,
                "title": title,
                "outcome": outcome.to_string()
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ImportProgressReporter for NoProgress {
    fn report(&self, _event: ImportProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

fn shorten(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ImportProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn long_titles_are_shortened() {
        assert_eq!(shorten("short", 10), "short");
        let s = shorten(&"x".repeat(100), 10);
        assert_eq!(s.chars().count(), 10);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn outcome_display() {
        assert_eq!(ItemOutcome::Imported(ImportStatus::Partial).to_string(), "partial");
        assert_eq!(ItemOutcome::Skipped.to_string(), "skipped");
    }
}
