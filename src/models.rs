use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Style key of the only variant that gets downloaded.
pub const REGULAR_STYLE: &str = "regular";

/// Response body of the webfonts listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub items: Vec<CatalogEntry>,
}

/// One font family record from the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub family: String,
    #[serde(default)]
    pub subsets: Vec<String>,
    #[serde(default)]
    pub files: HashMap<String, String>,
}

impl CatalogEntry {
    /// Exact, case-sensitive subset membership.
    pub fn supports(&self, subset: &str) -> bool {
        self.subsets.iter().any(|s| s == subset)
    }

    pub fn regular_url(&self) -> Option<&str> {
        self.files
            .get(REGULAR_STYLE)
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }

    pub fn file_name(&self) -> String {
        format!("{}.ttf", self.family)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub api_key: String,
    pub target_dir: PathBuf,
    pub subset: String,
}

impl DownloadRequest {
    pub fn new(
        api_key: impl Into<String>,
        target_dir: impl Into<PathBuf>,
        subset: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            target_dir: target_dir.into(),
            subset: subset.into(),
        }
    }
}

/// Events emitted by a download run, in catalog order.
///
/// Every run that gets past the catalog fetch opens with one `Started`
/// before the per-entry events. `Completed`, `Errored` and `Cancelled` are
/// terminal: exactly one of them closes every run and nothing follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Number of catalog entries that passed the subset filter.
    Started { total: usize },
    Skipped { family: String, reason: String },
    Downloaded { family: String, path: PathBuf },
    Failed { family: String, reason: String },
    Completed { new_files: usize },
    Errored { message: String },
    Cancelled { new_files: usize },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. }
                | ProgressEvent::Errored { .. }
                | ProgressEvent::Cancelled { .. }
        )
    }

    /// Family name for per-entry events.
    pub fn family(&self) -> Option<&str> {
        match self {
            ProgressEvent::Skipped { family, .. }
            | ProgressEvent::Downloaded { family, .. }
            | ProgressEvent::Failed { family, .. } => Some(family),
            _ => None,
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Started { total } => write!(f, "Found {} matching fonts", total),
            ProgressEvent::Skipped { family, reason } => {
                write!(f, "Skipping {}: {}", family, reason)
            }
            ProgressEvent::Downloaded { family, .. } => {
                write!(f, "Successfully downloaded {}", family)
            }
            ProgressEvent::Failed { family, reason } => {
                write!(f, "Failed to download {}: {}", family, reason)
            }
            ProgressEvent::Completed { new_files } => {
                write!(f, "Download complete: {} new fonts", new_files)
            }
            ProgressEvent::Errored { message } => write!(f, "Error: {}", message),
            ProgressEvent::Cancelled { new_files } => {
                write!(f, "Cancelled after {} new fonts", new_files)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(json: &str) -> CatalogEntry {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn subset_match_is_exact() {
        let e = entry(r#"{"family":"Alef","subsets":["hebrew","latin-ext"]}"#);
        assert!(e.supports("hebrew"));
        assert!(!e.supports("Hebrew"));
        assert!(!e.supports("latin"));
        assert!(!e.supports("heb"));
    }

    #[test]
    fn parses_catalog_and_ignores_unknown_fields() {
        let catalog: Catalog = serde_json::from_str(
            r#"{
                "kind": "webfonts#webfontList",
                "items": [{
                    "family": "Rubik",
                    "category": "sans-serif",
                    "variants": ["regular", "700"],
                    "subsets": ["hebrew", "latin"],
                    "files": {"regular": "http://x/rubik.ttf", "700": "http://x/rubik-700.ttf"}
                }, {
                    "family": "Bare"
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(catalog.items.len(), 2);
        assert_eq!(catalog.items[0].regular_url(), Some("http://x/rubik.ttf"));
        assert!(catalog.items[1].subsets.is_empty());
        assert_eq!(catalog.items[1].regular_url(), None);
    }

    #[test]
    fn empty_regular_url_counts_as_missing() {
        let e = entry(r#"{"family":"Odd","subsets":["hebrew"],"files":{"regular":""}}"#);
        assert_eq!(e.regular_url(), None);
    }

    #[test]
    fn terminal_events() {
        assert!(ProgressEvent::Completed { new_files: 0 }.is_terminal());
        assert!(ProgressEvent::Errored { message: "x".into() }.is_terminal());
        assert!(ProgressEvent::Cancelled { new_files: 2 }.is_terminal());
        assert!(!ProgressEvent::Started { total: 1 }.is_terminal());
        assert!(
            !ProgressEvent::Failed {
                family: "Alef".into(),
                reason: "404".into()
            }
            .is_terminal()
        );
    }

    #[test]
    fn display_matches_log_lines() {
        let skipped = ProgressEvent::Skipped {
            family: "Alef".into(),
            reason: "already downloaded".into(),
        };
        assert_eq!(skipped.to_string(), "Skipping Alef: already downloaded");

        let failed = ProgressEvent::Failed {
            family: "Alef".into(),
            reason: "404".into(),
        };
        assert_eq!(failed.to_string(), "Failed to download Alef: 404");
        assert_eq!(failed.family(), Some("Alef"));
    }
}
