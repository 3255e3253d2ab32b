//! Error types for catalog and per-font failures.
//!
//! Neither type escapes a run: their `Display` output becomes the message of
//! an `Errored` or `Failed` event.

use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a whole run.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("target directory {} does not exist or is not a directory", .path.display())]
    TargetDir { path: PathBuf },

    #[error("failed to fetch fonts: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    /// Non-success status; the body usually holds the API's error JSON.
    #[error("failed to fetch fonts (HTTP {status}): {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse font catalog: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },
}

/// Failures scoped to a single font; the run continues past them.
#[derive(Debug, Error)]
pub enum FontError {
    #[error("family name is not a valid file name")]
    InvalidFamily,

    /// The `.ttf` showed up between the existence check and the final link.
    #[error("already downloaded")]
    AlreadyExists,

    #[error("{source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    /// Rendered as the bare status code, e.g. `404`.
    #[error("{status}")]
    Status { status: u16 },

    #[error("could not write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
