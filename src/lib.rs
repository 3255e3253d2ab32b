//! Download every Google Fonts family that declares a given subset.
//!
//! [`FontCatalogDownloader`] fetches the catalog, keeps the entries tagged
//! with the requested subset and writes each missing regular-style font to
//! the target directory, reporting one [`ProgressEvent`] per entry.

pub mod downloader;
pub mod error;
pub mod models;
pub mod settings;

pub use downloader::{
    ClientOptions, DEFAULT_CATALOG_URL, DEFAULT_SUBSET, DownloadHandle,
    FontCatalogDownloader,
};
pub use error::{CatalogError, FontError};
pub use models::{CatalogEntry, DownloadRequest, ProgressEvent};
pub use settings::{MemorySettings, SettingsStore, TomlSettings};
pub use tokio_util::sync::CancellationToken;
