use crate::error::{CatalogError, FontError};
use crate::models::{Catalog, CatalogEntry, DownloadRequest, ProgressEvent};
use anyhow::{Context, Result};
use futures::Stream;
use reqwest::{Client, StatusCode};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_CATALOG_URL: &str = "https://www.googleapis.com/webfonts/v1/webfonts";
pub const DEFAULT_SUBSET: &str = "hebrew";

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub proxy: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            proxy: None,
        }
    }
}

/// The receiving side of a spawned run.
pub struct DownloadHandle {
    events: mpsc::Receiver<ProgressEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DownloadHandle {
    /// Token checked between catalog entries; cancelling it ends the run with
    /// [`ProgressEvent::Cancelled`].
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the terminal event has been delivered.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> {
        futures::stream::unfold(self.events, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }

    /// Waits for the worker task to finish.
    pub async fn join(self) -> Result<()> {
        drop(self.events);
        self.task.await.context("Download task panicked")
    }
}

#[derive(Clone)]
pub struct FontCatalogDownloader {
    client: Client,
    catalog_url: String,
}

impl FontCatalogDownloader {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let mut client_builder = Client::builder().timeout(options.timeout);

        if let Some(proxy_url) = options.proxy.as_deref() {
            client_builder = client_builder
                .proxy(reqwest::Proxy::all(proxy_url).context("Invalid proxy URL")?);
        }

        let client = client_builder
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
        })
    }

    pub fn with_catalog_url(mut self, url: impl Into<String>) -> Self {
        self.catalog_url = url.into();
        self
    }

    /// Runs `request` on a separate tokio task and hands back its event channel.
    pub fn spawn(&self, request: DownloadRequest) -> DownloadHandle {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let downloader = self.clone();
        let token = cancel.clone();

        let task = task::spawn(async move {
            downloader.run(&request, &tx, &token).await;
        });

        DownloadHandle {
            events: rx,
            cancel,
            task,
        }
    }

    /// One sequential pass over the catalog.
    ///
    /// Returns once the terminal event has been sent, or as soon as the
    /// receiver is dropped.
    pub async fn run(
        &self,
        request: &DownloadRequest,
        events: &mpsc::Sender<ProgressEvent>,
        cancel: &CancellationToken,
    ) {
        let fetched = if request.target_dir.is_dir() {
            self.fetch_catalog(request).await
        } else {
            Err(CatalogError::TargetDir {
                path: request.target_dir.clone(),
            })
        };

        let entries = match fetched {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Catalog fetch failed");
                let _ = events
                    .send(ProgressEvent::Errored {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        // The query already asks for the subset; re-check in case the API ignored it.
        let eligible: Vec<CatalogEntry> = entries
            .into_iter()
            .filter(|entry| entry.supports(&request.subset))
            .collect();

        info!(total = eligible.len(), subset = %request.subset, "Catalog fetched");

        if events
            .send(ProgressEvent::Started {
                total: eligible.len(),
            })
            .await
            .is_err()
        {
            return;
        }

        let mut new_files = 0usize;

        for entry in &eligible {
            if cancel.is_cancelled() {
                info!(new_files, "Run cancelled");
                let _ = events.send(ProgressEvent::Cancelled { new_files }).await;
                return;
            }

            let event = self.process_entry(entry, &request.target_dir).await;
            if matches!(event, ProgressEvent::Downloaded { .. }) {
                new_files += 1;
            }

            if events.send(event).await.is_err() {
                debug!("Event receiver dropped, stopping run");
                return;
            }
        }

        info!(new_files, "Run complete");
        let _ = events.send(ProgressEvent::Completed { new_files }).await;
    }

    async fn fetch_catalog(
        &self,
        request: &DownloadRequest,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        debug!(url = %self.catalog_url, subset = %request.subset, "Fetching catalog");

        let response = self
            .client
            .get(&self.catalog_url)
            .query(&[
                ("key", request.api_key.as_str()),
                ("subset", request.subset.as_str()),
            ])
            .send()
            .await
            .map_err(|source| CatalogError::Transport { source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| CatalogError::Transport { source })?;

        let catalog: Catalog =
            serde_json::from_slice(&body).map_err(|source| CatalogError::Decode { source })?;

        Ok(catalog.items)
    }

    async fn process_entry(&self, entry: &CatalogEntry, target_dir: &Path) -> ProgressEvent {
        let family = entry.family.clone();

        let Some(url) = entry.regular_url() else {
            return ProgressEvent::Skipped {
                family,
                reason: "no regular style available".to_string(),
            };
        };

        if !is_valid_family_name(&entry.family) {
            warn!(family = %family, "Refusing to use family name as a file name");
            return ProgressEvent::Failed {
                family,
                reason: FontError::InvalidFamily.to_string(),
            };
        }

        let output_path = target_dir.join(entry.file_name());
        if output_path.exists() {
            return ProgressEvent::Skipped {
                family,
                reason: "already downloaded".to_string(),
            };
        }

        info!(family = %family, "Downloading");

        match self.download_font(url, &output_path).await {
            Ok(()) => ProgressEvent::Downloaded {
                family,
                path: output_path,
            },
            Err(FontError::AlreadyExists) => ProgressEvent::Skipped {
                family,
                reason: "already downloaded".to_string(),
            },
            Err(e) => {
                warn!(family = %family, error = %e, "Font download failed");
                ProgressEvent::Failed {
                    family,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn download_font(&self, url: &str, output_path: &Path) -> Result<(), FontError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FontError::Transport { source })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FontError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FontError::Transport { source })?;

        write_new_file(output_path, &body)
    }
}

/// Writes `bytes` through a `.part` file that is linked into place, so an
/// interrupted write never leaves a truncated `.ttf` behind and an existing
/// `.ttf` is never replaced.
fn write_new_file(output_path: &Path, bytes: &[u8]) -> Result<(), FontError> {
    let partial_path = partial_path_for(output_path);

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&partial_path)
        .map_err(|source| FontError::Io {
            path: partial_path.clone(),
            source,
        })?;

    let written = file.write_all(bytes).and_then(|_| file.sync_all());
    drop(file);

    if let Err(source) = written {
        let _ = fs::remove_file(&partial_path);
        return Err(FontError::Io {
            path: partial_path,
            source,
        });
    }

    // Unlike rename, hard_link fails instead of replacing an existing target.
    let linked = fs::hard_link(&partial_path, output_path);
    let _ = fs::remove_file(&partial_path);

    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(FontError::AlreadyExists),
        // Filesystems without hard links (FAT, some network mounts).
        Err(e) => {
            debug!(error = %e, path = %output_path.display(), "Hard link failed, writing directly");
            write_exclusive(output_path, bytes)
        }
    }
}

fn write_exclusive(output_path: &Path, bytes: &[u8]) -> Result<(), FontError> {
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output_path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(FontError::AlreadyExists),
        Err(source) => {
            return Err(FontError::Io {
                path: output_path.to_path_buf(),
                source,
            });
        }
    };

    let written = file.write_all(bytes).and_then(|_| file.sync_all());
    drop(file);

    written.map_err(|source| {
        let _ = fs::remove_file(output_path);
        FontError::Io {
            path: output_path.to_path_buf(),
            source,
        }
    })
}

fn partial_path_for(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn is_valid_family_name(family: &str) -> bool {
    !family.is_empty()
        && family != "."
        && family != ".."
        && !family.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_names_must_stay_inside_target_dir() {
        assert!(is_valid_family_name("Frank Ruhl Libre"));
        assert!(is_valid_family_name("Noto Sans Hebrew"));
        assert!(!is_valid_family_name(""));
        assert!(!is_valid_family_name(".."));
        assert!(!is_valid_family_name("../etc/passwd"));
        assert!(!is_valid_family_name("a\\b"));
    }

    #[test]
    fn partial_path_appends_suffix() {
        let path = Path::new("/fonts/Alef.ttf");
        assert_eq!(partial_path_for(path), PathBuf::from("/fonts/Alef.ttf.part"));
    }

    #[test]
    fn write_new_file_replaces_stale_partial() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Alef.ttf");
        fs::write(partial_path_for(&output), b"stale bytes from an earlier crash").unwrap();

        write_new_file(&output, b"font").unwrap();

        assert_eq!(fs::read(&output).unwrap(), b"font");
        assert!(!partial_path_for(&output).exists());
    }

    #[test]
    fn write_new_file_never_replaces_existing_font() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Alef.ttf");
        fs::write(&output, b"appeared after the existence check").unwrap();

        let result = write_new_file(&output, b"server copy");

        assert!(matches!(result, Err(FontError::AlreadyExists)));
        assert_eq!(fs::read(&output).unwrap(), b"appeared after the existence check");
        assert!(!partial_path_for(&output).exists());
    }

    #[test]
    fn write_exclusive_never_replaces_existing_font() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Alef.ttf");
        fs::write(&output, b"original").unwrap();

        assert!(matches!(
            write_exclusive(&output, b"server copy"),
            Err(FontError::AlreadyExists)
        ));
        assert_eq!(fs::read(&output).unwrap(), b"original");
    }

    #[test]
    fn write_new_file_reports_unwritable_partial() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Alef.ttf");
        fs::create_dir(partial_path_for(&output)).unwrap();

        let result = write_new_file(&output, b"font");

        assert!(matches!(result, Err(FontError::Io { .. })));
        assert!(!output.exists());
    }
}
