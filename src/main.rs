mod cli;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use cli::Args;
use gfonts_dl::settings::{API_KEY, FOLDER, LAST_RUN};
use gfonts_dl::{
    ClientOptions, DownloadHandle, DownloadRequest, FontCatalogDownloader, ProgressEvent,
    SettingsStore, TomlSettings,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Flags win over saved settings; both the key and the folder are required.
fn resolve_request(args: &Args, settings: &impl SettingsStore) -> Result<DownloadRequest> {
    let api_key = args
        .api_key
        .clone()
        .or_else(|| settings.get(API_KEY))
        .filter(|key| !key.trim().is_empty());
    let folder = args
        .output
        .clone()
        .or_else(|| settings.get(FOLDER).map(PathBuf::from))
        .filter(|dir| !dir.as_os_str().is_empty());

    match (api_key, folder) {
        (Some(api_key), Some(folder)) => Ok(DownloadRequest::new(api_key, folder, &args.subset)),
        _ => bail!("Please provide an API key and select a folder (--api-key, --output)"),
    }
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:30} {bar:40} {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// Renders events until the terminal one arrives and returns it.
async fn render_events(handle: &mut DownloadHandle, quiet: bool) -> Option<ProgressEvent> {
    let pb = progress_bar(quiet);

    while let Some(event) = handle.next_event().await {
        match &event {
            ProgressEvent::Started { total } => {
                pb.set_length(*total as u64);
                pb.println(event.to_string());
            }
            ProgressEvent::Skipped { family, .. } | ProgressEvent::Downloaded { family, .. } => {
                pb.set_message(family.clone());
                pb.println(event.to_string());
                pb.inc(1);
            }
            ProgressEvent::Failed { family, .. } => {
                pb.set_message(family.clone());
                if quiet {
                    eprintln!("{}", event);
                } else {
                    pb.println(event.to_string());
                }
                pb.inc(1);
            }
            ProgressEvent::Completed { .. }
            | ProgressEvent::Errored { .. }
            | ProgressEvent::Cancelled { .. } => {
                pb.finish_and_clear();
                return Some(event);
            }
        }
    }

    pb.finish_and_clear();
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);
    debug!(?args, "CLI arguments parsed");

    let mut settings = TomlSettings::load(&args.config)?;
    info!(
        "Last run: {}",
        settings.get(LAST_RUN).unwrap_or_else(|| "Never".to_string())
    );

    let request = resolve_request(&args, &settings)?;

    if args.save_config {
        settings.set(API_KEY, &request.api_key)?;
        settings.set(FOLDER, &request.target_dir.to_string_lossy())?;
        info!(path = %settings.path().display(), "Configuration saved");
    }

    fs::create_dir_all(&request.target_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            request.target_dir.display()
        )
    })?;

    let downloader = FontCatalogDownloader::new(ClientOptions {
        timeout: Duration::from_secs(args.timeout),
        proxy: args.proxy.clone(),
    })?;

    let mut handle = downloader.spawn(request.clone());

    let token = handle.cancel_token();
    let interrupt = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    warn!("Interrupted, stopping after the current font");
                    interrupt.cancel();
                }
            }
            _ = interrupt.cancelled() => {}
        }
    });

    let outcome = render_events(&mut handle, args.quiet).await;
    handle.join().await?;
    // Releases the Ctrl-C listener.
    token.cancel();

    match outcome {
        Some(ProgressEvent::Completed { new_files }) => {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            settings.set(API_KEY, &request.api_key)?;
            settings.set(FOLDER, &request.target_dir.to_string_lossy())?;
            settings.set(LAST_RUN, &now)?;

            println!(
                "Download complete! {} new fonts were added to {}",
                new_files,
                request.target_dir.display()
            );
            Ok(())
        }
        Some(ProgressEvent::Cancelled { new_files }) => {
            println!("Download cancelled. {} new fonts were added.", new_files);
            Ok(())
        }
        Some(ProgressEvent::Errored { message }) => Err(anyhow!(message)),
        _ => bail!("Download ended without a result"),
    }
}
