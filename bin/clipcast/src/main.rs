//! clipcast – command-line client for the video-to-MP3 conversion service.
//!
//! Startup order:
//! 1. Parse configuration from environment variables, then CLI overrides.
//! 2. Initialise tracing on stderr (JSON when `CLIPCAST_LOG_JSON` is set).
//! 3. Build the HTTP transport and run the requested subcommand.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mime_guess::MimeGuess;
use tracing::{info, warn};

use clipcast_core::controller::{ControllerEvent, ControllerState, Selection};
use clipcast_core::task_list::{EMPTY_LIST_MESSAGE, LOAD_FAILED_MESSAGE, TaskAction};
use clipcast_core::units::format_size;
use clipcast_core::{
    ApiClient, AudioBitrate, ClientConfig, EncodeSettings, FileSource, HttpTransport,
    LifecycleController, SampleRate, TaskListView, extractor,
};

#[derive(Debug, Parser)]
#[command(name = "clipcast", version, about = "Convert videos and video links to MP3")]
struct Cli {
    /// API base including the `/api/v1` prefix.
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Directory converted files are saved into.
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert a local video file, a video link, or shared text containing one.
    Convert {
        input: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value_t = AudioBitrate::default())]
        bitrate: AudioBitrate,
        #[arg(long, default_value_t = SampleRate::default())]
        sample_rate: SampleRate,
        /// Stop once the conversion completes instead of downloading it.
        #[arg(long)]
        no_download: bool,
    },
    /// List all conversion tasks.
    Tasks,
    /// Cancel a queued or running task.
    Cancel { task_id: String },
    /// Download the MP3 of a completed task.
    Download { task_id: String },
    /// Print the video link found in shared text.
    Extract { text: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cli = Cli::parse();
    let mut cfg = ClientConfig::from_env();
    if let Some(base) = cli.api_base.clone() {
        cfg = cfg.with_api_base(base);
    }
    if let Some(dir) = cli.output.clone() {
        cfg = cfg.with_download_dir(dir);
    }

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), api_base = %cfg.api_base, "clipcast starting");

    // ── 3. Command ─────────────────────────────────────────────────────────────
    if let Command::Extract { text } = &cli.command {
        return match extractor::extract(text.trim()) {
            Some(url) => {
                println!("{url}");
                Ok(())
            }
            None => bail!("no video link found"),
        };
    }

    let api = ApiClient::new(HttpTransport::new(&cfg).context("failed to build HTTP client")?);
    match cli.command {
        Command::Convert {
            input,
            title,
            bitrate,
            sample_rate,
            no_download,
        } => {
            let settings = EncodeSettings::default()
                .with_title(title.unwrap_or_default())
                .with_bitrate(bitrate)
                .with_sample_rate(sample_rate);
            convert(api, cfg, &input, settings, no_download).await
        }
        Command::Tasks => list_tasks(&TaskListView::new(api)).await,
        Command::Cancel { task_id } => {
            let rows = TaskListView::new(api)
                .cancel(&task_id)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message("Cancel failed")))?;
            println!("Task {task_id} canceled");
            print_rows(&rows);
            Ok(())
        }
        Command::Download { task_id } => {
            let path = TaskListView::new(api)
                .download(&task_id, &cfg.download_dir, progress_printer("Downloading"))
                .await
                .context("Download failed, please try again later")?;
            eprintln!();
            println!("Saved {}", path.display());
            Ok(())
        }
        Command::Extract { .. } => Ok(()),
    }
}

fn init_tracing(cfg: &ClientConfig) {
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: CLIPCAST_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn convert(
    api: ApiClient<HttpTransport>,
    cfg: ClientConfig,
    input: &str,
    settings: EncodeSettings,
    no_download: bool,
) -> anyhow::Result<()> {
    let selection = selection_for(input).await?;
    let download_dir = cfg.download_dir.clone();

    let (controller, mut events) = LifecycleController::new(api, cfg);
    let handle = controller.spawn();
    handle.set_settings(settings).await?;
    handle.select_source(selection).await?;
    let task_id = handle.submit().await?;
    println!("Task {task_id} submitted");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut cancel_sent = false;
    let mut outcome: Option<ControllerState> = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("controller stopped unexpectedly");
                };
                match event {
                    ControllerEvent::UploadProgress { percent, label } => {
                        eprint!("\r{label} {percent:>3.0}%");
                    }
                    ControllerEvent::Status { label, progress, .. } => {
                        eprint!("\r{label} {progress:>3.0}%   ");
                    }
                    ControllerEvent::Notice(notice) => {
                        eprintln!();
                        println!("[{}] {}", notice.level, notice.message);
                    }
                    ControllerEvent::DownloadReady(entry) => {
                        let size = entry.size.map(format_size).unwrap_or_else(|| "unknown size".to_owned());
                        println!("{} ({size}) is ready", entry.file_name);
                        if no_download {
                            return Ok(());
                        }
                        let path = handle.download_into(&download_dir).await?;
                        eprintln!();
                        println!("Saved {}", path.display());
                        return Ok(());
                    }
                    ControllerEvent::DownloadProgress(percent) => {
                        eprint!("\rDownloading {percent:>3.0}%");
                    }
                    ControllerEvent::StateChanged(state @ (ControllerState::Failed | ControllerState::Canceled)) => {
                        outcome = Some(state);
                    }
                    ControllerEvent::StateChanged(ControllerState::Idle) => match outcome {
                        Some(ControllerState::Failed) => bail!("conversion failed"),
                        Some(_) => return Ok(()),
                        None => {}
                    },
                    ControllerEvent::StateChanged(_) => {}
                }
            }
            () = &mut shutdown, if !cancel_sent => {
                cancel_sent = true;
                warn!("interrupted; canceling the active conversion");
                handle.cancel().await.context("failed to cancel the conversion")?;
            }
        }
    }
}

/// Treat `input` as a file when such a path exists, otherwise as link text.
async fn selection_for(input: &str) -> anyhow::Result<Selection> {
    let path = Path::new(input);
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Selection::Url(input.to_owned()));
    }
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_owned());
    Ok(Selection::File(FileSource::new(name, video_mime(path), data)))
}

/// Media type guessed from the file extension; unknown extensions are
/// `application/octet-stream` and fail validation.
fn video_mime(path: &Path) -> String {
    MimeGuess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}

async fn list_tasks(view: &TaskListView<HttpTransport>) -> anyhow::Result<()> {
    match view.refresh().await {
        Ok(rows) if rows.is_empty() => println!("{EMPTY_LIST_MESSAGE}"),
        Ok(rows) => print_rows(&rows),
        Err(e) => {
            warn!(error = %e, "failed to load tasks");
            bail!(LOAD_FAILED_MESSAGE);
        }
    }
    Ok(())
}

fn print_rows(rows: &[clipcast_core::TaskRow]) {
    for row in rows {
        let action = match row.action {
            Some(TaskAction::Download) => "download",
            Some(TaskAction::Cancel) => "cancel",
            None => "-",
        };
        println!(
            "{:<36}  {:<10}  {:>3}%  {}  {:>9}  {:<8}  {}",
            row.id,
            row.status_label,
            row.progress,
            row.created_at,
            row.source_size.as_deref().unwrap_or("-"),
            action,
            row.title
        );
        if let Some(err) = &row.error_message {
            println!("    {err}");
        }
    }
}

fn progress_printer(label: &'static str) -> impl FnMut(f64) + Send {
    move |percent| eprint!("\r{label} {percent:>3.0}%")
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("interrupt received");
}
