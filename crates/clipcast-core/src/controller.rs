//! Lifecycle controller for the single active conversion.
//!
//! The controller owns the [`JobSession`] and the poll timer.  It can be
//! driven directly through `&mut self` commands, or moved onto its own task
//! with [`LifecycleController::spawn`], where commands and poll ticks are
//! serialized through one event loop:
//!
//! ```rust,ignore
//! let (controller, mut events) = LifecycleController::new(api, config);
//! let handle = controller.spawn();
//! handle.select_source(Selection::Url(text)).await?;
//! handle.submit().await?;
//! while let Some(event) = events.recv().await { /* render */ }
//! ```
//!
//! Exactly one poll timer can exist because it lives in a single
//! `Option<Poller>` field; stopping it drops the timer, so no tick can fire
//! afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use strum::{AsRefStr, Display, IntoStaticStr};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, UPLOAD_DESCRIPTION};
use crate::config::ClientConfig;
use crate::download::{self, FALLBACK_FILE_NAME, mp3_name};
use crate::error::{ClientError, ValidationError};
use crate::extractor;
use crate::model::TaskStatus;
use crate::session::{FileSource, JobSession, Source};
use crate::settings::EncodeSettings;
use crate::transport::{ProgressFn, Transport, UploadForm};

/// Title sent for link conversions when the user entered none.
pub const URL_TITLE_FALLBACK: &str = "URL video conversion";

const SUBMIT_FAILED: &str = "Conversion failed, please try again later";
const CANCEL_FAILED: &str = "Cancel failed";
const DOWNLOAD_FAILED: &str = "Download failed, please try again later";
const UNKNOWN_ERROR: &str = "Unknown error";

/// Where the controller is in the conversion lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ControllerState {
    Idle,
    #[strum(serialize = "configuring settings")]
    ConfiguringSettings,
    Submitting,
    Polling,
    Completed,
    Failed,
    Canceled,
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
    Warning,
    Info,
}

/// A transient, auto-dismissing message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// What the finished conversion can be downloaded as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEntry {
    pub task_id: String,
    pub file_name: String,
    pub size: Option<u64>,
}

/// Everything the presentation layer needs to render the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged(ControllerState),
    Notice(Notice),
    /// Upload progress of a file submission, `0.0..=100.0`.
    UploadProgress { percent: f64, label: &'static str },
    /// Result of a successful poll tick.
    Status {
        status: TaskStatus,
        label: &'static str,
        progress: f64,
    },
    DownloadReady(DownloadEntry),
    DownloadProgress(f64),
}

/// Input to [`LifecycleController::select_source`].
#[derive(Debug, Clone)]
pub enum Selection {
    File(FileSource),
    /// A raw link or shared text containing one.
    Url(String),
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub state: ControllerState,
    pub task_id: Option<String>,
    pub polling: bool,
    pub download: Option<DownloadEntry>,
}

struct Poller {
    task_id: String,
    interval: Interval,
}

pub struct LifecycleController<T> {
    api: ApiClient<T>,
    config: ClientConfig,
    session: JobSession,
    state: ControllerState,
    poller: Option<Poller>,
    download: Option<DownloadEntry>,
    events: mpsc::UnboundedSender<ControllerEvent>,
}

impl<T: Transport> LifecycleController<T> {
    /// Create an idle controller and the receiver for its events.
    pub fn new(
        api: ApiClient<T>,
        config: ClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            api,
            config,
            session: JobSession::new(),
            state: ControllerState::Idle,
            poller: None,
            download: None,
            events,
        };
        (controller, rx)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn session(&self) -> &JobSession {
        &self.session
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    pub fn download_entry(&self) -> Option<&DownloadEntry> {
        self.download.as_ref()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state,
            task_id: self.session.task_id().map(str::to_owned),
            polling: self.is_polling(),
            download: self.download.clone(),
        }
    }

    // ── commands ─────────────────────────────────────────────────────────────

    /// Validate and adopt a file or link as the conversion source.
    ///
    /// On failure the error is reported and the state is left unchanged.
    pub fn select_source(&mut self, selection: Selection) -> Result<(), ClientError> {
        self.require_configurable()?;

        let source = match selection {
            Selection::File(file) => {
                if let Err(e) = file.validate(self.config.max_file_size) {
                    return Err(self.reject(e));
                }
                info!(name = %file.name, size = file.size, "file selected");
                Source::File(file)
            }
            Selection::Url(text) => {
                let input = text.trim();
                let url = match self.resolve_url(input) {
                    Ok(url) => url,
                    Err(e) => return Err(self.reject(e)),
                };
                if url != input {
                    self.notify(NoticeLevel::Info, format!("Extracted video link: {url}"));
                }
                info!(%url, "video link selected");
                Source::RemoteUrl { canonical_url: url }
            }
        };

        self.session.set_source(source);
        self.set_state(ControllerState::ConfiguringSettings);
        self.notify(
            NoticeLevel::Info,
            "Configure the conversion settings, then start",
        );
        Ok(())
    }

    /// Drop the selected source without contacting the server.
    pub fn remove_source(&mut self) -> Result<(), ClientError> {
        self.require_configurable()?;
        self.session.clear_source();
        self.set_state(ControllerState::Idle);
        Ok(())
    }

    pub fn set_settings(&mut self, settings: EncodeSettings) -> Result<(), ClientError> {
        self.require_configurable()?;
        self.session.settings = settings;
        Ok(())
    }

    /// Submit the selected source and start polling the created task.
    ///
    /// Any failure resets the controller to `Idle`.  For files, an upload
    /// that succeeded before the convert request failed leaves the uploaded
    /// task on the server; no cleanup request is sent.
    pub async fn submit(&mut self) -> Result<String, ClientError> {
        self.require_configurable()?;
        let Some(source) = self.session.source().cloned() else {
            self.notify(NoticeLevel::Error, "Select a file or enter a video link first");
            return Err(ClientError::NoSource);
        };
        let settings = self.session.settings.clone();

        self.set_state(ControllerState::Submitting);
        let result = match source {
            Source::RemoteUrl { canonical_url } => {
                let title = settings.title_or(URL_TITLE_FALLBACK);
                self.api
                    .convert_url(&canonical_url, title, &settings)
                    .await
            }
            Source::File(file) => self.submit_file(file, &settings).await,
        };

        match result {
            Ok(task_id) => {
                info!(task_id = %task_id, "conversion task started");
                self.session.attach_task(task_id.clone());
                self.notify(NoticeLevel::Success, "Conversion task started");
                self.start_polling()?;
                Ok(task_id)
            }
            Err(e) => {
                error!(error = %e, "submission failed");
                self.notify(NoticeLevel::Error, e.user_message(SUBMIT_FAILED));
                self.reset();
                Err(e)
            }
        }
    }

    async fn submit_file(
        &mut self,
        file: FileSource,
        settings: &EncodeSettings,
    ) -> Result<String, ClientError> {
        let events = self.events.clone();
        let progress: ProgressFn = Arc::new(move |percent: f64| {
            let label = if percent < 100.0 {
                "Uploading..."
            } else {
                "Upload complete, preparing conversion..."
            };
            let _ = events.send(ControllerEvent::UploadProgress { percent, label });
        });

        let form = UploadForm {
            title: settings.title_or(&file.name).to_owned(),
            file_name: file.name,
            mime_type: file.mime_type,
            data: file.data,
            description: UPLOAD_DESCRIPTION.to_owned(),
        };
        let task_id = self.api.upload(form, progress).await?;
        debug!(task_id = %task_id, "upload accepted");
        self.session.attach_task(task_id.clone());

        self.api.convert_file(&task_id, settings).await?;
        Ok(task_id)
    }

    /// Start (or restart) polling the session's task.  Any existing timer is
    /// stopped first, so at most one is ever active.
    pub fn start_polling(&mut self) -> Result<(), ClientError> {
        let task_id = self
            .session
            .task_id()
            .map(str::to_owned)
            .ok_or(ClientError::NoActiveTask)?;
        self.stop_polling();

        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(task_id = %task_id, ?period, "polling started");
        self.poller = Some(Poller { task_id, interval });
        self.set_state(ControllerState::Polling);
        Ok(())
    }

    pub fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            debug!(task_id = %poller.task_id, "polling stopped");
        }
    }

    /// Wait until the next poll tick is due.  Never resolves while no timer
    /// is active.
    pub async fn next_poll_tick(&mut self) {
        wait_tick(&mut self.poller).await;
    }

    /// Run one status request for the polled task.
    ///
    /// Transport and application failures are logged and swallowed; the
    /// timer keeps running.  Returns the reported status, if any.
    pub async fn poll_tick(&mut self) -> Option<TaskStatus> {
        let task_id = self.poller.as_ref()?.task_id.clone();

        let snapshot = match self.api.task_status(&task_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "status poll failed; retrying on next tick");
                return None;
            }
        };
        debug!(task_id = %task_id, status = %snapshot.status, progress = snapshot.progress, "status");
        self.emit(ControllerEvent::Status {
            status: snapshot.status,
            label: snapshot.status.progress_label(),
            progress: snapshot.progress,
        });

        match snapshot.status {
            TaskStatus::Completed => {
                self.stop_polling();
                self.set_state(ControllerState::Completed);
                let entry = self.describe_completed(&task_id).await;
                info!(task_id = %task_id, file = %entry.file_name, "conversion completed");
                self.download = Some(entry.clone());
                self.emit(ControllerEvent::DownloadReady(entry));
                self.notify(NoticeLevel::Success, "Conversion complete");
            }
            TaskStatus::Failed => {
                self.stop_polling();
                let message = snapshot
                    .error_message
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_owned());
                error!(task_id = %task_id, error = %message, "conversion failed");
                self.set_state(ControllerState::Failed);
                self.notify(NoticeLevel::Error, message);
                self.reset();
            }
            TaskStatus::Canceled => {
                self.stop_polling();
                info!(task_id = %task_id, "task canceled on the server");
                self.set_state(ControllerState::Canceled);
                self.notify(NoticeLevel::Warning, "Conversion canceled");
                self.reset();
            }
            TaskStatus::Queued | TaskStatus::Processing => {}
        }
        Some(snapshot.status)
    }

    /// Build the download entry for a completed task from the server's
    /// record, falling back to local knowledge and a `HEAD` request.
    async fn describe_completed(&self, task_id: &str) -> DownloadEntry {
        let (file_name, size) = match self.api.get_task(task_id).await {
            Ok(record) => (
                record
                    .original_name
                    .as_deref()
                    .map(mp3_name)
                    .unwrap_or_else(|| FALLBACK_FILE_NAME.to_owned()),
                record.output_size,
            ),
            Err(e) => {
                warn!(task_id, error = %e, "failed to load task details");
                let name = self
                    .session
                    .source()
                    .and_then(Source::file_name)
                    .map(mp3_name)
                    .unwrap_or_else(|| FALLBACK_FILE_NAME.to_owned());
                (name, None)
            }
        };

        let size = match size {
            Some(size) => Some(size),
            None => match self.api.download_meta(task_id).await {
                Ok(meta) if meta.is_success() => meta.content_length,
                Ok(meta) => {
                    debug!(task_id, status = meta.status, "HEAD returned no size");
                    None
                }
                Err(e) => {
                    warn!(task_id, error = %e, "failed to read output size");
                    None
                }
            },
        };

        DownloadEntry {
            task_id: task_id.to_owned(),
            file_name,
            size,
        }
    }

    /// Ask the server to cancel the session's task.
    ///
    /// Without a task id this fails immediately and sends nothing.  When the
    /// request fails the state and the poll timer are left as they were.
    pub async fn cancel(&mut self) -> Result<(), ClientError> {
        let task_id = self
            .session
            .task_id()
            .map(str::to_owned)
            .ok_or(ClientError::NoActiveTask)?;

        match self.api.cancel_task(&task_id).await {
            Ok(()) => {
                self.stop_polling();
                info!(task_id = %task_id, "conversion canceled");
                self.set_state(ControllerState::Canceled);
                self.notify(NoticeLevel::Warning, "Conversion canceled");
                self.reset();
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "cancel request failed");
                self.notify(NoticeLevel::Error, e.user_message(CANCEL_FAILED));
                Err(e)
            }
        }
    }

    /// Clear the session and stop polling.  Safe from any state.
    pub fn reset(&mut self) {
        self.stop_polling();
        self.session.clear();
        self.download = None;
        self.set_state(ControllerState::Idle);
    }

    /// Download the completed conversion into `dir`.
    pub async fn download_into(&mut self, dir: &Path) -> Result<PathBuf, ClientError> {
        if self.state != ControllerState::Completed {
            return Err(ClientError::InvalidState {
                state: self.state.into(),
            });
        }
        let task_id = self
            .session
            .task_id()
            .map(str::to_owned)
            .ok_or(ClientError::NoActiveTask)?;
        let source_name = self
            .session
            .source()
            .and_then(Source::file_name)
            .map(str::to_owned);

        let events = self.events.clone();
        let result: Result<PathBuf, ClientError> = async {
            let audio = download::download(&self.api, &task_id, source_name.as_deref(), |p| {
                let _ = events.send(ControllerEvent::DownloadProgress(p));
            })
            .await?;
            audio.save_into(dir).await
        }
        .await;

        match result {
            Ok(path) => {
                self.notify(NoticeLevel::Success, "Download complete");
                Ok(path)
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "download failed");
                self.notify(NoticeLevel::Error, DOWNLOAD_FAILED);
                Err(e)
            }
        }
    }

    // ── helpers ──────────────────────────────────────────────────────────────

    fn resolve_url(&self, input: &str) -> Result<String, ValidationError> {
        if input.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        let url = extractor::extract(input).ok_or_else(|| ValidationError::NoVideoLink {
            input: input.to_owned(),
        })?;
        if !extractor::is_http_url(&url) {
            return Err(ValidationError::InvalidUrl { url });
        }
        Ok(url)
    }

    fn require_configurable(&self) -> Result<(), ClientError> {
        match self.state {
            ControllerState::Idle | ControllerState::ConfiguringSettings => Ok(()),
            other => Err(ClientError::InvalidState {
                state: other.into(),
            }),
        }
    }

    fn reject(&self, e: ValidationError) -> ClientError {
        debug!(error = %e, "selection rejected");
        self.notify(NoticeLevel::Error, e.to_string());
        ClientError::Validation(e)
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state != state {
            info!(from = %self.state, to = %state, "state change");
            self.state = state;
            self.emit(ControllerEvent::StateChanged(state));
        }
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.emit(ControllerEvent::Notice(Notice {
            level,
            message: message.into(),
        }));
    }

    fn emit(&self, event: ControllerEvent) {
        // A dropped receiver only means nobody is rendering.
        let _ = self.events.send(event);
    }
}

async fn wait_tick(poller: &mut Option<Poller>) {
    match poller {
        Some(p) => {
            p.interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── event loop ───────────────────────────────────────────────────────────────

/// Commands sent to a spawned controller's event loop.
#[derive(Debug)]
pub enum ControllerCommand {
    SelectSource {
        selection: Selection,
        reply_tx: oneshot::Sender<Result<(), ClientError>>,
    },
    RemoveSource {
        reply_tx: oneshot::Sender<Result<(), ClientError>>,
    },
    SetSettings {
        settings: EncodeSettings,
        reply_tx: oneshot::Sender<Result<(), ClientError>>,
    },
    Submit {
        reply_tx: oneshot::Sender<Result<String, ClientError>>,
    },
    Cancel {
        reply_tx: oneshot::Sender<Result<(), ClientError>>,
    },
    Reset {
        reply_tx: oneshot::Sender<()>,
    },
    Download {
        dir: PathBuf,
        reply_tx: oneshot::Sender<Result<PathBuf, ClientError>>,
    },
    Snapshot {
        reply_tx: oneshot::Sender<ControllerSnapshot>,
    },
}

enum LoopEvent {
    Command(ControllerCommand),
    Tick,
}

impl<T: Transport> LifecycleController<T> {
    /// Move the controller onto its own task and return a handle to it.
    ///
    /// The task ends when every handle has been dropped.
    pub fn spawn(self) -> ControllerHandle {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(self.run(rx));
        ControllerHandle { tx }
    }

    /// Serve commands and poll ticks one at a time until the command channel
    /// closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ControllerCommand>) {
        loop {
            let next = tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => LoopEvent::Command(cmd),
                    None => break,
                },
                () = wait_tick(&mut self.poller) => LoopEvent::Tick,
            };

            match next {
                LoopEvent::Command(cmd) => self.handle(cmd).await,
                LoopEvent::Tick => {
                    self.poll_tick().await;
                }
            }
        }
        self.stop_polling();
        debug!("controller loop exited");
    }

    async fn handle(&mut self, cmd: ControllerCommand) {
        match cmd {
            ControllerCommand::SelectSource {
                selection,
                reply_tx,
            } => {
                let _ = reply_tx.send(self.select_source(selection));
            }
            ControllerCommand::RemoveSource { reply_tx } => {
                let _ = reply_tx.send(self.remove_source());
            }
            ControllerCommand::SetSettings { settings, reply_tx } => {
                let _ = reply_tx.send(self.set_settings(settings));
            }
            ControllerCommand::Submit { reply_tx } => {
                let _ = reply_tx.send(self.submit().await);
            }
            ControllerCommand::Cancel { reply_tx } => {
                let _ = reply_tx.send(self.cancel().await);
            }
            ControllerCommand::Reset { reply_tx } => {
                self.reset();
                let _ = reply_tx.send(());
            }
            ControllerCommand::Download { dir, reply_tx } => {
                let _ = reply_tx.send(self.download_into(&dir).await);
            }
            ControllerCommand::Snapshot { reply_tx } => {
                let _ = reply_tx.send(self.snapshot());
            }
        }
    }
}

/// Cloneable handle to a spawned [`LifecycleController`].
#[derive(Clone, Debug)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerCommand>,
}

impl ControllerHandle {
    async fn call<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> ControllerCommand,
    ) -> Result<R, ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| ClientError::ControllerClosed)?;
        reply_rx.await.map_err(|_| ClientError::ControllerClosed)
    }

    pub async fn select_source(&self, selection: Selection) -> Result<(), ClientError> {
        self.call(|reply_tx| ControllerCommand::SelectSource {
            selection,
            reply_tx,
        })
        .await?
    }

    pub async fn remove_source(&self) -> Result<(), ClientError> {
        self.call(|reply_tx| ControllerCommand::RemoveSource { reply_tx })
            .await?
    }

    pub async fn set_settings(&self, settings: EncodeSettings) -> Result<(), ClientError> {
        self.call(|reply_tx| ControllerCommand::SetSettings { settings, reply_tx })
            .await?
    }

    pub async fn submit(&self) -> Result<String, ClientError> {
        self.call(|reply_tx| ControllerCommand::Submit { reply_tx })
            .await?
    }

    pub async fn cancel(&self) -> Result<(), ClientError> {
        self.call(|reply_tx| ControllerCommand::Cancel { reply_tx })
            .await?
    }

    pub async fn reset(&self) -> Result<(), ClientError> {
        self.call(|reply_tx| ControllerCommand::Reset { reply_tx })
            .await
    }

    pub async fn download_into(&self, dir: impl Into<PathBuf>) -> Result<PathBuf, ClientError> {
        let dir = dir.into();
        self.call(|reply_tx| ControllerCommand::Download { dir, reply_tx })
            .await?
    }

    pub async fn snapshot(&self) -> Result<ControllerSnapshot, ClientError> {
        self.call(|reply_tx| ControllerCommand::Snapshot { reply_tx })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_read_as_prose() {
        let name: &'static str = ControllerState::ConfiguringSettings.into();
        assert_eq!(name, "configuring settings");
        assert_eq!(ControllerState::Polling.as_ref(), "polling");
        assert_eq!(ControllerState::Idle.to_string(), "idle");
    }
}
