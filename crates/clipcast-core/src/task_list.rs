//! Read-only listing of server tasks with per-row actions.
//!
//! Rows are rebuilt from `GET /tasks` on every refresh; nothing here is
//! cached between calls.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::download;
use crate::error::ClientError;
use crate::model::{TaskRecord, TaskStatus};
use crate::transport::Transport;
use crate::units::{format_size, format_timestamp};

/// Shown when the server has no tasks.
pub const EMPTY_LIST_MESSAGE: &str = "No conversion tasks yet";

/// Shown when the list could not be loaded.
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load tasks, please try again later";

/// Action offered for a task row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Download,
    Cancel,
}

impl TaskAction {
    /// Completed tasks can be downloaded; queued and processing ones can be
    /// canceled.  Failed and canceled tasks offer nothing.
    pub fn for_status(status: TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Completed => Some(TaskAction::Download),
            TaskStatus::Queued | TaskStatus::Processing => Some(TaskAction::Cancel),
            TaskStatus::Failed | TaskStatus::Canceled => None,
        }
    }
}

/// One rendered row of the task list.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub status_label: &'static str,
    /// Progress rounded to a whole percent.
    pub progress: u8,
    pub created_at: String,
    /// Formatted size of the source video.
    pub source_size: Option<String>,
    pub error_message: Option<String>,
    pub action: Option<TaskAction>,
}

impl From<&TaskRecord> for TaskRow {
    fn from(record: &TaskRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            status: record.status,
            status_label: record.status.label(),
            progress: record.progress.clamp(0.0, 100.0).round() as u8,
            created_at: format_timestamp(&record.created_at),
            source_size: record.file_size.map(format_size),
            error_message: record.error_message.clone(),
            action: TaskAction::for_status(record.status),
        }
    }
}

pub struct TaskListView<T> {
    api: ApiClient<T>,
}

impl<T: Transport> TaskListView<T> {
    pub fn new(api: ApiClient<T>) -> Self {
        Self { api }
    }

    /// Fetch all tasks and build their rows, in server order.
    pub async fn refresh(&self) -> Result<Vec<TaskRow>, ClientError> {
        let records = self.api.list_tasks().await?;
        debug!(count = records.len(), "task list refreshed");
        Ok(records.iter().map(TaskRow::from).collect())
    }

    /// Cancel `task_id`, then reload the list.
    pub async fn cancel(&self, task_id: &str) -> Result<Vec<TaskRow>, ClientError> {
        if let Err(e) = self.api.cancel_task(task_id).await {
            warn!(task_id, error = %e, "cancel from task list failed");
            return Err(e);
        }
        info!(task_id, "task canceled from list");
        self.refresh().await
    }

    /// Download the output of `task_id` into `dir`.
    ///
    /// `on_progress` receives non-decreasing percentages when the server
    /// declares the length.
    pub async fn download(
        &self,
        task_id: &str,
        dir: &Path,
        on_progress: impl FnMut(f64) + Send,
    ) -> Result<PathBuf, ClientError> {
        let audio = download::download(&self.api, task_id, None, on_progress).await?;
        audio.save_into(dir).await
    }
}
