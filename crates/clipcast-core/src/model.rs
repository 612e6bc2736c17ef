//! Wire types for the conversion API.
//!
//! Every JSON endpoint answers with the same envelope
//! (`{success, message?, data?}`); the task types below are the `data`
//! payloads.  The client never mutates a [`TaskRecord`], it only re-fetches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{ClientError, TransportError};

/// Server-side lifecycle state of a conversion task.
///
/// Deserialization is strict: a status string the client does not know fails
/// decoding instead of being shown raw.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// `true` once no further progress updates are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    /// Label for task list rows.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "Queued",
            TaskStatus::Processing => "Processing",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Canceled => "Canceled",
        }
    }

    /// Label for the live progress display of the active conversion.
    pub fn progress_label(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "Waiting in queue...",
            TaskStatus::Processing => "Converting...",
            TaskStatus::Completed => "Conversion complete",
            TaskStatus::Failed => "Conversion failed",
            TaskStatus::Canceled => "Canceled",
        }
    }
}

/// Read-only projection of a server task.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub error_message: Option<String>,
    /// Size of the uploaded source; the only size `GET /tasks` reports.
    #[serde(default, deserialize_with = "zero_as_none")]
    pub file_size: Option<u64>,
    #[serde(default, deserialize_with = "zero_as_none")]
    pub output_size: Option<u64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub original_name: Option<String>,
}

/// `data` of `GET /tasks/{id}/status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusSnapshot {
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub error_message: Option<String>,
}

/// `data` of `GET /tasks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPage {
    #[serde(default)]
    pub items: Vec<TaskRecord>,
}

/// `data` of `POST /upload` and `POST /convert/url`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreated {
    pub task_id: String,
}

/// Body of `POST /convert/url`.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertUrlRequest<'a> {
    pub url: &'a str,
    pub title: &'a str,
    pub audio_codec: &'a str,
    pub audio_bitrate: &'a str,
    pub sample_rate: &'a str,
}

/// Body of `POST /convert/file`.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertFileRequest<'a> {
    pub task_id: &'a str,
    pub audio_codec: &'a str,
    pub audio_bitrate: &'a str,
    pub sample_rate: &'a str,
}

/// The `{success, message?, data?}` envelope shared by all JSON endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Check the `success` flag, keeping the (possibly absent) payload.
    ///
    /// `fallback` is the user-facing message used when the server reports
    /// failure without one.
    pub fn into_result(self, fallback: &str) -> Result<Option<T>, ClientError> {
        if self.success {
            return Ok(self.data);
        }
        let message = self
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| fallback.to_owned());
        Err(ClientError::Application { message })
    }

    /// Like [`into_result`](Self::into_result) but also requires `data`.
    pub fn into_data(self, fallback: &str) -> Result<T, ClientError> {
        self.into_result(fallback)?.ok_or_else(|| {
            ClientError::Transport(TransportError::Other {
                message: "response is missing its data field".to_owned(),
            })
        })
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn zero_as_none<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<u64>::deserialize(deserializer)?;
    Ok(value.filter(|n| *n > 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_set() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let raw = json!({ "status": "paused", "progress": 10 });
        assert!(serde_json::from_value::<StatusSnapshot>(raw).is_err());
    }

    #[test]
    fn task_record_treats_empty_fields_as_absent() {
        let raw = json!({
            "id": "T1",
            "title": "talk",
            "type": "file_upload",
            "status": "completed",
            "progress": 100.0,
            "created_at": "2024-05-01T10:00:00+08:00",
            "error_message": "",
            "file_size": 0,
            "output_size": 0,
            "original_name": "talk.mp4"
        });
        let record: TaskRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.error_message, None);
        assert_eq!(record.file_size, None);
        assert_eq!(record.output_size, None);
        assert_eq!(record.original_name.as_deref(), Some("talk.mp4"));
    }

    #[test]
    fn failed_envelope_prefers_server_message() {
        let env: Envelope<TaskCreated> =
            serde_json::from_value(json!({ "success": false, "message": "bad url" })).unwrap();
        let err = env.into_data("generic").unwrap_err();
        assert_eq!(err.to_string(), "bad url");

        let env: Envelope<TaskCreated> =
            serde_json::from_value(json!({ "success": false })).unwrap();
        let err = env.into_data("generic").unwrap_err();
        assert_eq!(err.to_string(), "generic");
    }

    #[test]
    fn successful_envelope_without_data() {
        let env: Envelope<serde_json::Value> =
            serde_json::from_value(json!({ "success": true, "message": "ok" })).unwrap();
        assert!(env.into_result("x").unwrap().is_none());
    }
}
