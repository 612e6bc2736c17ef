//! Typed calls for each endpoint of the conversion API.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, TransportError};
use crate::model::{
    ConvertFileRequest, ConvertUrlRequest, Envelope, StatusSnapshot, TaskCreated, TaskPage,
    TaskRecord,
};
use crate::settings::{AUDIO_CODEC, EncodeSettings};
use crate::transport::{DownloadMeta, DownloadResponse, ProgressFn, Transport, UploadForm};

/// Description attached to every upload.
pub const UPLOAD_DESCRIPTION: &str = "Video uploaded through the clipcast client";

/// Endpoint-level client over a shared [`Transport`].
///
/// Cheap to clone; the controller and the task list share one transport.
pub struct ApiClient<T> {
    transport: Arc<T>,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

fn decode<D: DeserializeOwned>(value: serde_json::Value) -> Result<Envelope<D>, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Transport(TransportError::Decode(e)))
}

fn to_json<S: Serialize>(body: &S) -> Result<serde_json::Value, ClientError> {
    serde_json::to_value(body).map_err(|e| ClientError::Transport(TransportError::Decode(e)))
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    pub fn from_shared(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// `POST /upload`.  Returns the id of the created (not yet converting) task.
    pub async fn upload(
        &self,
        form: UploadForm,
        progress: ProgressFn,
    ) -> Result<String, ClientError> {
        let value = self.transport.upload("/upload", form, progress).await?;
        let created: TaskCreated = decode(value)?.into_data("File upload failed")?;
        Ok(created.task_id)
    }

    /// `POST /convert/file` for an uploaded task.
    pub async fn convert_file(
        &self,
        task_id: &str,
        settings: &EncodeSettings,
    ) -> Result<(), ClientError> {
        let body = ConvertFileRequest {
            task_id,
            audio_codec: AUDIO_CODEC,
            audio_bitrate: settings.audio_bitrate.as_ref(),
            sample_rate: settings.sample_rate.as_ref(),
        };
        let value = self
            .transport
            .post_json("/convert/file", Some(to_json(&body)?))
            .await?;
        decode::<serde_json::Value>(value)?.into_result("Failed to start conversion")?;
        Ok(())
    }

    /// `POST /convert/url`.  Returns the id of the created task.
    pub async fn convert_url(
        &self,
        url: &str,
        title: &str,
        settings: &EncodeSettings,
    ) -> Result<String, ClientError> {
        let body = ConvertUrlRequest {
            url,
            title,
            audio_codec: AUDIO_CODEC,
            audio_bitrate: settings.audio_bitrate.as_ref(),
            sample_rate: settings.sample_rate.as_ref(),
        };
        let value = self
            .transport
            .post_json("/convert/url", Some(to_json(&body)?))
            .await?;
        let created: TaskCreated =
            decode(value)?.into_data("Failed to create conversion task")?;
        Ok(created.task_id)
    }

    /// `GET /tasks`.
    pub async fn list_tasks(&self) -> Result<Vec<TaskRecord>, ClientError> {
        let value = self.transport.get_json("/tasks").await?;
        let page: Option<TaskPage> = decode(value)?.into_result("Failed to load tasks")?;
        Ok(page.unwrap_or_default().items)
    }

    /// `GET /tasks/{id}`.
    pub async fn get_task(&self, task_id: &str) -> Result<TaskRecord, ClientError> {
        let value = self.transport.get_json(&format!("/tasks/{task_id}")).await?;
        decode(value)?.into_data("Failed to load task")
    }

    /// `GET /tasks/{id}/status`.
    pub async fn task_status(&self, task_id: &str) -> Result<StatusSnapshot, ClientError> {
        let value = self
            .transport
            .get_json(&format!("/tasks/{task_id}/status"))
            .await?;
        decode(value)?.into_data("Failed to load task status")
    }

    /// `POST /tasks/{id}/cancel`.
    pub async fn cancel_task(&self, task_id: &str) -> Result<(), ClientError> {
        let value = self
            .transport
            .post_json(&format!("/tasks/{task_id}/cancel"), None)
            .await?;
        decode::<serde_json::Value>(value)?.into_result("Cancel failed")?;
        Ok(())
    }

    /// `GET /download/{id}`, body unread.
    pub async fn open_download(&self, task_id: &str) -> Result<DownloadResponse, ClientError> {
        Ok(self
            .transport
            .open_download(&format!("/download/{task_id}"))
            .await?)
    }

    /// `HEAD /download/{id}`.
    pub async fn download_meta(&self, task_id: &str) -> Result<DownloadMeta, ClientError> {
        Ok(self.transport.head(&format!("/download/{task_id}")).await?)
    }
}
