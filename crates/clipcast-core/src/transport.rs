//! Transport contract consumed by the API client.
//!
//! The controller never talks HTTP directly; it goes through a [`Transport`]
//! so the reqwest implementation in [`crate::http`] can be swapped for a
//! scripted one in tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::TransportError;

/// Fractional progress callback, called with a percentage in `0.0..=100.0`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Chunked response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Multipart body of `POST /upload`.
#[derive(Clone)]
pub struct UploadForm {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
    pub title: String,
    pub description: String,
}

impl std::fmt::Debug for UploadForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadForm")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .field("title", &self.title)
            .finish()
    }
}

/// Response metadata of a download (or its `HEAD` variant).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadMeta {
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_disposition: Option<String>,
}

impl DownloadMeta {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An opened download: metadata plus the not-yet-read body.
pub struct DownloadResponse {
    pub meta: DownloadMeta,
    pub body: ByteStream,
}

/// JSON request/response calls plus streamed upload/download against the
/// job API.  Paths are relative to the API base (`/tasks`, `/upload`, ...).
///
/// JSON calls return the decoded body even for non-2xx statuses when the
/// body is JSON, because the server reports application failures inside the
/// envelope.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn get_json(&self, path: &str) -> Result<serde_json::Value, TransportError>;

    async fn post_json(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, TransportError>;

    /// Upload a multipart form.  `progress` receives bytes-sent / total as a
    /// percentage; it is the only progress source during upload.
    async fn upload(
        &self,
        path: &str,
        form: UploadForm,
        progress: ProgressFn,
    ) -> Result<serde_json::Value, TransportError>;

    /// Issue a `GET` and hand back the body unread.  Non-success statuses are
    /// returned in `meta`, not as errors.
    async fn open_download(&self, path: &str) -> Result<DownloadResponse, TransportError>;

    /// Issue a `HEAD`.
    async fn head(&self, path: &str) -> Result<DownloadMeta, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get_json(&self, path: &str) -> Result<serde_json::Value, TransportError> {
        (**self).get_json(path).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, TransportError> {
        (**self).post_json(path, body).await
    }

    async fn upload(
        &self,
        path: &str,
        form: UploadForm,
        progress: ProgressFn,
    ) -> Result<serde_json::Value, TransportError> {
        (**self).upload(path, form, progress).await
    }

    async fn open_download(&self, path: &str) -> Result<DownloadResponse, TransportError> {
        (**self).open_download(path).await
    }

    async fn head(&self, path: &str) -> Result<DownloadMeta, TransportError> {
        (**self).head(path).await
    }
}
