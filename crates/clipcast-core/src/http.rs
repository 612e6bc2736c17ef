//! reqwest-backed [`Transport`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderMap};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::transport::{DownloadMeta, DownloadResponse, ProgressFn, Transport, UploadForm};

/// Size of the slices the upload body is cut into.  Progress is reported
/// once per slice handed to the connection.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

pub struct HttpTransport {
    base: String,
    client: Client,
}

impl HttpTransport {
    /// Build a transport for `config.api_base`.
    ///
    /// An unparsable proxy URL is logged and ignored rather than failing
    /// construction.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .user_agent(concat!("clipcast/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(config.request_timeout);

        if let Some(ref proxy_url) = config.proxy {
            match reqwest::Proxy::all(proxy_url) {
                Ok(p) => {
                    builder = builder.proxy(p);
                }
                Err(e) => {
                    warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy URL");
                }
            }
        }

        Ok(Self {
            base: config.api_base.trim_end_matches('/').to_owned(),
            client: builder.build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Decode a JSON envelope.  A non-2xx response whose body is not JSON
    /// becomes [`TransportError::Status`].
    async fn read_json(resp: Response) -> Result<serde_json::Value, TransportError> {
        let status = resp.status();
        let body = resp.bytes().await?;
        match serde_json::from_slice(&body) {
            Ok(v) => Ok(v),
            Err(_) if !status.is_success() => Err(TransportError::Status {
                status: status.as_u16(),
            }),
            Err(e) => Err(TransportError::Decode(e)),
        }
    }
}

fn download_meta(status: u16, headers: &HeaderMap) -> DownloadMeta {
    DownloadMeta {
        status,
        content_length: headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok()),
        // Servers put raw UTF-8 file names in this header; `to_str` would
        // reject them.
        content_disposition: headers
            .get(CONTENT_DISPOSITION)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
    }
}

/// Cut `data` into upload slices, reporting progress as each slice is
/// pulled by the connection.
fn progress_chunks(data: Bytes, progress: ProgressFn) -> impl Iterator<Item = Bytes> + Send {
    let total = data.len();
    let chunks: Vec<Bytes> = (0..total)
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(total)))
        .collect();

    progress(0.0);
    let mut sent = 0usize;
    chunks.into_iter().map(move |chunk| {
        sent += chunk.len();
        progress(sent as f64 * 100.0 / total as f64);
        chunk
    })
}

fn progress_body(data: Bytes, progress: ProgressFn) -> Body {
    let chunks = progress_chunks(data, progress).map(Ok::<Bytes, std::io::Error>);
    Body::wrap_stream(futures::stream::iter(chunks))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, path: &str) -> Result<serde_json::Value, TransportError> {
        debug!(path, "GET");
        let resp = self.client.get(self.url(path)).send().await?;
        Self::read_json(resp).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, TransportError> {
        debug!(path, "POST");
        let mut req = self.client.post(self.url(path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        Self::read_json(req.send().await?).await
    }

    async fn upload(
        &self,
        path: &str,
        form: UploadForm,
        progress: ProgressFn,
    ) -> Result<serde_json::Value, TransportError> {
        let len = form.data.len() as u64;
        debug!(path, file = %form.file_name, len, "multipart upload");

        let part = Part::stream_with_length(progress_body(form.data, progress), len)
            .file_name(form.file_name)
            .mime_str(&form.mime_type)?;
        let multipart = Form::new()
            .part("file", part)
            .text("title", form.title)
            .text("description", form.description);

        let resp = self
            .client
            .post(self.url(path))
            .multipart(multipart)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Status {
                status: resp.status().as_u16(),
            });
        }
        Ok(resp.json().await?)
    }

    async fn open_download(&self, path: &str) -> Result<DownloadResponse, TransportError> {
        debug!(path, "GET (stream)");
        let resp = self.client.get(self.url(path)).send().await?;
        let meta = download_meta(resp.status().as_u16(), resp.headers());
        let body = resp.bytes_stream().map_err(TransportError::from).boxed();
        Ok(DownloadResponse { meta, body })
    }

    async fn head(&self, path: &str) -> Result<DownloadMeta, TransportError> {
        debug!(path, "HEAD");
        let resp = self.client.head(self.url(path)).send().await?;
        Ok(download_meta(resp.status().as_u16(), resp.headers()))
    }
}
