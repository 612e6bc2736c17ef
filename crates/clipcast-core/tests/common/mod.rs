//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use clipcast_core::controller::ControllerEvent;
use clipcast_core::error::TransportError;
use clipcast_core::transport::{
    DownloadMeta, DownloadResponse, ProgressFn, Transport, UploadForm,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// One scripted answer for a request key such as `"GET /tasks/T1/status"`.
pub enum Reply {
    Json(Value),
    Fail(String),
    Download {
        status: u16,
        content_length: Option<u64>,
        disposition: Option<String>,
        chunks: Vec<Bytes>,
    },
    /// A 200 download whose body fails with `error` after `chunks`.
    BrokenDownload {
        content_length: Option<u64>,
        chunks: Vec<Bytes>,
        error: String,
    },
    Head(DownloadMeta),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub key: String,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, key: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(key.to_owned())
            .or_default()
            .push_back(reply);
    }

    /// Queue a `success: true` envelope carrying `data`.
    pub fn ok(&self, key: &str, data: Value) {
        self.push(key, Reply::Json(json!({ "success": true, "data": data })));
    }

    /// Queue a `success: false` envelope.
    pub fn app_error(&self, key: &str, message: &str) {
        self.push(
            key,
            Reply::Json(json!({ "success": false, "message": message })),
        );
    }

    pub fn fail(&self, key: &str) {
        self.push(key, Reply::Fail("connection reset".to_owned()));
    }

    pub fn status(&self, task_id: &str, status: &str, progress: f64) {
        self.ok(
            &format!("GET /tasks/{task_id}/status"),
            json!({ "status": status, "progress": progress }),
        );
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.key == key).count()
    }

    pub fn body_of(&self, key: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.key == key)
            .and_then(|c| c.body.clone())
    }

    fn next(&self, key: String, body: Option<Value>) -> Result<Reply, TransportError> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        self.calls.lock().unwrap().push(Call {
            key: key.clone(),
            body,
        });
        match reply {
            Some(Reply::Fail(message)) => Err(TransportError::Other { message }),
            Some(reply) => Ok(reply),
            None => Err(TransportError::Other {
                message: format!("no scripted reply for {key}"),
            }),
        }
    }

    fn json(&self, key: String, body: Option<Value>) -> Result<Value, TransportError> {
        match self.next(key.clone(), body)? {
            Reply::Json(v) => Ok(v),
            _ => panic!("{key} scripted with a non-JSON reply"),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        self.json(format!("GET {path}"), None)
    }

    async fn post_json(&self, path: &str, body: Option<Value>) -> Result<Value, TransportError> {
        self.json(format!("POST {path}"), body)
    }

    async fn upload(
        &self,
        path: &str,
        form: UploadForm,
        progress: ProgressFn,
    ) -> Result<Value, TransportError> {
        let total = form.data.len().max(1);
        let step = total.div_ceil(4);
        progress(0.0);
        let mut sent = 0;
        while sent < total {
            sent = (sent + step).min(total);
            progress(sent as f64 * 100.0 / total as f64);
        }
        let body = json!({
            "file_name": form.file_name,
            "mime_type": form.mime_type,
            "title": form.title,
            "description": form.description,
            "len": form.data.len(),
        });
        self.json(format!("POST {path}"), Some(body))
    }

    async fn open_download(&self, path: &str) -> Result<DownloadResponse, TransportError> {
        let key = format!("GET {path}");
        match self.next(key.clone(), None)? {
            Reply::Download {
                status,
                content_length,
                disposition,
                chunks,
            } => Ok(DownloadResponse {
                meta: DownloadMeta {
                    status,
                    content_length,
                    content_disposition: disposition,
                },
                body: Box::pin(futures::stream::iter(chunks.into_iter().map(Ok::<Bytes, TransportError>))),
            }),
            Reply::BrokenDownload {
                content_length,
                chunks,
                error,
            } => {
                let items = chunks
                    .into_iter()
                    .map(Ok::<Bytes, TransportError>)
                    .chain(std::iter::once(Err(TransportError::Other { message: error })));
                Ok(DownloadResponse {
                    meta: DownloadMeta {
                        status: 200,
                        content_length,
                        content_disposition: Some("attachment; filename=\"talk.mp3\"".to_owned()),
                    },
                    body: Box::pin(futures::stream::iter(items)),
                })
            }
            _ => panic!("{key} scripted with a non-download reply"),
        }
    }

    async fn head(&self, path: &str) -> Result<DownloadMeta, TransportError> {
        let key = format!("HEAD {path}");
        match self.next(key.clone(), None)? {
            Reply::Head(meta) => Ok(meta),
            _ => panic!("{key} scripted with a non-HEAD reply"),
        }
    }
}

/// Collect every event already sent.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ControllerEvent>) -> Vec<ControllerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

pub fn task_record(id: &str, status: &str, progress: f64) -> Value {
    json!({
        "id": id,
        "title": format!("Task {id}"),
        "status": status,
        "progress": progress,
        "created_at": "2025-03-01T08:30:00Z",
    })
}
