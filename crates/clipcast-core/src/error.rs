use thiserror::Error;

/// Input rejected before any request is made.
///
/// Reported to the user immediately; the controller state is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The selected file does not declare a `video/*` media type.
    #[error("not a video file: media type {mime_type:?}")]
    NotAVideo { mime_type: String },

    /// The selected file exceeds the upload ceiling.
    #[error("file is {size} bytes, limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// The URL input was empty or whitespace only.
    #[error("no video link given")]
    EmptyUrl,

    /// No recognized video link could be extracted from the input text.
    #[error("no video link found in {input:?}")]
    NoVideoLink { input: String },

    /// The extracted link is not an absolute http/https URL.
    #[error("invalid video link: {url}")]
    InvalidUrl { url: String },
}

/// Failures raised by a [`Transport`](crate::transport::Transport) implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request failed (connect, timeout, body read, ...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("server returned HTTP {status}")]
    Status { status: u16 },

    /// The response body was not the expected JSON.
    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other transport-level failure (used by non-HTTP transports).
    #[error("transport failure: {message}")]
    Other { message: String },
}

/// All errors surfaced by clipcast-core operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// `submit` was called before a file or URL was selected.
    #[error("no file or video link selected")]
    NoSource,

    /// `cancel` (or polling) was requested without an assigned task id.
    #[error("no active conversion task")]
    NoActiveTask,

    /// A command arrived while the controller was in a state that cannot accept it.
    #[error("operation not allowed while {state}")]
    InvalidState { state: &'static str },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered 2xx with `success: false`.
    #[error("{message}")]
    Application { message: String },

    /// The download endpoint answered with a non-success status.
    #[error("download failed: HTTP {http_status}")]
    DownloadFailed { http_status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The controller task has shut down and can no longer accept commands.
    #[error("controller is no longer running")]
    ControllerClosed,
}

impl ClientError {
    /// Message shown to the user for this failure.
    ///
    /// Application errors carry the server's text verbatim; transport errors
    /// collapse to `fallback` so raw network details stay in the logs.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Application { message } => message.clone(),
            ClientError::Validation(e) => e.to_string(),
            ClientError::Transport(_) | ClientError::Io(_) => fallback.to_owned(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(TransportError::Http(e))
    }
}
