//! Client core for a remote video-to-MP3 conversion service.
//!
//! A [`LifecycleController`] drives one conversion at a time: select a file
//! or a (possibly share-text-embedded) video link, submit it, poll the task
//! until it finishes, then download the result.  [`TaskListView`] lists every
//! task the server knows about.
//!
//! ```rust,ignore
//! let config = ClientConfig::from_env();
//! let api = ApiClient::new(HttpTransport::new(&config)?);
//! let (controller, events) = LifecycleController::new(api.clone(), config);
//! let handle = controller.spawn();
//! ```

pub mod api;
pub mod config;
pub mod controller;
pub mod download;
pub mod error;
pub mod extractor;
pub mod http;
pub mod model;
pub mod session;
pub mod settings;
pub mod task_list;
pub mod transport;
pub mod units;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use controller::{
    ControllerEvent, ControllerHandle, ControllerState, DownloadEntry, LifecycleController,
    Notice, NoticeLevel, Selection,
};
pub use error::{ClientError, TransportError, ValidationError};
pub use http::HttpTransport;
pub use model::{TaskRecord, TaskStatus};
pub use session::{FileSource, JobSession, Source};
pub use settings::{AudioBitrate, EncodeSettings, SampleRate};
pub use task_list::{TaskAction, TaskListView, TaskRow};
pub use transport::Transport;
