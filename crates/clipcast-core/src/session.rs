//! The single active conversion attempt.

use bytes::Bytes;

use crate::error::ValidationError;
use crate::settings::EncodeSettings;

/// Upload ceiling for local files: 500 MiB.
pub const MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// A local video selected for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct FileSource {
    pub data: Bytes,
    pub name: String,
    /// Declared size in bytes.  Normally `data.len()`.
    pub size: u64,
    pub mime_type: String,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

impl FileSource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            data,
            name: name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Check the media type and size against `limit` bytes.
    pub fn validate(&self, limit: u64) -> Result<(), ValidationError> {
        if !self.mime_type.starts_with("video/") {
            return Err(ValidationError::NotAVideo {
                mime_type: self.mime_type.clone(),
            });
        }
        if self.size > limit {
            return Err(ValidationError::FileTooLarge {
                size: self.size,
                limit,
            });
        }
        Ok(())
    }
}

/// What is being converted.  Holding one enum value keeps file and link
/// mutually exclusive: selecting one replaces the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(FileSource),
    RemoteUrl { canonical_url: String },
}

impl Source {
    /// Local file name, when the source is a file.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Source::File(f) => Some(&f.name),
            Source::RemoteUrl { .. } => None,
        }
    }
}

/// Locally-known state of the active conversion.
#[derive(Debug, Clone, Default)]
pub struct JobSession {
    source: Option<Source>,
    pub settings: EncodeSettings,
    task_id: Option<String>,
}

impl JobSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Replace the current source.  A previously assigned task id belongs to
    /// the old source and is dropped with it.
    pub fn set_source(&mut self, source: Source) {
        self.source = Some(source);
        self.task_id = None;
    }

    pub fn clear_source(&mut self) {
        self.source = None;
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn attach_task(&mut self, task_id: impl Into<String>) {
        self.task_id = Some(task_id.into());
    }

    /// Forget the source, settings input and task id.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
