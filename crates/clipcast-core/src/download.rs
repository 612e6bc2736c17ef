//! Streamed download of converted audio.

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use percent_encoding::percent_decode_str;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::transport::Transport;

/// Name used when neither the server nor the source provides one.
pub const FALLBACK_FILE_NAME: &str = "converted_audio.mp3";

/// Converts a running byte count into a percentage of a declared total.
///
/// Reported values never decrease and never exceed 100.  Without a known,
/// non-zero total nothing is reported.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: Option<u64>,
    loaded: u64,
    last: f64,
}

impl ProgressTracker {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            loaded: 0,
            last: 0.0,
        }
    }

    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    /// Record `n` more bytes; returns the new percentage when the total is known.
    pub fn advance(&mut self, n: u64) -> Option<f64> {
        self.loaded += n;
        let total = self.total?;
        let percent = (self.loaded as f64 * 100.0 / total as f64).min(100.0);
        self.last = self.last.max(percent);
        Some(self.last)
    }
}

/// A fully received audio file, not yet written anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct DownloadedAudio {
    pub file_name: String,
    pub data: Bytes,
}

impl std::fmt::Debug for DownloadedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadedAudio")
            .field("file_name", &self.file_name)
            .field("len", &self.data.len())
            .finish()
    }
}

impl DownloadedAudio {
    /// Write the file into `dir` and return its final path.
    ///
    /// Data goes to a hidden staging file first and is renamed into place;
    /// the staging file is removed on every failure path.  An existing file
    /// with the same name is kept and a numbered name is chosen instead.
    pub async fn save_into(&self, dir: &Path) -> Result<PathBuf, ClientError> {
        tokio::fs::create_dir_all(dir).await?;
        let target = unique_path(dir, &self.file_name).await;
        let staged = StagedFile::new(dir.join(format!(".{}.part", self.file_name)));

        tokio::fs::write(staged.path(), &self.data).await?;
        tokio::fs::rename(staged.path(), &target).await?;
        staged.commit();

        info!(path = %target.display(), bytes = self.data.len(), "saved download");
        Ok(target)
    }
}

/// Temporary file removed on drop unless committed.
struct StagedFile {
    path: PathBuf,
    committed: bool,
}

impl StagedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to remove staging file");
                }
            }
        }
    }
}

async fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }
    let (stem, ext) = split_extension(file_name);
    let mut n = 1;
    loop {
        let name = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(name);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}

/// Download the converted audio of `task_id`.
///
/// `source_name` is the local name of the uploaded video, used to name the
/// result when the server does not.  `on_progress` receives non-decreasing
/// percentages when the response declares its length.
pub async fn download<T, F>(
    api: &ApiClient<T>,
    task_id: &str,
    source_name: Option<&str>,
    mut on_progress: F,
) -> Result<DownloadedAudio, ClientError>
where
    T: Transport,
    F: FnMut(f64) + Send,
{
    let response = api.open_download(task_id).await?;
    if !response.meta.is_success() {
        return Err(ClientError::DownloadFailed {
            http_status: response.meta.status,
        });
    }

    let mut tracker = ProgressTracker::new(response.meta.content_length);
    let mut buffer = BytesMut::with_capacity(
        response.meta.content_length.unwrap_or(0).min(64 * 1024 * 1024) as usize,
    );
    let mut body = response.body;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        buffer.extend_from_slice(&chunk);
        if let Some(percent) = tracker.advance(chunk.len() as u64) {
            on_progress(percent);
        }
    }
    debug!(task_id, bytes = tracker.loaded(), "download finished");

    let file_name = response
        .meta
        .content_disposition
        .as_deref()
        .and_then(filename_from_disposition)
        .or_else(|| source_name.map(mp3_name))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_owned());

    Ok(DownloadedAudio {
        file_name,
        data: buffer.freeze(),
    })
}

/// Replace the extension of `name` with `.mp3` (or append it).
pub fn mp3_name(name: &str) -> String {
    let base = sanitize_file_name(name);
    match split_extension(&base) {
        (stem, Some(_)) => format!("{stem}.mp3"),
        (stem, None) if !stem.is_empty() => format!("{stem}.mp3"),
        _ => FALLBACK_FILE_NAME.to_owned(),
    }
}

/// Extract the file name from a `Content-Disposition` header value.
///
/// `filename*` (RFC 5987, percent-encoded) wins over plain `filename`.
/// Quoted values may contain `;`.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;
    for (key, value) in disposition_params(header) {
        match key.as_str() {
            "filename*" => {
                let encoded = value.split_once("''").map_or(value, |(_, v)| v);
                extended = percent_decode_str(encoded)
                    .decode_utf8()
                    .ok()
                    .map(|n| n.into_owned());
            }
            "filename" => plain = Some(value.to_owned()),
            _ => {}
        }
    }
    extended
        .or(plain)
        .map(|n| sanitize_file_name(&n))
        .filter(|n| !n.is_empty())
}

/// Split a header value into lowercase `key=value` parameters, keeping
/// quoted values whole.
fn disposition_params(header: &str) -> Vec<(String, &str)> {
    let mut params = Vec::new();
    let mut rest = header;
    while !rest.is_empty() {
        let end = rest.find([';', '=']).unwrap_or(rest.len());
        let key = rest[..end].trim().to_ascii_lowercase();
        if !rest[end..].starts_with('=') {
            rest = rest.get(end + 1..).unwrap_or_default();
            continue;
        }

        let after = rest[end + 1..].trim_start();
        let (value, remaining) = match after.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let inner = &after[1..];
                match inner.find(quote) {
                    Some(close) => (&inner[..close], &inner[close + 1..]),
                    None => (inner, ""),
                }
            }
            _ => {
                let stop = after.find(';').unwrap_or(after.len());
                (after[..stop].trim_end(), &after[stop..])
            }
        };
        params.push((key, value));
        rest = remaining
            .find(';')
            .map_or("", |i| &remaining[i + 1..]);
    }
    params
}

/// Keep only the last path component so a header cannot point outside the
/// download directory.
fn sanitize_file_name(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches('.')
        .to_owned()
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_without_total_reports_nothing() {
        let mut t = ProgressTracker::new(None);
        assert_eq!(t.advance(10), None);
        let mut t = ProgressTracker::new(Some(0));
        assert_eq!(t.advance(10), None);
        assert_eq!(t.loaded(), 10);
    }

    #[test]
    fn tracker_clamps_at_100() {
        let mut t = ProgressTracker::new(Some(100));
        assert_eq!(t.advance(40), Some(40.0));
        assert_eq!(t.advance(70), Some(100.0));
    }

    #[test]
    fn disposition_quoted_and_bare() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"talk.mp3\"").as_deref(),
            Some("talk.mp3")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=talk.mp3").as_deref(),
            Some("talk.mp3")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn disposition_extended_form_wins() {
        let header = "attachment; filename=\"fallback.mp3\"; filename*=UTF-8''%E8%AE%B2%E5%BA%A7.mp3";
        assert_eq!(
            filename_from_disposition(header).as_deref(),
            Some("讲座.mp3")
        );
    }

    #[test]
    fn disposition_cannot_escape_directory() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"../../etc/passwd\"").as_deref(),
            Some("passwd")
        );
    }

    #[test]
    fn mp3_name_replaces_extension() {
        assert_eq!(mp3_name("holiday.mov"), "holiday.mp3");
        assert_eq!(mp3_name("a.b.mp4"), "a.b.mp3");
        assert_eq!(mp3_name("noext"), "noext.mp3");
        assert_eq!(mp3_name(""), FALLBACK_FILE_NAME);
    }

    #[test]
    fn disposition_quoted_value_keeps_semicolons() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"Talk; part 2.mp3\"").as_deref(),
            Some("Talk; part 2.mp3")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename='a;b.mp3'; size=10").as_deref(),
            Some("a;b.mp3")
        );
    }

    #[test]
    fn disposition_extended_form_with_spaces() {
        let header = "attachment; filename*=UTF-8''my%20talk.mp3; filename=\"x.mp3\"";
        assert_eq!(
            filename_from_disposition(header).as_deref(),
            Some("my talk.mp3")
        );
    }

    #[tokio::test]
    async fn save_into_writes_and_numbers_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let audio = DownloadedAudio {
            file_name: "talk.mp3".to_owned(),
            data: Bytes::from_static(b"ID3"),
        };
        let first = audio.save_into(dir.path()).await.unwrap();
        let second = audio.save_into(dir.path()).await.unwrap();
        assert_eq!(first, dir.path().join("talk.mp3"));
        assert_eq!(second, dir.path().join("talk (1).mp3"));
        assert_eq!(std::fs::read(&second).unwrap(), b"ID3");
        assert!(!dir.path().join(".talk.mp3.part").exists());
    }

    #[test]
    fn staged_file_is_removed_unless_committed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".x.part");
        std::fs::write(&path, b"partial").unwrap();
        drop(StagedFile::new(path.clone()));
        assert!(!path.exists());
    }
}
