//! Client configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use crate::session::MAX_FILE_SIZE;

/// API prefix appended to a hosting origin.
pub const API_PREFIX: &str = "/api/v1";

/// Base used when no hosting origin is known (local development).
pub const LOCAL_API_BASE: &str = "http://localhost:8080/api/v1";

/// Runtime configuration for the clipcast client.
///
/// Every field has a default so the client works without any environment
/// variables set.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full API base including the `/api/v1` prefix.
    pub api_base: String,

    /// Interval between status requests while a conversion runs
    /// (default: 2000 ms).
    pub poll_interval: Duration,

    /// Largest file accepted for upload, in bytes (default: 500 MiB).
    pub max_file_size: u64,

    /// Per-read timeout for HTTP requests (default: 300 s).
    pub request_timeout: Duration,

    /// HTTP/HTTPS proxy URL.
    pub proxy: Option<String>,

    /// Directory downloads are saved into (default: current directory).
    pub download_dir: PathBuf,

    /// `tracing` filter string, e.g. `"info"` or `"debug,reqwest=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: LOCAL_API_BASE.to_owned(),
            poll_interval: Duration::from_millis(2000),
            max_file_size: MAX_FILE_SIZE,
            request_timeout: Duration::from_secs(300),
            proxy: None,
            download_dir: PathBuf::from("."),
            log_level: "info".to_owned(),
            log_json: false,
        }
    }
}

impl ClientConfig {
    /// Build [`ClientConfig`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let origin = std::env::var("CLIPCAST_ORIGIN").ok();
        Self {
            api_base: std::env::var("CLIPCAST_API_BASE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| resolve_api_base(origin.as_deref())),
            poll_interval: Duration::from_millis(parse_env("CLIPCAST_POLL_INTERVAL_MS", 2000)),
            max_file_size: mib(parse_env("CLIPCAST_MAX_FILE_MB", 500)),
            request_timeout: Duration::from_secs(parse_env("CLIPCAST_TIMEOUT_SECS", 300)),
            proxy: std::env::var("HTTP_PROXY")
                .ok()
                .or_else(|| std::env::var("HTTPS_PROXY").ok()),
            download_dir: std::env::var("CLIPCAST_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            log_level: env_or("CLIPCAST_LOG", &defaults.log_level),
            log_json: std::env::var("CLIPCAST_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }
}

/// Derive the API base from the origin the client is served from.
///
/// No origin (opened from disk, or run outside a browser) means local
/// development against `localhost:8080`; otherwise the API lives under
/// `/api/v1` of the same origin.
pub fn resolve_api_base(origin: Option<&str>) -> String {
    match origin.map(str::trim).filter(|o| !o.is_empty()) {
        Some(o) if !o.starts_with("file:") => {
            format!("{}{}", o.trim_end_matches('/'), API_PREFIX)
        }
        _ => LOCAL_API_BASE.to_owned(),
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn mib(n: u64) -> u64 {
    n.saturating_mul(1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.api_base, LOCAL_API_BASE);
        assert_eq!(c.poll_interval, Duration::from_millis(2000));
        assert_eq!(c.max_file_size, 500 * 1024 * 1024);
        assert!(c.proxy.is_none());
    }

    #[test]
    fn api_base_from_origin() {
        assert_eq!(resolve_api_base(None), LOCAL_API_BASE);
        assert_eq!(resolve_api_base(Some("file://")), LOCAL_API_BASE);
        assert_eq!(resolve_api_base(Some("  ")), LOCAL_API_BASE);
        assert_eq!(
            resolve_api_base(Some("https://convert.example.com/")),
            "https://convert.example.com/api/v1"
        );
        assert_eq!(
            resolve_api_base(Some("http://10.0.0.5:9002")),
            "http://10.0.0.5:9002/api/v1"
        );
    }

    #[test]
    fn builder_overrides() {
        let c = ClientConfig::default()
            .with_api_base("http://h/api/v1")
            .with_poll_interval(Duration::from_millis(5))
            .with_max_file_size(10)
            .with_proxy("http://proxy:8080")
            .with_download_dir("/tmp/out");
        assert_eq!(c.api_base, "http://h/api/v1");
        assert_eq!(c.poll_interval, Duration::from_millis(5));
        assert_eq!(c.max_file_size, 10);
        assert_eq!(c.proxy.as_deref(), Some("http://proxy:8080"));
        assert_eq!(c.download_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn huge_file_limit_saturates() {
        assert_eq!(mib(500), 500 * 1024 * 1024);
        assert_eq!(mib(u64::MAX / 1024), u64::MAX);
    }
}
