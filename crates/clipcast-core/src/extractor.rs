//! Video link extraction from raw links or shared text.
//!
//! Share buttons on short-video apps produce text such as
//! `"7.43 复制打开抖音，看看【作品】 https://v.douyin.com/abcDE/ 。"`; this
//! module pulls the playable link out of it.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

/// Link patterns in priority order.  When text matches several patterns the
/// earlier entry wins, regardless of where in the text each match starts.
const LINK_PATTERNS: &[&str] = &[
    // douyin: short link, canonical video path, any other page
    r"https?://v\.douyin\.com/[A-Za-z0-9_-]+/?",
    r"https?://www\.douyin\.com/video/\d+",
    r"https?://(?:www\.)?douyin\.com/\S+",
    // kuaishou
    r"https?://v\.kuaishou\.com/[A-Za-z0-9_-]+/?",
    r"https?://www\.kuaishou\.com/\S+",
    // tiktok
    r"https?://(?:www\.)?tiktok\.com/\S+",
    r"https?://vm\.tiktok\.com/[A-Za-z0-9_-]+/?",
];

/// Hosts whose short links only resolve with a trailing slash.
const SHORT_LINK_HOSTS: &[&str] = &["v.douyin.com"];

/// Trailing punctuation stripped from a match, ASCII and full-width.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', '!', '?', '。', '，', '；', '！', '？'];

static COMPILED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    LINK_PATTERNS
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = p, error = %e, "invalid link pattern");
                None
            }
        })
        .collect()
});

/// Normalize `text` into a canonical video URL.
///
/// Returns `text` verbatim when it already is an absolute http/https URL.
/// Otherwise returns the first match of the highest-priority pattern, with
/// trailing punctuation removed and a trailing slash added for short-link
/// hosts.  Returns `None` when nothing matches.
pub fn extract(text: &str) -> Option<String> {
    if is_http_url(text) {
        return Some(text.to_owned());
    }

    let found = COMPILED.iter().find_map(|re| re.find(text))?;
    let mut url = found
        .as_str()
        .trim_end_matches(TRAILING_PUNCTUATION)
        .to_owned();

    if is_short_link(&url) && !url.ends_with('/') {
        url.push('/');
    }
    Some(url)
}

/// `true` when `text` parses as an absolute URL with an `http` or `https`
/// scheme.  Text containing whitespace is never a URL, even though the URL
/// parser would percent-encode inner spaces.
pub fn is_http_url(text: &str) -> bool {
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return false;
    }
    match Url::parse(text) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

fn is_short_link(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| SHORT_LINK_HOSTS.contains(&h)))
        .unwrap_or(false)
}
