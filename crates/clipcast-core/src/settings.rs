//! Encode settings chosen before submission.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The only encoder the backend is asked to use.
pub const AUDIO_CODEC: &str = "libmp3lame";

/// Output bitrate options offered to the user.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
    AsRefStr, Display, EnumString, EnumIter,
)]
pub enum AudioBitrate {
    #[serde(rename = "128k")]
    #[strum(serialize = "128k")]
    Kbps128,
    #[default]
    #[serde(rename = "192k")]
    #[strum(serialize = "192k")]
    Kbps192,
    #[serde(rename = "256k")]
    #[strum(serialize = "256k")]
    Kbps256,
    #[serde(rename = "320k")]
    #[strum(serialize = "320k")]
    Kbps320,
}

/// Output sample rate options offered to the user.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
    AsRefStr, Display, EnumString, EnumIter,
)]
pub enum SampleRate {
    #[serde(rename = "22050")]
    #[strum(serialize = "22050")]
    Hz22050,
    #[default]
    #[serde(rename = "44100")]
    #[strum(serialize = "44100")]
    Hz44100,
    #[serde(rename = "48000")]
    #[strum(serialize = "48000")]
    Hz48000,
}

/// User-chosen settings for one conversion.
///
/// An empty `title` means "let the controller pick": the file name for
/// uploads, a fixed label for link conversions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeSettings {
    pub title: String,
    pub audio_bitrate: AudioBitrate,
    pub sample_rate: SampleRate,
}

impl EncodeSettings {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_bitrate(mut self, bitrate: AudioBitrate) -> Self {
        self.audio_bitrate = bitrate;
        self
    }

    pub fn with_sample_rate(mut self, rate: SampleRate) -> Self {
        self.sample_rate = rate;
        self
    }

    /// The trimmed title, or `fallback` when none was entered.
    pub fn title_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.title.trim() {
            "" => fallback,
            t => t,
        }
    }
}
