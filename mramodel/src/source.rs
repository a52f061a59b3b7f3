//! Playback sources and output format preferences.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What the audio engine reads from.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackSource {
    /// Local file.
    File { path: PathBuf },
    /// HTTP(S) stream, with optional request headers and a decryption hint
    /// the engine passes through opaquely.
    Http {
        url: String,
        headers: Vec<(String, String)>,
        decryption_hint: Option<String>,
    },
    /// Raw PCM delivered over an in-process pipe (external input receivers).
    PcmPipe { label: String },
}

impl PlaybackSource {
    pub fn http(url: impl Into<String>) -> Self {
        PlaybackSource::Http {
            url: url.into(),
            headers: Vec::new(),
            decryption_hint: None,
        }
    }

    /// True for sources where a failed engine start warrants one retry
    /// (radio and plain URL inputs; a local file failing once will fail again).
    pub fn is_restartable(&self) -> bool {
        matches!(self, PlaybackSource::Http { .. })
    }
}

/// Encoded sub-stream profile produced by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProfile {
    Mp3,
    Aac,
    Pcm,
    Opus,
    Flac,
}

impl StreamProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProfile::Mp3 => "mp3",
            StreamProfile::Aac => "aac",
            StreamProfile::Pcm => "pcm",
            StreamProfile::Opus => "opus",
            StreamProfile::Flac => "flac",
        }
    }
}

/// Output format preference reported by a zone's primary output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredOutput {
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
    /// Bytes to buffer before the first chunk is released to subscribers.
    pub prebuffer_bytes: usize,
}

impl Default for PreferredOutput {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bit_depth: 16,
            prebuffer_bytes: 64 * 1024,
        }
    }
}

impl PreferredOutput {
    /// Prebuffer clamp applied to radio and local-queue HTTP sources to cut
    /// startup latency.
    pub const LOW_LATENCY_PREBUFFER: usize = 8 * 1024;

    pub fn with_low_latency_prebuffer(mut self) -> Self {
        self.prebuffer_bytes = self.prebuffer_bytes.min(Self::LOW_LATENCY_PREBUFFER);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_latency_clamp() {
        let preferred = PreferredOutput::default().with_low_latency_prebuffer();
        assert_eq!(preferred.prebuffer_bytes, PreferredOutput::LOW_LATENCY_PREBUFFER);

        let tiny = PreferredOutput {
            prebuffer_bytes: 1024,
            ..Default::default()
        }
        .with_low_latency_prebuffer();
        assert_eq!(tiny.prebuffer_bytes, 1024);
    }

    #[test]
    fn test_restartable_sources() {
        assert!(PlaybackSource::http("http://example.com/s.mp3").is_restartable());
        assert!(!PlaybackSource::File { path: "/tmp/a.flac".into() }.is_restartable());
    }
}
