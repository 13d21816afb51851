//! Playback sources
//!
//! The source shape is the only data contract visible outside the engine:
//! `{ "playlistUrl": ... }` for adaptive streams and
//! `{ "segments": [{ "url": ..., "durationHintSeconds": ... }] }` for
//! sequential lists.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// One independent media file of a sequential source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDescriptor {
    /// Resource URL handed to the media sink
    pub url: String,

    /// Expected duration, used until the real duration is measured
    #[serde(
        default,
        rename = "durationHintSeconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_hint_secs: Option<f64>,
}

impl SegmentDescriptor {
    /// Segment without a duration hint
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            duration_hint_secs: None,
        }
    }

    /// Segment with a duration hint
    pub fn with_hint(url: impl Into<String>, hint_secs: f64) -> Self {
        Self {
            url: url.into(),
            duration_hint_secs: Some(hint_secs),
        }
    }
}

/// What the session plays
///
/// Immutable once attached; replacing it goes through another `play`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaybackSource {
    /// Single adaptive playlist driven by the decode engine
    #[serde(rename_all = "camelCase")]
    Adaptive { playlist_url: String },

    /// Ordered list of files played one after another on the sink
    Sequential { segments: Vec<SegmentDescriptor> },
}

/// Driver family selected for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Adaptive,
    Sequential,
}

impl PlaybackSource {
    /// Adaptive source for a playlist URL
    pub fn adaptive(playlist_url: impl Into<String>) -> Self {
        Self::Adaptive {
            playlist_url: playlist_url.into(),
        }
    }

    /// Sequential source from segment descriptors
    pub fn sequential(segments: impl IntoIterator<Item = SegmentDescriptor>) -> Self {
        Self::Sequential {
            segments: segments.into_iter().collect(),
        }
    }

    /// Classify plain URLs into a source
    ///
    /// A single playlist URL (`.m3u8`) becomes an adaptive source; anything
    /// else becomes a sequential source without hints. Playlists cannot be
    /// chained inside a sequential list.
    pub fn from_urls<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();

        match urls.as_slice() {
            [] => Err(PlaybackError::EmptySource),
            [single] if is_playlist_url(single) => Ok(Self::adaptive(single.clone())),
            many => {
                if let Some(playlist) = many.iter().find(|u| is_playlist_url(u)) {
                    return Err(PlaybackError::InvalidSource(format!(
                        "playlist {} cannot be part of a sequential source",
                        playlist
                    )));
                }
                let source = Self::sequential(many.iter().cloned().map(SegmentDescriptor::new));
                source.validate()?;
                Ok(source)
            }
        }
    }

    /// Driver family for this source
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Adaptive { .. } => SourceKind::Adaptive,
            Self::Sequential { .. } => SourceKind::Sequential,
        }
    }

    /// Number of physical resources (1 for adaptive)
    pub fn resource_count(&self) -> usize {
        match self {
            Self::Adaptive { .. } => 1,
            Self::Sequential { segments } => segments.len(),
        }
    }

    /// Check URLs and hints before attaching
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Adaptive { playlist_url } => validate_url(playlist_url),
            Self::Sequential { segments } => {
                if segments.is_empty() {
                    return Err(PlaybackError::EmptySource);
                }
                for (index, segment) in segments.iter().enumerate() {
                    validate_url(&segment.url)?;
                    if let Some(hint) = segment.duration_hint_secs {
                        if !hint.is_finite() || hint < 0.0 {
                            return Err(PlaybackError::InvalidSource(format!(
                                "segment {} has invalid duration hint {}",
                                index, hint
                            )));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

/// Whether a URL points at an HLS playlist
pub fn is_playlist_url(raw: &str) -> bool {
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        // Relative references keep everything before query/fragment
        Err(_) => raw
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or(raw)
            .to_string(),
    };

    path.to_ascii_lowercase().ends_with(".m3u8")
}

fn validate_url(raw: &str) -> Result<()> {
    if raw.trim().is_empty() {
        return Err(PlaybackError::InvalidSource("empty URL".to_string()));
    }

    match Url::parse(raw) {
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => Ok(()),
        Err(e) => Err(PlaybackError::InvalidSource(format!("{}: {}", raw, e))),
    }
}
