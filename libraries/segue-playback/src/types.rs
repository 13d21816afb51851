//! Core types for playback management

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slowest supported playback rate
pub const MIN_PLAYBACK_RATE: f64 = 0.5;

/// Fastest supported playback rate
pub const MAX_PLAYBACK_RATE: f64 = 3.0;

/// Rate used when none was requested (or the request was not a number)
pub const DEFAULT_PLAYBACK_RATE: f64 = 1.0;

/// Playback state
///
/// Exactly one state is active per session at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No source attached
    Idle,

    /// Source attached, first resource not ready yet
    Loading,

    /// Currently playing
    Playing,

    /// Paused mid-source
    Paused,

    /// Playing intent, but the sink ran out of data
    Buffering,

    /// Reached the end of the source
    Ended,

    /// Current source failed; waiting for a new `play`
    Errored,
}

impl PlaybackState {
    /// Whether the session currently has a source it is able to drive
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Errored)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Buffering => "buffering",
            Self::Ended => "ended",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Kind of failure reported through `on_error`
///
/// Seek targets outside the timeline are clamped and never reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Playlist or segment fetch failed after the engine's retries
    Network,

    /// Codec or container not supported
    Media,

    /// One entry of a sequential source failed to load
    SegmentUnavailable {
        /// Index of the failed segment
        index: usize,
    },
}

impl ErrorKind {
    /// Stable name of the kind (`network`, `media`, `segment-unavailable`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Media => "media",
            Self::SegmentUnavailable { .. } => "segment-unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentUnavailable { index } => write!(f, "segment-unavailable[{}]", index),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Configuration for a playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Remaining time in the current segment at which the next one is
    /// preloaded (default: 1.0s)
    pub preload_threshold_secs: f64,

    /// Rate applied to the first source (default: 1.0)
    pub initial_rate: f64,

    /// Load retries handed to the adaptive engine before it reports a fatal
    /// network error (default: 3)
    pub network_retry_budget: u32,

    /// Start playing as soon as the first resource is ready (default: true)
    pub autoplay: bool,

    /// Length assumed for segments with neither a hint nor a measurement
    /// (default: 0.0)
    pub unknown_segment_estimate_secs: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            preload_threshold_secs: 1.0,
            initial_rate: DEFAULT_PLAYBACK_RATE,
            network_retry_budget: 3,
            autoplay: true,
            unknown_segment_estimate_secs: 0.0,
        }
    }
}

impl PlaybackConfig {
    /// Validate the configuration
    ///
    /// Negative or non-finite durations are rejected; the initial rate is
    /// clamped into the supported range.
    pub fn validate(mut self) -> Result<Self> {
        if !self.preload_threshold_secs.is_finite() || self.preload_threshold_secs < 0.0 {
            return Err(PlaybackError::InvalidConfig(format!(
                "preload_threshold_secs must be a non-negative number, got {}",
                self.preload_threshold_secs
            )));
        }

        if !self.unknown_segment_estimate_secs.is_finite()
            || self.unknown_segment_estimate_secs < 0.0
        {
            return Err(PlaybackError::InvalidConfig(format!(
                "unknown_segment_estimate_secs must be a non-negative number, got {}",
                self.unknown_segment_estimate_secs
            )));
        }

        self.initial_rate = crate::policy::clamp_rate(self.initial_rate);
        Ok(self)
    }
}
