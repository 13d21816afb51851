//! Adaptive decode engine boundary
//!
//! The engine that turns a playlist URL into decoded media on a sink is an
//! external collaborator (hls.js in a browser, a native HLS stack elsewhere).
//! The session only needs to create one, bind it to the primary sink, point
//! it at a playlist and destroy it again.

use crate::sink::{MediaSink, SinkTicket};
use serde::{Deserialize, Serialize};

/// Identifies one engine instance
///
/// Hosts pass it back with every [`EngineEvent`]; events from destroyed
/// engines are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineTicket(pub(crate) u64);

impl EngineTicket {
    /// Raw ticket number
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Error family reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineErrorType {
    /// Playlist, key or fragment fetch failed
    Network,
    /// Demuxing/decoding failed (unsupported codec or container)
    Media,
    /// Anything else the engine cannot continue from
    Other,
}

/// Events fired by an adaptive engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Playlist loaded and parsed
    ManifestParsed { levels: usize },

    /// Engine switched to another quality level
    LevelSwitched { level: usize },

    /// Engine error; `fatal` errors stop the engine
    Error {
        fatal: bool,
        kind: EngineErrorType,
        details: String,
    },
}

/// Options handed to the engine on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Load retries before a fetch failure is reported as fatal
    pub max_load_retries: u32,
}

/// One adaptive decode engine instance
pub trait AdaptiveEngine: Send {
    /// Bind the engine's output to `sink`
    ///
    /// Sink events must be delivered with `sink_ticket`.
    fn attach_media(&mut self, sink: &mut dyn MediaSink, sink_ticket: SinkTicket);

    /// Start loading a playlist
    fn load_source(&mut self, playlist_url: &str);

    /// Stop loading and release every internal resource
    fn destroy(&mut self);
}

/// Creates engine instances
pub trait AdaptiveEngineFactory: Send {
    /// Whether the platform can run the engine at all
    ///
    /// When it cannot, the playlist is handed directly to the sink (native
    /// HLS support).
    fn is_supported(&self) -> bool {
        true
    }

    /// Create an engine that reports its events with `ticket`
    fn create(&mut self, options: EngineOptions, ticket: EngineTicket) -> Box<dyn AdaptiveEngine>;
}
