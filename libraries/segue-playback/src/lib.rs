//! Segue Player - Segmented Video Playback
//!
//! Platform-agnostic playback engine for Segue Player.
//!
//! This crate provides:
//! - One control surface (`play`, `pause`, `resume`, `seek`,
//!   `set_playback_rate`, `stop`) for adaptive playlists and for ordered
//!   lists of independent files
//! - A virtual timeline over segment lists: continuous time and duration
//!   across file boundaries, refined as real durations become known
//! - Gapless segment transitions by preloading on a standby sink
//! - Error classification into `network`, `media` and `segment-unavailable`
//! - Rate persistence across every resource change
//!
//! # Architecture
//!
//! `segue-playback` knows nothing about any concrete renderer or decoder:
//! - The media sink (video element, native player view, simulator) is a
//!   [`MediaSink`]
//! - The adaptive decode engine is an [`AdaptiveEngineFactory`]
//! - Notifications go to a [`PlaybackListener`]
//!
//! Hosts forward sink and engine events together with the ticket they were
//! issued; events from replaced resources are dropped by the session.
//!
//! # Example: Sequential Source
//!
//! ```rust
//! use segue_playback::{
//!     EventLog, MediaSink, PlaybackConfig, PlaybackSession, PlaybackSource, PlaybackState,
//!     SegmentDescriptor, SinkEvent, SinkTicket,
//! };
//! use std::sync::{Arc, Mutex};
//!
//! // A sink that remembers the ticket of its current resource
//! #[derive(Clone, Default)]
//! struct HeadlessSink(Arc<Mutex<Option<SinkTicket>>>);
//!
//! impl MediaSink for HeadlessSink {
//!     fn load(&mut self, _url: &str, ticket: SinkTicket) {
//!         *self.0.lock().unwrap() = Some(ticket);
//!     }
//!     fn unload(&mut self) {}
//!     fn play(&mut self) {}
//!     fn pause(&mut self) {}
//!     fn seek(&mut self, _position_secs: f64) {}
//!     fn set_rate(&mut self, _rate: f64) {}
//!     fn current_time(&self) -> f64 {
//!         0.0
//!     }
//!     fn duration(&self) -> Option<f64> {
//!         None
//!     }
//! }
//!
//! let sink = HeadlessSink::default();
//! let events = EventLog::new();
//! let mut session =
//!     PlaybackSession::new(PlaybackConfig::default(), sink.clone(), events.clone()).unwrap();
//!
//! session
//!     .play(PlaybackSource::sequential([
//!         SegmentDescriptor::with_hint("a.mp4", 10.0),
//!         SegmentDescriptor::with_hint("b.mp4", 5.0),
//!     ]))
//!     .unwrap();
//! assert_eq!(session.duration(), Some(15.0));
//!
//! // The host forwards the sink's native events with their ticket
//! let ticket = sink.0.lock().unwrap().unwrap();
//! session.handle_sink_event(ticket, SinkEvent::CanPlay);
//! assert_eq!(session.state(), PlaybackState::Playing);
//! ```
//!
//! # Example: Rate and Seek Policy
//!
//! ```rust
//! use segue_playback::policy::{clamp_rate, resolve_seek_target, SeekTarget};
//! use segue_playback::timeline::SegmentTable;
//!
//! assert_eq!(clamp_rate(5.0), 3.0);
//!
//! let mut table = SegmentTable::from_hints([Some(10.0), Some(10.0)], 0.0);
//! table.record(0, 10.0);
//! table.record(1, 10.0);
//!
//! // A boundary resolves to the start of the later segment
//! assert_eq!(
//!     resolve_seek_target(10.0, &table),
//!     Some(SeekTarget::Exact { index: 1, local_time: 0.0 })
//! );
//! ```

mod adaptive;
mod driver;
mod engine;
mod error;
mod events;
mod handle;
pub mod policy;
mod sequential;
mod session;
mod sink;
mod source;
pub mod timeline;
pub mod types;

// Public exports
pub use engine::{
    AdaptiveEngine, AdaptiveEngineFactory, EngineErrorType, EngineEvent, EngineOptions,
    EngineTicket,
};
pub use error::{PlaybackError, Result};
pub use events::{Callbacks, EventLog, NullListener, PlaybackEvent, PlaybackListener};
pub use handle::{PlaybackCommand, PlaybackHandle};
pub use session::PlaybackSession;
pub use sink::{MediaSink, SinkEvent, SinkSlot, SinkTicket};
pub use source::{is_playlist_url, PlaybackSource, SegmentDescriptor, SourceKind};
pub use types::{ErrorKind, PlaybackConfig, PlaybackState};
