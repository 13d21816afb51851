//! Shared control handle
//!
//! The imperative surface hosts keep around: a cloneable handle over one
//! session, plus a serializable command form of every control call.

use crate::engine::{EngineEvent, EngineTicket};
use crate::error::Result;
use crate::session::PlaybackSession;
use crate::sink::{SinkEvent, SinkTicket};
use crate::source::PlaybackSource;
use crate::types::{ErrorKind, PlaybackState};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Control calls as data
///
/// ```
/// use segue_playback::PlaybackCommand;
///
/// let cmd: PlaybackCommand =
///     serde_json::from_str(r#"{"command":"seek","position_secs":12.5}"#).unwrap();
/// assert_eq!(cmd, PlaybackCommand::Seek { position_secs: 12.5 });
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PlaybackCommand {
    /// Attach a source and start it from zero
    Play { source: PlaybackSource },

    Pause,

    Resume,

    TogglePlay,

    /// Seek to a virtual time in seconds
    Seek { position_secs: f64 },

    /// Change the playback rate (clamped)
    SetRate { rate: f64 },

    /// Detach the source
    Stop,

    /// Continue past a failed sequential segment
    SkipFailedSegment,
}

/// Cloneable handle to a [`PlaybackSession`]
///
/// Every call locks the session for its duration, so listener callbacks must
/// not call back into a handle of the same session.
#[derive(Clone)]
pub struct PlaybackHandle {
    session: Arc<Mutex<PlaybackSession>>,
}

impl PlaybackHandle {
    pub fn new(session: PlaybackSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
        }
    }

    pub fn play(&self, source: PlaybackSource) -> Result<()> {
        self.lock().play(source)
    }

    pub fn pause(&self) {
        self.lock().pause();
    }

    pub fn resume(&self) {
        self.lock().resume();
    }

    pub fn toggle_play(&self) {
        self.lock().toggle_play();
    }

    pub fn seek(&self, position_secs: f64) {
        self.lock().seek(position_secs);
    }

    /// Returns the rate actually applied
    pub fn set_playback_rate(&self, rate: f64) -> f64 {
        self.lock().set_playback_rate(rate)
    }

    pub fn stop(&self) {
        self.lock().stop();
    }

    pub fn skip_failed_segment(&self) -> Result<()> {
        self.lock().skip_failed_segment()
    }

    pub fn apply(&self, command: PlaybackCommand) -> Result<()> {
        self.lock().apply(command)
    }

    /// Forward a sink event together with the ticket it was loaded with
    pub fn deliver_sink_event(&self, ticket: SinkTicket, event: SinkEvent) {
        self.lock().handle_sink_event(ticket, event);
    }

    /// Forward an adaptive engine event
    pub fn deliver_engine_event(&self, ticket: EngineTicket, event: EngineEvent) {
        self.lock().handle_engine_event(ticket, event);
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state()
    }

    pub fn current_time(&self) -> f64 {
        self.lock().current_time()
    }

    pub fn duration(&self) -> Option<f64> {
        self.lock().duration()
    }

    pub fn playback_rate(&self) -> f64 {
        self.lock().playback_rate()
    }

    pub fn source(&self) -> Option<PlaybackSource> {
        self.lock().source().cloned()
    }

    pub fn segment_index(&self) -> Option<usize> {
        self.lock().segment_index()
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.lock().error()
    }

    /// Run `f` with exclusive access to the session
    pub fn with_session<R>(&self, f: impl FnOnce(&mut PlaybackSession) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
