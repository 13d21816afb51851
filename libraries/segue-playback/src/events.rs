//! Playback Events
//!
//! Callbacks the session invokes on its host. All of them run synchronously
//! on the thread that drove the session (a control call or an event
//! delivery), so a listener must not call back into the same session.
//!
//! - `on_time_update`: virtual clock advanced (monotonic within a segment
//!   list, across boundaries)
//! - `on_duration_change`: virtual duration changed
//! - `on_state_change`: state machine moved
//! - `on_error`: current source failed (at most once per source)

use crate::types::{ErrorKind, PlaybackState};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Receiver of session notifications
///
/// Every method has a no-op default so hosts only implement what they show.
pub trait PlaybackListener: Send {
    /// Virtual time in seconds
    fn on_time_update(&mut self, _time_secs: f64) {}

    /// Virtual duration in seconds (sum of best known segment lengths for
    /// sequential sources)
    fn on_duration_change(&mut self, _duration_secs: f64) {}

    fn on_state_change(&mut self, _state: PlaybackState) {}

    fn on_error(&mut self, _kind: ErrorKind, _message: &str) {}

    /// Adaptive engine switched to quality `level`
    fn on_quality_change(&mut self, _level: usize) {}

    /// Sequential source moved to segment `index`
    fn on_segment_change(&mut self, _index: usize) {}
}

/// Listener that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl PlaybackListener for NullListener {}

/// Notification as a value, for logs and replays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    TimeUpdate { time_secs: f64 },
    DurationChange { duration_secs: f64 },
    StateChange { state: PlaybackState },
    Error { kind: ErrorKind, message: String },
    QualityChange { level: usize },
    SegmentChange { index: usize },
}

/// Listener that records every notification
///
/// Clones share the same log, so one clone can go into the session while
/// the host keeps another to read from.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PlaybackEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all recorded events
    pub fn drain(&self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Copy of all recorded events
    pub fn snapshot(&self) -> Vec<PlaybackEvent> {
        self.lock().clone()
    }

    /// Recorded state changes, in order
    pub fn states(&self) -> Vec<PlaybackState> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                PlaybackEvent::StateChange { state } => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Recorded time updates, in order
    pub fn times(&self) -> Vec<f64> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                PlaybackEvent::TimeUpdate { time_secs } => Some(*time_secs),
                _ => None,
            })
            .collect()
    }

    /// Recorded errors, in order
    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                PlaybackEvent::Error { kind, message } => Some((*kind, message.clone())),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: PlaybackEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PlaybackEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PlaybackListener for EventLog {
    fn on_time_update(&mut self, time_secs: f64) {
        self.push(PlaybackEvent::TimeUpdate { time_secs });
    }

    fn on_duration_change(&mut self, duration_secs: f64) {
        self.push(PlaybackEvent::DurationChange { duration_secs });
    }

    fn on_state_change(&mut self, state: PlaybackState) {
        self.push(PlaybackEvent::StateChange { state });
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        self.push(PlaybackEvent::Error {
            kind,
            message: message.to_string(),
        });
    }

    fn on_quality_change(&mut self, level: usize) {
        self.push(PlaybackEvent::QualityChange { level });
    }

    fn on_segment_change(&mut self, index: usize) {
        self.push(PlaybackEvent::SegmentChange { index });
    }
}

type Callback<T> = Option<Box<dyn FnMut(T) + Send>>;

/// Listener assembled from closures
///
/// ```
/// use segue_playback::Callbacks;
///
/// let listener = Callbacks::new()
///     .time_update(|t| println!("at {:.1}s", t))
///     .state_change(|s| println!("now {}", s));
/// # drop(listener);
/// ```
#[derive(Default)]
pub struct Callbacks {
    time_update: Callback<f64>,
    duration_change: Callback<f64>,
    state_change: Callback<PlaybackState>,
    error: Option<Box<dyn FnMut(ErrorKind, &str) + Send>>,
    quality_change: Callback<usize>,
    segment_change: Callback<usize>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn time_update(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.time_update = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn duration_change(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.duration_change = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn state_change(mut self, f: impl FnMut(PlaybackState) + Send + 'static) -> Self {
        self.state_change = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn error(mut self, f: impl FnMut(ErrorKind, &str) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn quality_change(mut self, f: impl FnMut(usize) + Send + 'static) -> Self {
        self.quality_change = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn segment_change(mut self, f: impl FnMut(usize) + Send + 'static) -> Self {
        self.segment_change = Some(Box::new(f));
        self
    }
}

impl PlaybackListener for Callbacks {
    fn on_time_update(&mut self, time_secs: f64) {
        if let Some(f) = self.time_update.as_mut() {
            f(time_secs);
        }
    }

    fn on_duration_change(&mut self, duration_secs: f64) {
        if let Some(f) = self.duration_change.as_mut() {
            f(duration_secs);
        }
    }

    fn on_state_change(&mut self, state: PlaybackState) {
        if let Some(f) = self.state_change.as_mut() {
            f(state);
        }
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        if let Some(f) = self.error.as_mut() {
            f(kind, message);
        }
    }

    fn on_quality_change(&mut self, level: usize) {
        if let Some(f) = self.quality_change.as_mut() {
            f(level);
        }
    }

    fn on_segment_change(&mut self, index: usize) {
        if let Some(f) = self.segment_change.as_mut() {
            f(index);
        }
    }
}
