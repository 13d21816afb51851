//! Platform-agnostic media sink trait
//!
//! A sink is the rendering primitive (video element, native player view,
//! headless simulator) the engine points at one resource at a time.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Identifies one load or bind of a sink
///
/// Sinks must pass the ticket they were loaded with back alongside every
/// event. Tickets are never reused, so events from a resource that has since
/// been replaced are recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SinkTicket(u64);

impl SinkTicket {
    /// Raw ticket number
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Which of the session's sinks an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SinkSlot {
    /// The sink the host renders
    Primary,
    /// Optional standby sink used to preload the next segment
    Secondary,
}

impl SinkSlot {
    /// The other slot
    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }
}

/// Native events fired by a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkEvent {
    /// Enough data to start rendering
    CanPlay,
    /// Rendering (re)started after a play request or a stall
    Playing,
    /// Clock advanced
    TimeUpdate,
    /// Resource duration became known or changed
    DurationChange,
    /// Buffer ran dry during playback
    Waiting,
    /// Network stopped delivering data
    Stalled,
    /// Resource played to its end
    Ended,
    /// Resource failed to load or decode
    Error { message: String },
}

/// Platform-agnostic media sink
///
/// All operations are requests: they return immediately and their effect is
/// observed later through [`SinkEvent`]s delivered with the load's ticket.
pub trait MediaSink: Send {
    /// Point the sink at a resource, aborting any load in flight
    fn load(&mut self, url: &str, ticket: SinkTicket);

    /// Drop the current resource; no further events for its ticket
    fn unload(&mut self);

    /// Start or resume rendering
    fn play(&mut self);

    /// Pause rendering
    fn pause(&mut self);

    /// Seek within the current resource (seconds from its start)
    fn seek(&mut self, position_secs: f64);

    /// Set the native playback rate
    ///
    /// Native rates reset whenever the resource changes.
    fn set_rate(&mut self, rate: f64);

    /// Clock of the current resource in seconds
    fn current_time(&self) -> f64;

    /// Duration of the current resource, once known
    fn duration(&self) -> Option<f64>;
}

/// The sinks owned by a session plus the ticket currently valid on each
pub(crate) struct SinkSet {
    primary: Box<dyn MediaSink>,
    secondary: Option<Box<dyn MediaSink>>,
    tickets: [Option<SinkTicket>; 2],
    next_ticket: u64,
}

impl SinkSet {
    pub(crate) fn new(primary: Box<dyn MediaSink>) -> Self {
        Self {
            primary,
            secondary: None,
            tickets: [None, None],
            next_ticket: 1,
        }
    }

    pub(crate) fn set_secondary(&mut self, sink: Box<dyn MediaSink>) {
        self.release(SinkSlot::Secondary);
        self.secondary = Some(sink);
    }

    pub(crate) fn has(&self, slot: SinkSlot) -> bool {
        match slot {
            SinkSlot::Primary => true,
            SinkSlot::Secondary => self.secondary.is_some(),
        }
    }

    pub(crate) fn get(&self, slot: SinkSlot) -> Option<&dyn MediaSink> {
        match slot {
            SinkSlot::Primary => Some(self.primary.as_ref()),
            SinkSlot::Secondary => self.secondary.as_deref(),
        }
    }

    pub(crate) fn get_mut(&mut self, slot: SinkSlot) -> Option<&mut (dyn MediaSink + 'static)> {
        match slot {
            SinkSlot::Primary => Some(self.primary.as_mut()),
            SinkSlot::Secondary => self.secondary.as_deref_mut(),
        }
    }

    /// Issue a fresh ticket for `slot`, invalidating the previous one
    ///
    /// Used when something other than the session (the adaptive engine)
    /// feeds the sink.
    pub(crate) fn bind(&mut self, slot: SinkSlot) -> Option<SinkTicket> {
        if !self.has(slot) {
            return None;
        }
        let ticket = SinkTicket(self.next_ticket);
        self.next_ticket += 1;
        self.tickets[slot.index()] = Some(ticket);
        Some(ticket)
    }

    /// Load `url` into `slot` under a fresh ticket
    pub(crate) fn load(&mut self, slot: SinkSlot, url: &str) -> Option<SinkTicket> {
        let ticket = self.bind(slot)?;
        if let Some(sink) = self.get_mut(slot) {
            sink.load(url, ticket);
        }
        trace!(?slot, ticket = ticket.id(), url, "Sink load");
        Some(ticket)
    }

    /// Unload `slot` if it holds a resource
    pub(crate) fn release(&mut self, slot: SinkSlot) {
        if self.tickets[slot.index()].take().is_some() {
            if let Some(sink) = self.get_mut(slot) {
                sink.unload();
            }
            trace!(?slot, "Sink released");
        }
    }

    pub(crate) fn release_all(&mut self) {
        self.release(SinkSlot::Primary);
        self.release(SinkSlot::Secondary);
    }

    /// Slot currently holding `ticket`, if the ticket is still valid
    pub(crate) fn slot_for(&self, ticket: SinkTicket) -> Option<SinkSlot> {
        [SinkSlot::Primary, SinkSlot::Secondary]
            .into_iter()
            .find(|slot| self.tickets[slot.index()] == Some(ticket))
    }

    pub(crate) fn is_bound(&self, slot: SinkSlot) -> bool {
        self.tickets[slot.index()].is_some()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording sink for unit tests

    use super::*;
    use std::sync::{Arc, Mutex};

    /// Everything a [`RecordingSink`] was asked to do
    #[derive(Debug, Default)]
    pub(crate) struct SinkLog {
        pub(crate) url: Option<String>,
        pub(crate) ticket: Option<SinkTicket>,
        pub(crate) loads: Vec<String>,
        pub(crate) unloads: usize,
        pub(crate) playing: bool,
        pub(crate) rate: f64,
        pub(crate) time: f64,
        pub(crate) duration: Option<f64>,
        pub(crate) seeks: Vec<f64>,
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink(pub(crate) Arc<Mutex<SinkLog>>);

    impl RecordingSink {
        pub(crate) fn log(&self) -> std::sync::MutexGuard<'_, SinkLog> {
            self.0.lock().unwrap()
        }
    }

    impl MediaSink for RecordingSink {
        fn load(&mut self, url: &str, ticket: SinkTicket) {
            let mut log = self.log();
            log.url = Some(url.to_string());
            log.ticket = Some(ticket);
            log.loads.push(url.to_string());
            log.playing = false;
            log.rate = 1.0;
            log.time = 0.0;
            log.duration = None;
        }

        fn unload(&mut self) {
            let mut log = self.log();
            log.url = None;
            log.ticket = None;
            log.unloads += 1;
            log.playing = false;
        }

        fn play(&mut self) {
            self.log().playing = true;
        }

        fn pause(&mut self) {
            self.log().playing = false;
        }

        fn seek(&mut self, position_secs: f64) {
            let mut log = self.log();
            log.time = position_secs;
            log.seeks.push(position_secs);
        }

        fn set_rate(&mut self, rate: f64) {
            self.log().rate = rate;
        }

        fn current_time(&self) -> f64 {
            self.0.lock().unwrap().time
        }

        fn duration(&self) -> Option<f64> {
            self.0.lock().unwrap().duration
        }
    }
}
