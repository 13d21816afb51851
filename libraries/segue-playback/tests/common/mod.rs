//! Shared mocks and harness for session integration tests
#![allow(dead_code)]

use segue_playback::{
    AdaptiveEngine, AdaptiveEngineFactory, EngineEvent, EngineOptions, EngineTicket, EventLog,
    MediaSink, PlaybackConfig, PlaybackSession, SinkEvent, SinkSlot, SinkTicket,
};
use std::sync::{Arc, Mutex, MutexGuard};

// ===== Mock Sink =====

/// Everything a sink was asked to do, plus the clock the test drives
#[derive(Debug, Default)]
pub struct SinkState {
    pub url: Option<String>,
    pub ticket: Option<SinkTicket>,
    pub loads: Vec<String>,
    pub unloads: usize,
    pub playing: bool,
    pub rate: f64,
    pub time: f64,
    pub duration: Option<f64>,
    pub seeks: Vec<f64>,
}

#[derive(Clone, Default)]
pub struct MockSink(Arc<Mutex<SinkState>>);

impl MockSink {
    pub fn state(&self) -> MutexGuard<'_, SinkState> {
        self.0.lock().unwrap()
    }

    pub fn ticket(&self) -> SinkTicket {
        self.state().ticket.expect("sink holds no resource")
    }

    pub fn url(&self) -> Option<String> {
        self.state().url.clone()
    }
}

impl MediaSink for MockSink {
    fn load(&mut self, url: &str, ticket: SinkTicket) {
        let mut state = self.state();
        state.url = Some(url.to_string());
        state.ticket = Some(ticket);
        state.loads.push(url.to_string());
        state.playing = false;
        state.rate = 1.0;
        state.time = 0.0;
        state.duration = None;
    }

    fn unload(&mut self) {
        let mut state = self.state();
        state.url = None;
        state.ticket = None;
        state.unloads += 1;
        state.playing = false;
    }

    fn play(&mut self) {
        self.state().playing = true;
    }

    fn pause(&mut self) {
        self.state().playing = false;
    }

    fn seek(&mut self, position_secs: f64) {
        let mut state = self.state();
        state.time = position_secs;
        state.seeks.push(position_secs);
    }

    fn set_rate(&mut self, rate: f64) {
        self.state().rate = rate;
    }

    fn current_time(&self) -> f64 {
        self.state().time
    }

    fn duration(&self) -> Option<f64> {
        self.state().duration
    }
}

// ===== Mock Engine =====

#[derive(Debug, Default)]
pub struct EngineRecord {
    pub created: Vec<EngineTicket>,
    pub options: Vec<EngineOptions>,
    pub loaded: Vec<String>,
    pub destroyed: usize,
    pub live: usize,
    pub max_live: usize,
}

/// Engine factory recording every instance it hands out
#[derive(Clone, Default)]
pub struct MockEngines {
    record: Arc<Mutex<EngineRecord>>,
    unsupported: bool,
}

impl MockEngines {
    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Self::default()
        }
    }

    pub fn record(&self) -> MutexGuard<'_, EngineRecord> {
        self.record.lock().unwrap()
    }

    pub fn last_ticket(&self) -> EngineTicket {
        *self.record().created.last().expect("no engine created")
    }
}

struct MockEngine {
    record: Arc<Mutex<EngineRecord>>,
    destroyed: bool,
}

impl AdaptiveEngine for MockEngine {
    fn attach_media(&mut self, sink: &mut dyn MediaSink, sink_ticket: SinkTicket) {
        // Engines feed the sink through an object URL of their own
        sink.load("blob:media-source", sink_ticket);
    }

    fn load_source(&mut self, playlist_url: &str) {
        self.record
            .lock()
            .unwrap()
            .loaded
            .push(playlist_url.to_string());
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            let mut record = self.record.lock().unwrap();
            record.destroyed += 1;
            record.live -= 1;
        }
    }
}

impl AdaptiveEngineFactory for MockEngines {
    fn is_supported(&self) -> bool {
        !self.unsupported
    }

    fn create(&mut self, options: EngineOptions, ticket: EngineTicket) -> Box<dyn AdaptiveEngine> {
        let mut record = self.record();
        record.created.push(ticket);
        record.options.push(options);
        record.live += 1;
        record.max_live = record.max_live.max(record.live);
        drop(record);

        Box::new(MockEngine {
            record: self.record.clone(),
            destroyed: false,
        })
    }
}

// ===== Harness =====

pub struct Harness {
    pub session: PlaybackSession,
    pub primary: MockSink,
    pub secondary: MockSink,
    pub engines: MockEngines,
    pub events: EventLog,
}

impl Harness {
    /// Session with a preload sink and an engine factory
    pub fn new() -> Self {
        Self::build(PlaybackConfig::default(), true, MockEngines::default())
    }

    /// Session that has to cold-load every segment
    pub fn without_preload() -> Self {
        Self::build(PlaybackConfig::default(), false, MockEngines::default())
    }

    pub fn build(config: PlaybackConfig, preload: bool, engines: MockEngines) -> Self {
        let primary = MockSink::default();
        let secondary = MockSink::default();
        let events = EventLog::new();

        let mut session = PlaybackSession::new(config, primary.clone(), events.clone())
            .unwrap()
            .with_engine_factory(engines.clone());
        if preload {
            session = session.with_preload_sink(secondary.clone());
        }

        Self {
            session,
            primary,
            secondary,
            engines,
            events,
        }
    }

    pub fn sink(&self, slot: SinkSlot) -> MockSink {
        match slot {
            SinkSlot::Primary => self.primary.clone(),
            SinkSlot::Secondary => self.secondary.clone(),
        }
    }

    /// Deliver `event` from the resource currently loaded on `slot`
    pub fn deliver(&mut self, slot: SinkSlot, event: SinkEvent) {
        let ticket = self.sink(slot).ticket();
        self.session.handle_sink_event(ticket, event);
    }

    /// Resource on `slot` reports its duration and becomes playable
    pub fn ready(&mut self, slot: SinkSlot, duration: f64) {
        self.sink(slot).state().duration = Some(duration);
        self.deliver(slot, SinkEvent::DurationChange);
        self.deliver(slot, SinkEvent::CanPlay);
    }

    /// Clock of `slot` advances to `time`
    pub fn tick(&mut self, slot: SinkSlot, time: f64) {
        self.sink(slot).state().time = time;
        self.deliver(slot, SinkEvent::TimeUpdate);
    }

    /// Play the resource on `slot` from its clock to `until` in 0.5 s steps
    pub fn play_until(&mut self, slot: SinkSlot, until: f64) {
        let mut time = self.sink(slot).state().time;
        while time < until {
            time = (time + 0.5).min(until);
            self.tick(slot, time);
        }
    }

    /// Play the resource on `slot` to its end
    pub fn finish(&mut self, slot: SinkSlot) {
        let end = self.sink(slot).state().duration.expect("duration unknown");
        self.play_until(slot, end);
        self.deliver(slot, SinkEvent::Ended);
    }

    pub fn engine_event(&mut self, event: EngineEvent) {
        let ticket = self.engines.last_ticket();
        self.session.handle_engine_event(ticket, event);
    }
}
