//! Headless media sinks and adaptive engine on a virtual clock
//!
//! Every simulated component lives in one shared [`World`]. Sinks and
//! engines never call back into the session: the events they fire are
//! queued in an outbox that the caller drains and delivers, the same way a
//! host forwards native events from its own event loop.

use segue_playback::{
    AdaptiveEngine, AdaptiveEngineFactory, EngineErrorType, EngineEvent, EngineOptions,
    EngineTicket, MediaSink, SinkEvent, SinkTicket,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Behaviour of one media resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSpec {
    /// Real length; falls back to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Time to become playable after a load; falls back to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_latency_secs: Option<f64>,
    /// Load fails with this message instead of becoming playable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Buffer runs dry once during playback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall: Option<StallSpec>,
}

/// One buffering interruption
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StallSpec {
    /// Resource-local time at which the buffer runs dry
    pub at_secs: f64,
    /// Wall time until rendering continues
    pub for_secs: f64,
}

/// Behaviour of one adaptive playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default = "default_levels")]
    pub levels: usize,
    /// Quality switches, in engine time since the playlist was loaded
    #[serde(default)]
    pub level_switches: Vec<LevelSwitch>,
    /// Failure the engine runs into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<EngineFailure>,
}

fn default_levels() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelSwitch {
    pub at_secs: f64,
    pub level: usize,
}

/// Engine failure
///
/// Network failures are retried with the session's retry budget before
/// they turn fatal; everything else is fatal at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineFailure {
    pub at_secs: f64,
    pub kind: EngineErrorType,
    pub details: String,
}

/// Defaults for anything the scenario leaves open
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimDefaults {
    pub media_duration_secs: f64,
    pub load_latency_secs: f64,
    pub retry_interval_secs: f64,
}

/// Resources known to the simulated network
#[derive(Debug, Clone)]
pub struct Catalogue {
    pub media: HashMap<String, MediaSpec>,
    pub playlists: HashMap<String, PlaylistSpec>,
    pub defaults: SimDefaults,
}

/// An event waiting to be handed to the session
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Sink(SinkTicket, SinkEvent),
    Engine(EngineTicket, EngineEvent),
}

/// Fully resolved resource behaviour
#[derive(Debug, Clone, PartialEq)]
struct Resource {
    duration_secs: f64,
    load_latency_secs: f64,
    error: Option<String>,
    stall: Option<StallSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SinkPhase {
    Empty,
    /// Bound to an engine that has not been given a playlist yet
    AwaitingEngine,
    Loading { remaining: f64 },
    Ready,
    Stalled { remaining: f64 },
    Ended,
    Failed,
}

#[derive(Debug)]
struct SinkSim {
    name: String,
    url: Option<String>,
    ticket: Option<SinkTicket>,
    resource: Option<Resource>,
    phase: SinkPhase,
    playing: bool,
    rate: f64,
    time: f64,
    duration: Option<f64>,
    stalled_once: bool,
}

impl SinkSim {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            url: None,
            ticket: None,
            resource: None,
            phase: SinkPhase::Empty,
            playing: false,
            rate: 1.0,
            time: 0.0,
            duration: None,
            stalled_once: false,
        }
    }

    fn reset(&mut self) {
        let name = std::mem::take(&mut self.name);
        *self = Self::new(&name);
    }
}

#[derive(Debug)]
struct EngineSim {
    ticket: EngineTicket,
    retries: u32,
    sink: Option<SinkTicket>,
    playlist: Option<PlaylistSpec>,
    elapsed: f64,
    switches_fired: usize,
    retries_fired: u32,
    failed: bool,
    destroyed: bool,
}

/// Shared state of every simulated component
#[derive(Debug)]
pub struct World {
    catalogue: Catalogue,
    sinks: Vec<SinkSim>,
    engines: Vec<EngineSim>,
    outbox: Vec<Delivery>,
    clock: f64,
    engines_created: usize,
}

impl World {
    fn emit_sink(&mut self, index: usize, event: SinkEvent) {
        if let Some(ticket) = self.sinks[index].ticket {
            trace!(sink = %self.sinks[index].name, ?event, "Sink event");
            self.outbox.push(Delivery::Sink(ticket, event));
        }
    }

    fn emit_engine(&mut self, ticket: EngineTicket, event: EngineEvent) {
        trace!(engine = ticket.id(), ?event, "Engine event");
        self.outbox.push(Delivery::Engine(ticket, event));
    }

    fn resolve_media(&self, url: &str) -> Resource {
        let defaults = self.catalogue.defaults;
        if let Some(spec) = self.catalogue.media.get(url) {
            return Resource {
                duration_secs: spec.duration_secs.unwrap_or(defaults.media_duration_secs),
                load_latency_secs: spec.load_latency_secs.unwrap_or(defaults.load_latency_secs),
                error: spec.error.clone(),
                stall: spec.stall,
            };
        }

        // A playlist handed straight to a sink plays natively
        let playlist = self.catalogue.playlists.get(url);
        Resource {
            duration_secs: playlist
                .and_then(|p| p.duration_secs)
                .unwrap_or(defaults.media_duration_secs),
            load_latency_secs: defaults.load_latency_secs,
            error: playlist
                .and_then(|p| p.failure.as_ref())
                .map(|f| f.details.clone()),
            stall: None,
        }
    }

    fn tick_sink(&mut self, index: usize, dt: f64) {
        let sink = &mut self.sinks[index];
        let Some(resource) = sink.resource.clone() else {
            return;
        };

        match sink.phase {
            SinkPhase::Loading { remaining } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    sink.phase = SinkPhase::Loading { remaining };
                    return;
                }

                if let Some(message) = resource.error {
                    sink.phase = SinkPhase::Failed;
                    self.emit_sink(index, SinkEvent::Error { message });
                    return;
                }

                sink.phase = SinkPhase::Ready;
                sink.duration = Some(resource.duration_secs);
                self.emit_sink(index, SinkEvent::DurationChange);
                self.emit_sink(index, SinkEvent::CanPlay);
                if self.sinks[index].playing {
                    self.emit_sink(index, SinkEvent::Playing);
                }
            }
            SinkPhase::Ready if sink.playing => {
                sink.time = (sink.time + dt * sink.rate).min(resource.duration_secs);

                if let Some(stall) = resource.stall {
                    if !sink.stalled_once && sink.time >= stall.at_secs {
                        sink.stalled_once = true;
                        sink.time = sink.time.min(stall.at_secs);
                        sink.phase = SinkPhase::Stalled {
                            remaining: stall.for_secs,
                        };
                        self.emit_sink(index, SinkEvent::TimeUpdate);
                        self.emit_sink(index, SinkEvent::Waiting);
                        return;
                    }
                }

                let ended = sink.time >= resource.duration_secs;
                if ended {
                    sink.phase = SinkPhase::Ended;
                    sink.playing = false;
                }
                self.emit_sink(index, SinkEvent::TimeUpdate);
                if ended {
                    self.emit_sink(index, SinkEvent::Ended);
                }
            }
            SinkPhase::Stalled { remaining } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    sink.phase = SinkPhase::Stalled { remaining };
                } else {
                    sink.phase = SinkPhase::Ready;
                    self.emit_sink(index, SinkEvent::Playing);
                }
            }
            _ => {}
        }
    }

    fn tick_engine(&mut self, index: usize, dt: f64) {
        let retry_interval = self.catalogue.defaults.retry_interval_secs;
        let engine = &mut self.engines[index];
        if engine.destroyed || engine.failed {
            return;
        }
        let Some(playlist) = engine.playlist.clone() else {
            return;
        };

        engine.elapsed += dt;
        let elapsed = engine.elapsed;
        let ticket = engine.ticket;

        let mut events = Vec::new();
        while let Some(switch) = playlist.level_switches.get(engine.switches_fired) {
            if switch.at_secs > elapsed {
                break;
            }
            engine.switches_fired += 1;
            events.push(EngineEvent::LevelSwitched {
                level: switch.level,
            });
        }

        if let Some(failure) = &playlist.failure {
            let retries = match failure.kind {
                EngineErrorType::Network => engine.retries,
                EngineErrorType::Media | EngineErrorType::Other => 0,
            };

            while engine.retries_fired < retries {
                let due = failure.at_secs + f64::from(engine.retries_fired) * retry_interval;
                if due > elapsed {
                    break;
                }
                engine.retries_fired += 1;
                events.push(EngineEvent::Error {
                    fatal: false,
                    kind: failure.kind,
                    details: failure.details.clone(),
                });
            }

            let fatal_at = failure.at_secs + f64::from(retries) * retry_interval;
            if engine.retries_fired == retries && fatal_at <= elapsed {
                engine.failed = true;
                events.push(EngineEvent::Error {
                    fatal: true,
                    kind: failure.kind,
                    details: failure.details.clone(),
                });
            }
        }

        for event in events {
            self.emit_engine(ticket, event);
        }
    }

    fn sink_by_ticket(&mut self, ticket: SinkTicket) -> Option<&mut SinkSim> {
        self.sinks.iter_mut().find(|s| s.ticket == Some(ticket))
    }
}

/// Handle to the shared simulated world
#[derive(Debug, Clone)]
pub struct Simulation {
    world: Arc<Mutex<World>>,
}

impl Simulation {
    pub fn new(catalogue: Catalogue) -> Self {
        Self {
            world: Arc::new(Mutex::new(World {
                catalogue,
                sinks: Vec::new(),
                engines: Vec::new(),
                outbox: Vec::new(),
                clock: 0.0,
                engines_created: 0,
            })),
        }
    }

    /// Create a new sink living in this world
    pub fn sink(&self, name: &str) -> SimulatedSink {
        let mut world = self.lock();
        world.sinks.push(SinkSim::new(name));
        SimulatedSink {
            world: self.world.clone(),
            index: world.sinks.len() - 1,
        }
    }

    /// Engine factory creating engines in this world
    pub fn engine_factory(&self, supported: bool) -> SimulatedEngines {
        SimulatedEngines {
            world: self.world.clone(),
            supported,
        }
    }

    /// Advance the virtual clock by `dt` and return everything fired meanwhile
    pub fn advance(&self, dt: f64) -> Vec<Delivery> {
        let mut world = self.lock();
        world.clock += dt;
        for index in 0..world.sinks.len() {
            world.tick_sink(index, dt);
        }
        for index in 0..world.engines.len() {
            world.tick_engine(index, dt);
        }
        std::mem::take(&mut world.outbox)
    }

    /// Events fired outside a clock step (by control calls)
    pub fn take_outbox(&self) -> Vec<Delivery> {
        std::mem::take(&mut self.lock().outbox)
    }

    /// Move the virtual clock without ticking any component
    pub fn set_clock(&self, clock: f64) {
        self.lock().clock = clock;
    }

    pub fn clock(&self) -> f64 {
        self.lock().clock
    }

    /// Number of engines created so far
    pub fn engines_created(&self) -> usize {
        self.lock().engines_created
    }

    /// Number of engines created and not destroyed
    pub fn live_engines(&self) -> usize {
        self.lock().engines.iter().filter(|e| !e.destroyed).count()
    }

    /// URL currently loaded on the named sink
    pub fn sink_url(&self, name: &str) -> Option<String> {
        self.lock()
            .sinks
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.url.clone())
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Simulated media element
#[derive(Debug)]
pub struct SimulatedSink {
    world: Arc<Mutex<World>>,
    index: usize,
}

impl SimulatedSink {
    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MediaSink for SimulatedSink {
    fn load(&mut self, url: &str, ticket: SinkTicket) {
        let mut world = self.lock();
        // Engine-bound sinks get their resource once the engine loads a playlist
        let resource = (!url.starts_with("blob:")).then(|| world.resolve_media(url));

        let sink = &mut world.sinks[self.index];
        sink.reset();
        debug!(sink = %sink.name, url, ticket = ticket.id(), "Sink load");
        sink.url = Some(url.to_string());
        sink.ticket = Some(ticket);
        sink.phase = match &resource {
            Some(resource) => SinkPhase::Loading {
                remaining: resource.load_latency_secs,
            },
            None => SinkPhase::AwaitingEngine,
        };
        sink.resource = resource;
    }

    fn unload(&mut self) {
        let mut world = self.lock();
        let sink = &mut world.sinks[self.index];
        debug!(sink = %sink.name, "Sink unload");
        sink.reset();
    }

    fn play(&mut self) {
        let mut world = self.lock();
        let sink = &mut world.sinks[self.index];
        if sink.url.is_none() || sink.playing {
            return;
        }
        sink.playing = true;
        if sink.phase == SinkPhase::Ended {
            sink.time = 0.0;
            sink.phase = SinkPhase::Ready;
        }
        if sink.phase == SinkPhase::Ready {
            world.emit_sink(self.index, SinkEvent::Playing);
        }
    }

    fn pause(&mut self) {
        self.lock().sinks[self.index].playing = false;
    }

    fn seek(&mut self, position_secs: f64) {
        let mut world = self.lock();
        let sink = &mut world.sinks[self.index];
        let end = sink.duration.unwrap_or(f64::INFINITY);
        sink.time = position_secs.clamp(0.0, end);
        if sink.phase == SinkPhase::Ended && sink.time < end {
            sink.phase = SinkPhase::Ready;
        }
        if matches!(sink.phase, SinkPhase::Ready | SinkPhase::Ended) {
            world.emit_sink(self.index, SinkEvent::TimeUpdate);
        }
    }

    fn set_rate(&mut self, rate: f64) {
        self.lock().sinks[self.index].rate = rate;
    }

    fn current_time(&self) -> f64 {
        self.lock().sinks[self.index].time
    }

    fn duration(&self) -> Option<f64> {
        self.lock().sinks[self.index].duration
    }
}

/// Factory for simulated adaptive engines
#[derive(Debug)]
pub struct SimulatedEngines {
    world: Arc<Mutex<World>>,
    supported: bool,
}

impl AdaptiveEngineFactory for SimulatedEngines {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(&mut self, options: EngineOptions, ticket: EngineTicket) -> Box<dyn AdaptiveEngine> {
        let mut world = self.world.lock().unwrap_or_else(PoisonError::into_inner);
        world.engines_created += 1;
        world.engines.push(EngineSim {
            ticket,
            retries: options.max_load_retries,
            sink: None,
            playlist: None,
            elapsed: 0.0,
            switches_fired: 0,
            retries_fired: 0,
            failed: false,
            destroyed: false,
        });
        debug!(engine = ticket.id(), retries = options.max_load_retries, "Engine created");

        Box::new(SimulatedEngine {
            world: self.world.clone(),
            index: world.engines.len() - 1,
        })
    }
}

/// Simulated adaptive engine
#[derive(Debug)]
pub struct SimulatedEngine {
    world: Arc<Mutex<World>>,
    index: usize,
}

impl SimulatedEngine {
    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AdaptiveEngine for SimulatedEngine {
    fn attach_media(&mut self, sink: &mut dyn MediaSink, sink_ticket: SinkTicket) {
        let ticket = self.lock().engines[self.index].ticket;
        // The sink locks the world itself
        sink.load(&format!("blob:engine-{}", ticket.id()), sink_ticket);
        self.lock().engines[self.index].sink = Some(sink_ticket);
    }

    fn load_source(&mut self, playlist_url: &str) {
        let mut world = self.lock();
        let defaults = world.catalogue.defaults;
        let playlist = world
            .catalogue
            .playlists
            .get(playlist_url)
            .cloned()
            .unwrap_or(PlaylistSpec {
                duration_secs: None,
                levels: default_levels(),
                level_switches: Vec::new(),
                failure: None,
            });

        let engine = &mut world.engines[self.index];
        engine.playlist = Some(playlist.clone());
        let ticket = engine.ticket;
        let bound = engine.sink;
        debug!(engine = ticket.id(), playlist_url, "Engine loading playlist");

        if let Some(sink_ticket) = bound {
            if let Some(sink) = world.sink_by_ticket(sink_ticket) {
                sink.resource = Some(Resource {
                    duration_secs: playlist
                        .duration_secs
                        .unwrap_or(defaults.media_duration_secs),
                    load_latency_secs: defaults.load_latency_secs,
                    error: None,
                    stall: None,
                });
                sink.phase = SinkPhase::Loading {
                    remaining: defaults.load_latency_secs,
                };
            }
        }

        world.emit_engine(
            ticket,
            EngineEvent::ManifestParsed {
                levels: playlist.levels,
            },
        );
    }

    fn destroy(&mut self) {
        let mut world = self.lock();
        let engine = &mut world.engines[self.index];
        engine.destroyed = true;
        debug!(engine = engine.ticket.id(), "Engine destroyed");
    }
}
