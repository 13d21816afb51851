//! Scripted playback scenarios
//!
//! A scenario names a source, describes how the simulated network serves
//! each resource and schedules commands on the virtual clock. Running it
//! yields every listener event stamped with the clock time it fired at.

use crate::config::CliConfig;
use crate::error::{CliError, Result};
use crate::simulator::{Catalogue, Delivery, MediaSpec, PlaylistSpec, SimDefaults, Simulation};
use segue_playback::{
    ErrorKind, EventLog, PlaybackCommand, PlaybackEvent, PlaybackHandle, PlaybackSession,
    PlaybackSource, PlaybackState,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Upper bound on delivery rounds triggered by a single step
const MAX_DELIVERY_ROUNDS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Source played at time zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PlaybackSource>,
    #[serde(default)]
    pub media: HashMap<String, MediaSpec>,
    #[serde(default)]
    pub playlists: HashMap<String, PlaylistSpec>,
    #[serde(default)]
    pub commands: Vec<TimedCommand>,
    /// Stop the clock here; defaults to the configured maximum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Give the session a second sink for preloading
    #[serde(default = "default_true")]
    pub preload_sink: bool,
    /// Whether the adaptive engine is available
    #[serde(default = "default_true")]
    pub engine_supported: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            source: None,
            media: HashMap::new(),
            playlists: HashMap::new(),
            commands: Vec::new(),
            duration_secs: None,
            preload_sink: true,
            engine_supported: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedCommand {
    pub at_secs: f64,
    pub action: PlaybackCommand,
}

/// Listener event and the clock time it fired at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedEvent {
    pub at_secs: f64,
    pub event: PlaybackEvent,
}

/// Command the session refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedCommand {
    pub at_secs: f64,
    pub action: PlaybackCommand,
    pub reason: String,
}

/// Session state once the clock stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub clock_secs: f64,
    pub state: PlaybackState,
    pub current_time_secs: f64,
    pub duration_secs: Option<f64>,
    pub playback_rate: f64,
    pub segment_index: Option<usize>,
    pub error: Option<ErrorKind>,
    pub engines_created: usize,
    pub live_engines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub events: Vec<TimedEvent>,
    pub rejected: Vec<RejectedCommand>,
    pub summary: Summary,
}

impl Report {
    /// State transitions in order
    pub fn states(&self) -> Vec<PlaybackState> {
        self.events
            .iter()
            .filter_map(|e| match e.event {
                PlaybackEvent::StateChange { state } => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Reported errors in order
    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.events
            .iter()
            .filter_map(|e| match &e.event {
                PlaybackEvent::Error { kind, message } => Some((*kind, message.clone())),
                _ => None,
            })
            .collect()
    }

    /// Last reported duration
    pub fn last_duration(&self) -> Option<f64> {
        self.events.iter().rev().find_map(|e| match e.event {
            PlaybackEvent::DurationChange { duration_secs } => Some(duration_secs),
            _ => None,
        })
    }
}

impl Scenario {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(text)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        if let Some(duration) = self.duration_secs {
            if !duration.is_finite() || duration < 0.0 {
                return Err(CliError::Scenario(format!(
                    "durationSecs must be a non-negative number, got {}",
                    duration
                )));
            }
        }

        if let Some(command) = self
            .commands
            .iter()
            .find(|c| !c.at_secs.is_finite() || c.at_secs < 0.0)
        {
            return Err(CliError::Scenario(format!(
                "command scheduled at invalid time {}",
                command.at_secs
            )));
        }

        Ok(())
    }
}

/// Run a scenario to completion
///
/// The clock stops at the scenario's duration, or earlier once the session
/// has settled (idle, ended or errored) with no commands left to run.
pub fn run(scenario: Scenario, config: &CliConfig) -> Result<Report> {
    let settings = &config.simulation;
    let sim = Simulation::new(Catalogue {
        media: scenario.media,
        playlists: scenario.playlists,
        defaults: SimDefaults {
            media_duration_secs: settings.default_media_duration_secs,
            load_latency_secs: settings.load_latency_secs,
            retry_interval_secs: settings.retry_interval_secs,
        },
    });

    let log = EventLog::new();
    let mut session =
        PlaybackSession::new(config.playback.clone(), sim.sink("primary"), log.clone())?
            .with_engine_factory(sim.engine_factory(scenario.engine_supported));
    if scenario.preload_sink {
        session = session.with_preload_sink(sim.sink("secondary"));
    }
    let handle = PlaybackHandle::new(session);

    let mut commands = scenario.commands;
    if let Some(source) = scenario.source {
        commands.insert(
            0,
            TimedCommand {
                at_secs: 0.0,
                action: PlaybackCommand::Play { source },
            },
        );
    }
    // Stable: commands at the same time keep their script order
    commands.sort_by(|a, b| a.at_secs.total_cmp(&b.at_secs));
    let mut commands = commands.into_iter().peekable();

    let end = scenario.duration_secs.unwrap_or(settings.max_duration_secs);
    let tick = settings.tick_secs;
    info!(end, tick, commands = commands.len(), "Running scenario");

    let mut events = Vec::new();
    let mut rejected = Vec::new();
    let mut step: u64 = 0;

    loop {
        let clock = step as f64 * tick;
        sim.set_clock(clock);

        while let Some(command) = commands.next_if(|c| c.at_secs <= clock + 1e-9) {
            info!(at = clock, command = ?command.action, "Applying command");
            if let Err(e) = handle.apply(command.action.clone()) {
                warn!(at = clock, error = %e, "Command rejected");
                rejected.push(RejectedCommand {
                    at_secs: command.at_secs,
                    action: command.action,
                    reason: e.to_string(),
                });
            }
            pump(&handle, &sim, Vec::new());
        }
        stamp(&log, clock, &mut events);

        let settled = matches!(
            handle.state(),
            PlaybackState::Idle | PlaybackState::Ended | PlaybackState::Errored
        );
        if clock >= end || (settled && commands.peek().is_none()) {
            break;
        }

        step += 1;
        let next = step as f64 * tick;
        pump(&handle, &sim, sim.advance(tick));
        stamp(&log, next, &mut events);
    }

    let summary = handle.with_session(|session| Summary {
        clock_secs: sim.clock(),
        state: session.state(),
        current_time_secs: session.current_time(),
        duration_secs: session.duration(),
        playback_rate: session.playback_rate(),
        segment_index: session.segment_index(),
        error: session.error(),
        engines_created: sim.engines_created(),
        live_engines: sim.live_engines(),
    });
    info!(state = %summary.state, clock = summary.clock_secs, "Scenario finished");

    Ok(Report {
        events,
        rejected,
        summary,
    })
}

/// Deliver `first` and everything the session's reactions fire in turn
fn pump(handle: &PlaybackHandle, sim: &Simulation, first: Vec<Delivery>) {
    let mut batch = first;
    batch.extend(sim.take_outbox());

    for _ in 0..MAX_DELIVERY_ROUNDS {
        if batch.is_empty() {
            return;
        }
        for delivery in batch {
            match delivery {
                Delivery::Sink(ticket, event) => handle.deliver_sink_event(ticket, event),
                Delivery::Engine(ticket, event) => handle.deliver_engine_event(ticket, event),
            }
        }
        batch = sim.take_outbox();
    }

    warn!(pending = batch.len(), "Delivery did not settle; dropping events");
}

fn stamp(log: &EventLog, at_secs: f64, out: &mut Vec<TimedEvent>) {
    out.extend(
        log.drain()
            .into_iter()
            .map(|event| TimedEvent { at_secs, event }),
    );
}
