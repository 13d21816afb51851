//! Playback session
//!
//! Owns the sinks, at most one source driver and the caller-visible state
//! machine. Control calls and sink/engine event deliveries are the only entry
//! points; both run to completion synchronously and invoke the listener
//! before returning.

use crate::adaptive::AdaptiveDriver;
use crate::driver::{DriverContext, Signal, SourceDriver};
use crate::engine::{AdaptiveEngineFactory, EngineEvent, EngineOptions, EngineTicket};
use crate::error::{PlaybackError, Result};
use crate::events::PlaybackListener;
use crate::handle::PlaybackCommand;
use crate::policy::{clamp_rate, clamp_seek};
use crate::sequential::SequentialDriver;
use crate::sink::{MediaSink, SinkEvent, SinkSet, SinkSlot, SinkTicket};
use crate::source::PlaybackSource;
use crate::timeline::SegmentTable;
use crate::types::{ErrorKind, PlaybackConfig, PlaybackState};
use tracing::{debug, info, trace, warn};

/// Unified playback session
///
/// Plays one [`PlaybackSource`] at a time on the primary [`MediaSink`]:
/// adaptive playlists through an [`AdaptiveEngineFactory`] (or natively when
/// none is available), segment lists through the sequential driver with
/// optional preloading on a secondary sink.
///
/// Hosts forward every sink event with the ticket it was loaded with via
/// [`handle_sink_event`](Self::handle_sink_event), and every engine event via
/// [`handle_engine_event`](Self::handle_engine_event). Events carrying a
/// ticket of a replaced resource or engine are dropped.
pub struct PlaybackSession {
    config: PlaybackConfig,
    sinks: SinkSet,
    engines: Option<Box<dyn AdaptiveEngineFactory>>,
    listener: Box<dyn PlaybackListener>,

    state: PlaybackState,
    source: Option<PlaybackSource>,
    driver: Option<SourceDriver>,
    rate: f64,
    /// Caller intent: play once the current resource is ready
    wants_playing: bool,
    last_duration: Option<f64>,
    error: Option<ErrorKind>,
    next_engine_ticket: u64,
}

impl PlaybackSession {
    /// Create an idle session rendering to `primary`
    pub fn new(
        config: PlaybackConfig,
        primary: impl MediaSink + 'static,
        listener: impl PlaybackListener + 'static,
    ) -> Result<Self> {
        let config = config.validate()?;
        let rate = config.initial_rate;

        Ok(Self {
            config,
            sinks: SinkSet::new(Box::new(primary)),
            engines: None,
            listener: Box::new(listener),
            state: PlaybackState::Idle,
            source: None,
            driver: None,
            rate,
            wants_playing: false,
            last_duration: None,
            error: None,
            next_engine_ticket: 1,
        })
    }

    /// Standby sink used to preload the next segment of sequential sources
    #[must_use]
    pub fn with_preload_sink(mut self, sink: impl MediaSink + 'static) -> Self {
        self.sinks.set_secondary(Box::new(sink));
        self
    }

    /// Factory for the adaptive decode engine
    #[must_use]
    pub fn with_engine_factory(mut self, factory: impl AdaptiveEngineFactory + 'static) -> Self {
        self.engines = Some(Box::new(factory));
        self
    }

    // ===== Control surface =====

    /// Start playing `source` from zero, replacing whatever was attached
    ///
    /// Re-issuing the current source restarts it.
    pub fn play(&mut self, source: PlaybackSource) -> Result<()> {
        source.validate()?;
        self.detach_driver();

        info!(
            kind = ?source.kind(),
            resources = source.resource_count(),
            rate = self.rate,
            "Attaching source"
        );

        self.error = None;
        self.last_duration = None;
        self.wants_playing = self.config.autoplay;
        self.set_state(PlaybackState::Loading);

        let ctx = self.ctx();
        let mut out = Vec::new();
        let driver = match &source {
            PlaybackSource::Adaptive { playlist_url } => {
                let ticket = EngineTicket(self.next_engine_ticket);
                self.next_engine_ticket += 1;
                SourceDriver::Adaptive(AdaptiveDriver::attach(
                    playlist_url,
                    &mut self.sinks,
                    self.engines.as_deref_mut(),
                    EngineOptions {
                        max_load_retries: self.config.network_retry_budget,
                    },
                    ticket,
                    self.rate,
                    self.wants_playing,
                ))
            }
            PlaybackSource::Sequential { segments } => {
                SourceDriver::Sequential(SequentialDriver::attach(
                    segments.clone(),
                    &mut self.sinks,
                    self.config.unknown_segment_estimate_secs,
                    ctx,
                    self.wants_playing,
                    &mut out,
                ))
            }
        };

        self.source = Some(source);
        self.driver = Some(driver);
        self.apply_signals(out);
        Ok(())
    }

    /// Pause; while loading only the intent is recorded
    pub fn pause(&mut self) {
        match self.state {
            PlaybackState::Playing | PlaybackState::Buffering => {
                self.wants_playing = false;
                if let Some(driver) = self.driver.as_mut() {
                    driver.pause(&mut self.sinks);
                }
                self.set_state(PlaybackState::Paused);
            }
            PlaybackState::Loading => {
                self.wants_playing = false;
                if let Some(driver) = self.driver.as_mut() {
                    driver.pause(&mut self.sinks);
                }
            }
            state => trace!(%state, "Ignoring pause"),
        }
    }

    /// Resume from `Paused`; from `Ended` restart the source at zero
    pub fn resume(&mut self) {
        match self.state {
            PlaybackState::Paused => {
                self.wants_playing = true;
                if let Some(driver) = self.driver.as_mut() {
                    driver.play(&mut self.sinks);
                }
                self.set_state(PlaybackState::Playing);
            }
            PlaybackState::Loading => {
                self.wants_playing = true;
                if let Some(driver) = self.driver.as_mut() {
                    driver.play(&mut self.sinks);
                }
            }
            PlaybackState::Ended => {
                debug!("Restarting source from the beginning");
                self.wants_playing = true;

                let ctx = self.ctx();
                let mut out = Vec::new();
                if let Some(driver) = self.driver.as_mut() {
                    driver.seek(&mut self.sinks, 0.0, ctx, &mut out);
                    driver.play(&mut self.sinks);
                }
                self.apply_signals(out);

                // A cold-loaded first segment reports Ready later
                if self.state == PlaybackState::Ended {
                    self.set_state(PlaybackState::Playing);
                }
            }
            state => trace!(%state, "Ignoring resume"),
        }
    }

    /// Pause when playing (or about to), resume otherwise
    pub fn toggle_play(&mut self) {
        let playing = match self.state {
            PlaybackState::Playing | PlaybackState::Buffering => true,
            PlaybackState::Loading => self.wants_playing,
            _ => false,
        };
        if playing {
            self.pause();
        } else {
            self.resume();
        }
    }

    /// Seek to a virtual time, clamped into `[0, duration]`
    ///
    /// Seeking an ended source leaves it paused at the target.
    pub fn seek(&mut self, position_secs: f64) {
        if !self.state.is_active() {
            trace!(state = %self.state, position_secs, "Ignoring seek");
            return;
        }
        let Some(duration) = self.driver.as_ref().map(|d| d.duration(&self.sinks)) else {
            return;
        };

        let target = clamp_seek(position_secs, duration);
        if target != position_secs {
            debug!(requested = position_secs, target, "Seek target clamped");
        }

        let from_end = self.state == PlaybackState::Ended;
        if from_end {
            self.wants_playing = false;
        }

        let ctx = self.ctx();
        let mut out = Vec::new();
        if let Some(driver) = self.driver.as_mut() {
            if from_end {
                driver.pause(&mut self.sinks);
            }
            driver.seek(&mut self.sinks, target, ctx, &mut out);
        }
        if from_end {
            self.set_state(PlaybackState::Paused);
        }
        self.apply_signals(out);
    }

    /// Set the playback rate, clamped into `[0.5, 3.0]`
    ///
    /// The rate outlives the current source and is re-applied on every
    /// resource change. Returns the rate actually applied.
    pub fn set_playback_rate(&mut self, rate: f64) -> f64 {
        let clamped = clamp_rate(rate);
        if clamped != rate {
            debug!(requested = rate, clamped, "Playback rate clamped");
        }
        self.rate = clamped;
        if let Some(driver) = self.driver.as_mut() {
            driver.set_rate(&mut self.sinks, clamped);
        }
        clamped
    }

    /// Detach the current source and return to `Idle`
    pub fn stop(&mut self) {
        if self.driver.is_some() {
            info!("Stopping playback");
        }
        self.detach_driver();
        self.source = None;
        self.error = None;
        self.wants_playing = false;
        self.last_duration = None;
        self.set_state(PlaybackState::Idle);
    }

    /// Continue a sequential source past the segment that failed
    ///
    /// The failed segment counts as zero-length on the virtual timeline.
    pub fn skip_failed_segment(&mut self) -> Result<()> {
        if !matches!(self.error, Some(ErrorKind::SegmentUnavailable { .. })) {
            return Err(PlaybackError::InvalidOperation(
                "no failed segment to skip".to_string(),
            ));
        }
        let ctx = self.ctx();
        let Some(driver) = self.driver.as_mut() else {
            return Err(PlaybackError::NoSource);
        };

        let mut out = Vec::new();
        driver.skip_failed(&mut self.sinks, ctx, &mut out)?;

        self.error = None;
        self.set_state(PlaybackState::Loading);
        self.apply_signals(out);
        Ok(())
    }

    /// Apply a serialized command
    pub fn apply(&mut self, command: PlaybackCommand) -> Result<()> {
        match command {
            PlaybackCommand::Play { source } => self.play(source)?,
            PlaybackCommand::Pause => self.pause(),
            PlaybackCommand::Resume => self.resume(),
            PlaybackCommand::TogglePlay => self.toggle_play(),
            PlaybackCommand::Seek { position_secs } => self.seek(position_secs),
            PlaybackCommand::SetRate { rate } => {
                self.set_playback_rate(rate);
            }
            PlaybackCommand::Stop => self.stop(),
            PlaybackCommand::SkipFailedSegment => self.skip_failed_segment()?,
        }
        Ok(())
    }

    // ===== Event intake =====

    /// Deliver a native sink event
    pub fn handle_sink_event(&mut self, ticket: SinkTicket, event: SinkEvent) {
        let Some(slot) = self.sinks.slot_for(ticket) else {
            trace!(ticket = ticket.id(), ?event, "Dropping stale sink event");
            return;
        };
        if !self.state.is_active() {
            return;
        }

        let ctx = self.ctx();
        let mut out = Vec::new();
        if let Some(driver) = self.driver.as_mut() {
            driver.on_sink_event(&mut self.sinks, slot, event, ctx, &mut out);
        }
        self.apply_signals(out);
    }

    /// Deliver an adaptive engine event
    pub fn handle_engine_event(&mut self, ticket: EngineTicket, event: EngineEvent) {
        if !self.state.is_active() {
            trace!(engine = ticket.id(), ?event, "Ignoring engine event while inactive");
            return;
        }

        let mut out = Vec::new();
        let accepted = self
            .driver
            .as_mut()
            .is_some_and(|driver| driver.on_engine_event(ticket, event.clone(), &mut out));
        if !accepted {
            trace!(engine = ticket.id(), ?event, "Dropping stale engine event");
            return;
        }
        self.apply_signals(out);
    }

    // ===== Queries =====

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Virtual time in seconds (0 without a source)
    pub fn current_time(&self) -> f64 {
        self.driver
            .as_ref()
            .map_or(0.0, |driver| driver.current_time(&self.sinks))
    }

    /// Virtual duration, once known
    pub fn duration(&self) -> Option<f64> {
        self.driver
            .as_ref()
            .and_then(|driver| driver.duration(&self.sinks))
    }

    pub fn playback_rate(&self) -> f64 {
        self.rate
    }

    pub fn source(&self) -> Option<&PlaybackSource> {
        self.source.as_ref()
    }

    /// Current segment of a sequential source
    pub fn segment_index(&self) -> Option<usize> {
        self.driver.as_ref().and_then(SourceDriver::segment_index)
    }

    /// Durations known for a sequential source
    pub fn segment_table(&self) -> Option<&SegmentTable> {
        self.driver.as_ref().and_then(SourceDriver::segment_table)
    }

    /// Sink the host should show; sequential sources alternate between the
    /// primary and the preload sink at segment boundaries
    pub fn active_slot(&self) -> Option<SinkSlot> {
        self.driver.as_ref().map(SourceDriver::active_slot)
    }

    /// Quality level last reported by the adaptive engine
    pub fn quality_level(&self) -> Option<usize> {
        self.driver.as_ref().and_then(SourceDriver::quality_level)
    }

    /// Failure that stopped the current source
    pub fn error(&self) -> Option<ErrorKind> {
        self.error
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    // ===== Internals =====

    fn ctx(&self) -> DriverContext {
        DriverContext {
            rate: self.rate,
            preload_threshold_secs: self.config.preload_threshold_secs,
        }
    }

    fn detach_driver(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.detach(&mut self.sinks);
            debug!(kind = ?driver.kind(), "Driver detached");
        }
        self.sinks.release_all();
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "State change");
            self.state = state;
            self.listener.on_state_change(state);
        }
    }

    fn apply_signals(&mut self, signals: Vec<Signal>) {
        for signal in signals {
            match signal {
                Signal::Loading => {
                    if self.state.is_active() {
                        self.set_state(PlaybackState::Loading);
                    }
                }
                Signal::Ready => {
                    if matches!(self.state, PlaybackState::Loading | PlaybackState::Buffering) {
                        let next = if self.wants_playing {
                            PlaybackState::Playing
                        } else {
                            PlaybackState::Paused
                        };
                        self.set_state(next);
                    }
                }
                Signal::Playing => {
                    if self.state == PlaybackState::Buffering && self.wants_playing {
                        self.set_state(PlaybackState::Playing);
                    }
                }
                Signal::Buffering => {
                    if self.state == PlaybackState::Playing {
                        self.set_state(PlaybackState::Buffering);
                    }
                }
                Signal::Time(time) => self.listener.on_time_update(time),
                Signal::Duration(duration) => {
                    if self.last_duration != Some(duration) {
                        self.last_duration = Some(duration);
                        self.listener.on_duration_change(duration);
                    }
                }
                Signal::Segment(index) => self.listener.on_segment_change(index),
                Signal::Quality(level) => self.listener.on_quality_change(level),
                Signal::Ended => {
                    self.wants_playing = false;
                    self.set_state(PlaybackState::Ended);
                }
                Signal::Failed(kind, message) => {
                    self.fail(kind, &message);
                    // Nothing after a failure belongs to a live source
                    return;
                }
            }
        }
    }

    fn fail(&mut self, kind: ErrorKind, message: &str) {
        if self.error.is_some() {
            return;
        }
        warn!(%kind, message, "Source failed");

        // Play intent is kept for skip_failed_segment
        self.error = Some(kind);
        if let Some(driver) = self.driver.as_mut() {
            driver.halt(&mut self.sinks);
        }
        self.listener.on_error(kind, message);
        self.set_state(PlaybackState::Errored);
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.detach_driver();
    }
}
