//! Adaptive source driver
//!
//! Binds an adaptive decode engine to the primary sink for one playlist and
//! classifies what it reports. Quality switches and non-fatal engine errors
//! are absorbed; fatal ones end the source.

use crate::driver::{DriverContext, Signal};
use crate::engine::{
    AdaptiveEngine, AdaptiveEngineFactory, EngineErrorType, EngineEvent, EngineOptions,
    EngineTicket,
};
use crate::sink::{SinkEvent, SinkSet, SinkSlot};
use crate::types::ErrorKind;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Loading,
    Ready,
    Ended,
    Detached,
}

pub(crate) struct AdaptiveDriver {
    playlist_url: String,
    engine: Option<(EngineTicket, Box<dyn AdaptiveEngine>)>,
    phase: Phase,
    playing: bool,
    /// Seek requested before the first frame was ready
    start_at: Option<f64>,
    level: Option<usize>,
}

impl AdaptiveDriver {
    /// Attach `playlist_url` to the primary sink
    ///
    /// Without a (supported) engine factory the playlist goes straight to
    /// the sink, relying on native playlist support.
    pub(crate) fn attach(
        playlist_url: &str,
        sinks: &mut SinkSet,
        engines: Option<&mut (dyn AdaptiveEngineFactory + 'static)>,
        options: EngineOptions,
        ticket: EngineTicket,
        rate: f64,
        autoplay: bool,
    ) -> Self {
        let engine = match engines {
            Some(factory) if factory.is_supported() => {
                let mut engine = factory.create(options, ticket);
                if let Some(sink_ticket) = sinks.bind(SinkSlot::Primary) {
                    if let Some(sink) = sinks.get_mut(SinkSlot::Primary) {
                        engine.attach_media(sink, sink_ticket);
                    }
                }
                engine.load_source(playlist_url);
                info!(
                    url = playlist_url,
                    engine = ticket.id(),
                    retries = options.max_load_retries,
                    "Adaptive engine attached"
                );
                Some((ticket, engine))
            }
            _ => {
                sinks.load(SinkSlot::Primary, playlist_url);
                info!(url = playlist_url, "Playlist handed to sink (native playback)");
                None
            }
        };

        if let Some(sink) = sinks.get_mut(SinkSlot::Primary) {
            sink.set_rate(rate);
        }

        Self {
            playlist_url: playlist_url.to_string(),
            engine,
            phase: Phase::Loading,
            playing: autoplay,
            start_at: None,
            level: None,
        }
    }

    pub(crate) fn owns(&self, ticket: EngineTicket) -> bool {
        self.engine.as_ref().is_some_and(|(own, _)| *own == ticket)
    }

    pub(crate) fn level(&self) -> Option<usize> {
        self.level
    }

    pub(crate) fn play(&mut self, sinks: &mut SinkSet) {
        self.playing = true;
        if self.phase == Phase::Ready {
            if let Some(sink) = sinks.get_mut(SinkSlot::Primary) {
                sink.play();
            }
        }
    }

    pub(crate) fn pause(&mut self, sinks: &mut SinkSet) {
        self.playing = false;
        if matches!(self.phase, Phase::Ready | Phase::Ended) {
            if let Some(sink) = sinks.get_mut(SinkSlot::Primary) {
                sink.pause();
            }
        }
    }

    pub(crate) fn seek(&mut self, sinks: &mut SinkSet, position_secs: f64, out: &mut Vec<Signal>) {
        match self.phase {
            Phase::Loading => self.start_at = Some(position_secs),
            Phase::Ready | Phase::Ended => {
                if let Some(sink) = sinks.get_mut(SinkSlot::Primary) {
                    sink.seek(position_secs);
                }
                self.phase = Phase::Ready;
            }
            Phase::Detached => return,
        }
        out.push(Signal::Time(position_secs));
    }

    pub(crate) fn set_rate(&mut self, sinks: &mut SinkSet, rate: f64) {
        if sinks.is_bound(SinkSlot::Primary) {
            if let Some(sink) = sinks.get_mut(SinkSlot::Primary) {
                sink.set_rate(rate);
            }
        }
    }

    pub(crate) fn current_time(&self, sinks: &SinkSet) -> f64 {
        match self.phase {
            Phase::Loading => self.start_at.unwrap_or(0.0),
            _ => sinks
                .get(SinkSlot::Primary)
                .map(|sink| sink.current_time())
                .unwrap_or(0.0),
        }
    }

    pub(crate) fn duration(&self, sinks: &SinkSet) -> Option<f64> {
        sinks
            .get(SinkSlot::Primary)
            .and_then(|sink| sink.duration())
            .filter(|d| !d.is_nan())
    }

    pub(crate) fn on_sink_event(
        &mut self,
        sinks: &mut SinkSet,
        slot: SinkSlot,
        event: SinkEvent,
        ctx: DriverContext,
        out: &mut Vec<Signal>,
    ) {
        if slot != SinkSlot::Primary || self.phase == Phase::Detached {
            return;
        }

        match event {
            SinkEvent::CanPlay => {
                if self.phase != Phase::Loading {
                    return;
                }
                self.phase = Phase::Ready;
                if let Some(sink) = sinks.get_mut(SinkSlot::Primary) {
                    sink.set_rate(ctx.rate);
                    if let Some(position) = self.start_at.take() {
                        sink.seek(position);
                    }
                    if self.playing {
                        sink.play();
                    }
                }
                out.push(Signal::Ready);
            }
            SinkEvent::Playing => out.push(Signal::Playing),
            SinkEvent::TimeUpdate => {
                if self.phase != Phase::Loading {
                    out.push(Signal::Time(self.current_time(sinks)));
                }
            }
            SinkEvent::DurationChange => {
                if let Some(duration) = self.duration(sinks) {
                    out.push(Signal::Duration(duration));
                }
            }
            SinkEvent::Waiting | SinkEvent::Stalled => {
                debug!(url = %self.playlist_url, ?event, "Adaptive sink buffering");
                out.push(Signal::Buffering);
            }
            SinkEvent::Ended => {
                self.phase = Phase::Ended;
                out.push(Signal::Ended);
            }
            SinkEvent::Error { message } => {
                warn!(url = %self.playlist_url, %message, "Adaptive sink error");
                out.push(Signal::Failed(ErrorKind::Media, message));
            }
        }
    }

    pub(crate) fn on_engine_event(&mut self, event: EngineEvent, out: &mut Vec<Signal>) {
        match event {
            EngineEvent::ManifestParsed { levels } => {
                debug!(url = %self.playlist_url, levels, "Playlist parsed");
            }
            EngineEvent::LevelSwitched { level } => {
                debug!(level, "Quality level switched");
                self.level = Some(level);
                out.push(Signal::Quality(level));
            }
            EngineEvent::Error {
                fatal: false,
                kind,
                details,
            } => {
                debug!(?kind, %details, "Recoverable engine error");
            }
            EngineEvent::Error {
                fatal: true,
                kind,
                details,
            } => {
                let error_kind = classify(kind);
                warn!(url = %self.playlist_url, ?kind, %details, "Fatal engine error");
                out.push(Signal::Failed(error_kind, details));
            }
        }
    }

    /// Destroy the engine, then release the sink
    pub(crate) fn detach(&mut self, sinks: &mut SinkSet) {
        if let Some((ticket, mut engine)) = self.engine.take() {
            engine.destroy();
            debug!(engine = ticket.id(), "Adaptive engine destroyed");
        }
        sinks.release(SinkSlot::Primary);
        self.phase = Phase::Detached;
    }
}

/// Map a fatal engine error onto the reported kind
fn classify(kind: EngineErrorType) -> ErrorKind {
    match kind {
        EngineErrorType::Network => ErrorKind::Network,
        EngineErrorType::Media | EngineErrorType::Other => ErrorKind::Media,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::RecordingEngines;
    use crate::sink::testing::RecordingSink;

    const CTX: DriverContext = DriverContext {
        rate: 1.5,
        preload_threshold_secs: 1.0,
    };

    fn attach(engines: &mut RecordingEngines, sinks: &mut SinkSet) -> AdaptiveDriver {
        AdaptiveDriver::attach(
            "https://cdn.example/live.m3u8",
            sinks,
            Some(engines),
            EngineOptions {
                max_load_retries: 4,
            },
            EngineTicket(7),
            1.5,
            true,
        )
    }

    #[test]
    fn attach_creates_and_binds_engine() {
        let sink = RecordingSink::default();
        let mut sinks = SinkSet::new(Box::new(sink.clone()));
        let mut engines = RecordingEngines::default();

        let driver = attach(&mut engines, &mut sinks);

        let log = engines.log.lock().unwrap();
        assert_eq!(log.created, vec![EngineTicket(7)]);
        assert_eq!(log.options[0].max_load_retries, 4);
        assert_eq!(log.loaded, vec!["https://cdn.example/live.m3u8".to_string()]);
        assert_eq!(sinks.slot_for(log.attached[0]), Some(SinkSlot::Primary));
        assert_eq!(sink.log().rate, 1.5);
        assert!(driver.owns(EngineTicket(7)));
    }

    #[test]
    fn unsupported_engine_falls_back_to_native() {
        let sink = RecordingSink::default();
        let mut sinks = SinkSet::new(Box::new(sink.clone()));
        let mut engines = RecordingEngines {
            unsupported: true,
            ..RecordingEngines::default()
        };

        let driver = attach(&mut engines, &mut sinks);

        assert!(engines.log.lock().unwrap().created.is_empty());
        assert_eq!(
            sink.log().url.as_deref(),
            Some("https://cdn.example/live.m3u8")
        );
        assert!(!driver.owns(EngineTicket(7)));
    }

    #[test]
    fn ready_applies_rate_pending_seek_and_autoplay() {
        let sink = RecordingSink::default();
        let mut sinks = SinkSet::new(Box::new(sink.clone()));
        let mut engines = RecordingEngines::default();
        let mut driver = attach(&mut engines, &mut sinks);
        let mut out = Vec::new();

        driver.seek(&mut sinks, 12.0, &mut out);
        assert!(sink.log().seeks.is_empty());

        driver.on_sink_event(&mut sinks, SinkSlot::Primary, SinkEvent::CanPlay, CTX, &mut out);

        let log = sink.log();
        assert_eq!(log.seeks, vec![12.0]);
        assert!(log.playing);
        assert!(out.contains(&Signal::Ready));
    }

    #[test]
    fn fatal_errors_are_classified() {
        let mut sinks = SinkSet::new(Box::new(RecordingSink::default()));
        let mut engines = RecordingEngines::default();
        let mut driver = attach(&mut engines, &mut sinks);

        let mut out = Vec::new();
        driver.on_engine_event(
            EngineEvent::Error {
                fatal: true,
                kind: EngineErrorType::Network,
                details: "manifestLoadError".into(),
            },
            &mut out,
        );
        driver.on_engine_event(
            EngineEvent::Error {
                fatal: true,
                kind: EngineErrorType::Other,
                details: "muxError".into(),
            },
            &mut out,
        );

        assert_eq!(
            out,
            vec![
                Signal::Failed(ErrorKind::Network, "manifestLoadError".into()),
                Signal::Failed(ErrorKind::Media, "muxError".into()),
            ]
        );
    }

    #[test]
    fn recoverable_errors_and_level_switches_do_not_fail() {
        let mut sinks = SinkSet::new(Box::new(RecordingSink::default()));
        let mut engines = RecordingEngines::default();
        let mut driver = attach(&mut engines, &mut sinks);

        let mut out = Vec::new();
        driver.on_engine_event(
            EngineEvent::Error {
                fatal: false,
                kind: EngineErrorType::Network,
                details: "fragLoadTimeOut".into(),
            },
            &mut out,
        );
        driver.on_engine_event(EngineEvent::LevelSwitched { level: 2 }, &mut out);

        assert_eq!(out, vec![Signal::Quality(2)]);
        assert_eq!(driver.level(), Some(2));
    }

    #[test]
    fn detach_destroys_engine_before_releasing_sink() {
        let sink = RecordingSink::default();
        let mut sinks = SinkSet::new(Box::new(sink.clone()));
        let mut engines = RecordingEngines::default();
        let mut driver = attach(&mut engines, &mut sinks);

        driver.detach(&mut sinks);
        driver.detach(&mut sinks);

        let log = engines.log.lock().unwrap();
        assert_eq!(log.destroyed, 1);
        assert_eq!(log.live, 0);
        assert_eq!(sink.log().unloads, 1);
        assert!(!driver.owns(EngineTicket(7)));
    }
}
