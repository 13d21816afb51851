//! Source drivers
//!
//! A closed set of strategies selected once per `play`. The session only
//! talks to [`SourceDriver`]; it never looks inside a variant.

use crate::adaptive::AdaptiveDriver;
use crate::engine::{EngineEvent, EngineTicket};
use crate::error::{PlaybackError, Result};
use crate::sequential::SequentialDriver;
use crate::sink::{SinkEvent, SinkSet, SinkSlot};
use crate::source::SourceKind;
use crate::timeline::SegmentTable;
use crate::types::ErrorKind;

/// What a driver tells the session after handling a command or event
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Signal {
    /// A (new) resource is loading and playback cannot continue yet
    Loading,
    /// The resource the session waits on can render
    Ready,
    /// Sink resumed rendering
    Playing,
    /// Sink ran out of data
    Buffering,
    /// Virtual clock advanced
    Time(f64),
    /// Virtual duration changed
    Duration(f64),
    /// Sequential cursor moved to another segment
    Segment(usize),
    /// Adaptive engine switched quality level
    Quality(usize),
    /// Source played to its end
    Ended,
    /// Source cannot continue
    Failed(ErrorKind, String),
}

/// Values the session owns but drivers must apply
#[derive(Debug, Clone, Copy)]
pub(crate) struct DriverContext {
    pub(crate) rate: f64,
    pub(crate) preload_threshold_secs: f64,
}

pub(crate) enum SourceDriver {
    Adaptive(AdaptiveDriver),
    Sequential(SequentialDriver),
}

impl SourceDriver {
    pub(crate) fn kind(&self) -> SourceKind {
        match self {
            Self::Adaptive(_) => SourceKind::Adaptive,
            Self::Sequential(_) => SourceKind::Sequential,
        }
    }

    pub(crate) fn play(&mut self, sinks: &mut SinkSet) {
        match self {
            Self::Adaptive(d) => d.play(sinks),
            Self::Sequential(d) => d.play(sinks),
        }
    }

    pub(crate) fn pause(&mut self, sinks: &mut SinkSet) {
        match self {
            Self::Adaptive(d) => d.pause(sinks),
            Self::Sequential(d) => d.pause(sinks),
        }
    }

    pub(crate) fn seek(
        &mut self,
        sinks: &mut SinkSet,
        position_secs: f64,
        ctx: DriverContext,
        out: &mut Vec<Signal>,
    ) {
        match self {
            Self::Adaptive(d) => d.seek(sinks, position_secs, out),
            Self::Sequential(d) => d.seek(sinks, position_secs, ctx, out),
        }
    }

    pub(crate) fn set_rate(&mut self, sinks: &mut SinkSet, rate: f64) {
        match self {
            Self::Adaptive(d) => d.set_rate(sinks, rate),
            Self::Sequential(d) => d.set_rate(sinks, rate),
        }
    }

    pub(crate) fn current_time(&self, sinks: &SinkSet) -> f64 {
        match self {
            Self::Adaptive(d) => d.current_time(sinks),
            Self::Sequential(d) => d.current_time(sinks),
        }
    }

    pub(crate) fn duration(&self, sinks: &SinkSet) -> Option<f64> {
        match self {
            Self::Adaptive(d) => d.duration(sinks),
            Self::Sequential(d) => Some(d.duration()),
        }
    }

    pub(crate) fn segment_index(&self) -> Option<usize> {
        match self {
            Self::Adaptive(_) => None,
            Self::Sequential(d) => Some(d.cursor().index),
        }
    }

    pub(crate) fn active_slot(&self) -> SinkSlot {
        match self {
            Self::Adaptive(_) => SinkSlot::Primary,
            Self::Sequential(d) => d.active_slot(),
        }
    }

    pub(crate) fn quality_level(&self) -> Option<usize> {
        match self {
            Self::Adaptive(d) => d.level(),
            Self::Sequential(_) => None,
        }
    }

    pub(crate) fn segment_table(&self) -> Option<&SegmentTable> {
        match self {
            Self::Adaptive(_) => None,
            Self::Sequential(d) => Some(d.table()),
        }
    }

    /// Continue a sequential source past its failed segment
    pub(crate) fn skip_failed(
        &mut self,
        sinks: &mut SinkSet,
        ctx: DriverContext,
        out: &mut Vec<Signal>,
    ) -> Result<()> {
        match self {
            Self::Adaptive(_) => Err(PlaybackError::InvalidOperation(
                "adaptive sources have no segments to skip".to_string(),
            )),
            Self::Sequential(d) => d.skip_failed(sinks, ctx, out),
        }
    }

    pub(crate) fn on_sink_event(
        &mut self,
        sinks: &mut SinkSet,
        slot: SinkSlot,
        event: SinkEvent,
        ctx: DriverContext,
        out: &mut Vec<Signal>,
    ) {
        match self {
            Self::Adaptive(d) => d.on_sink_event(sinks, slot, event, ctx, out),
            Self::Sequential(d) => d.on_sink_event(sinks, slot, event, ctx, out),
        }
    }

    /// Engine events only reach the adaptive driver that owns `ticket`
    pub(crate) fn on_engine_event(
        &mut self,
        ticket: EngineTicket,
        event: EngineEvent,
        out: &mut Vec<Signal>,
    ) -> bool {
        match self {
            Self::Adaptive(d) if d.owns(ticket) => {
                d.on_engine_event(event, out);
                true
            }
            _ => false,
        }
    }

    /// Stop driving the sinks after a failure, keeping enough state for an
    /// explicit recovery
    pub(crate) fn halt(&mut self, sinks: &mut SinkSet) {
        match self {
            Self::Adaptive(d) => d.detach(sinks),
            Self::Sequential(d) => d.halt(sinks),
        }
    }

    /// Release everything; no event of this driver is accepted afterwards
    pub(crate) fn detach(&mut self, sinks: &mut SinkSet) {
        match self {
            Self::Adaptive(d) => d.detach(sinks),
            Self::Sequential(d) => d.detach(sinks),
        }
    }
}
