//! Sequential source driver
//!
//! Plays an ordered list of independent files on the sink one at a time and
//! stitches them into one virtual timeline:
//!
//! ```text
//! LoadingSegment(i) --ready--> PlayingSegment(i) --ended--> LoadingSegment(i+1) ... Ended
//!                              PlayingSegment(i) <--stall/resume--> BufferingSegment(i)
//! ```
//!
//! Near the end of a segment the next one is loaded on the standby sink and
//! the two sinks are swapped on `ended`. A failed segment halts the driver;
//! skipping it is left to the caller.

use crate::driver::{DriverContext, Signal};
use crate::error::{PlaybackError, Result};
use crate::policy::{resolve_seek_target, SeekTarget};
use crate::sink::{SinkEvent, SinkSet, SinkSlot};
use crate::source::SegmentDescriptor;
use crate::timeline::{SegmentCursor, SegmentTable};
use crate::types::ErrorKind;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Active sink is loading the cursor's segment
    Loading,
    /// Segment ready; the sink plays or is paused according to `playing`
    Playing,
    /// Sink stalled mid-segment
    Buffering,
    /// Last segment finished
    Ended,
    /// Stopped after a segment failure
    Halted,
    Detached,
}

#[derive(Debug, Clone, Copy)]
struct Preload {
    index: usize,
    slot: SinkSlot,
    ready: bool,
}

pub(crate) struct SequentialDriver {
    segments: Vec<SegmentDescriptor>,
    table: SegmentTable,
    cursor: SegmentCursor,
    active: SinkSlot,
    phase: Phase,
    playing: bool,
    /// Local time to start the loading segment at
    start_at: f64,
    /// Whether the loading resource already reported `CanPlay`
    resource_ready: bool,
    preload: Option<Preload>,
    preload_failed: Option<usize>,
    /// Virtual target of a seek past the measured boundaries
    pending_seek: Option<f64>,
    failed: Option<usize>,
}

impl SequentialDriver {
    pub(crate) fn attach(
        segments: Vec<SegmentDescriptor>,
        sinks: &mut SinkSet,
        unknown_estimate_secs: f64,
        ctx: DriverContext,
        autoplay: bool,
        out: &mut Vec<Signal>,
    ) -> Self {
        let table = SegmentTable::from_hints(
            segments.iter().map(|s| s.duration_hint_secs),
            unknown_estimate_secs,
        );
        let cursor = SegmentCursor::at(0, &table);

        let mut driver = Self {
            segments,
            table,
            cursor,
            active: SinkSlot::Primary,
            phase: Phase::Loading,
            playing: autoplay,
            start_at: 0.0,
            resource_ready: false,
            preload: None,
            preload_failed: None,
            pending_seek: None,
            failed: None,
        };

        info!(
            segments = driver.segments.len(),
            estimate = driver.table.total(),
            "Sequential source attached"
        );
        out.push(Signal::Duration(driver.table.total()));
        driver.switch_to(sinks, 0, 0.0, ctx, out);
        driver
    }

    pub(crate) fn cursor(&self) -> SegmentCursor {
        self.cursor
    }

    /// Slot currently rendering the source
    pub(crate) fn active_slot(&self) -> SinkSlot {
        self.active
    }

    pub(crate) fn table(&self) -> &SegmentTable {
        &self.table
    }

    pub(crate) fn duration(&self) -> f64 {
        self.table.total()
    }

    pub(crate) fn current_time(&self, sinks: &SinkSet) -> f64 {
        if let Some(target) = self.pending_seek {
            return target;
        }
        let offset = self.cursor.segment_start_offset_secs;
        match self.phase {
            Phase::Loading => offset + self.start_at,
            Phase::Halted | Phase::Detached => offset,
            Phase::Playing | Phase::Buffering | Phase::Ended => {
                offset
                    + sinks
                        .get(self.active)
                        .map(|sink| sink.current_time())
                        .unwrap_or(0.0)
            }
        }
    }

    pub(crate) fn play(&mut self, sinks: &mut SinkSet) {
        self.playing = true;
        if matches!(self.phase, Phase::Playing | Phase::Buffering) {
            if let Some(sink) = sinks.get_mut(self.active) {
                sink.play();
            }
        }
    }

    pub(crate) fn pause(&mut self, sinks: &mut SinkSet) {
        self.playing = false;
        if matches!(self.phase, Phase::Playing | Phase::Buffering | Phase::Ended) {
            if let Some(sink) = sinks.get_mut(self.active) {
                sink.pause();
            }
        }
    }

    pub(crate) fn set_rate(&mut self, sinks: &mut SinkSet, rate: f64) {
        let standby = self.preload.map(|p| p.slot);
        for slot in std::iter::once(self.active).chain(standby) {
            if sinks.is_bound(slot) {
                if let Some(sink) = sinks.get_mut(slot) {
                    sink.set_rate(rate);
                }
            }
        }
    }

    /// Seek to an already clamped virtual time
    pub(crate) fn seek(
        &mut self,
        sinks: &mut SinkSet,
        position_secs: f64,
        ctx: DriverContext,
        out: &mut Vec<Signal>,
    ) {
        if matches!(self.phase, Phase::Halted | Phase::Detached) {
            return;
        }
        self.pending_seek = None;

        match resolve_seek_target(position_secs, &self.table) {
            Some(SeekTarget::Exact { index, local_time }) => {
                self.go_to(sinks, index, local_time, ctx, out);
            }
            Some(SeekTarget::PendingApprox {
                index,
                estimated_local_time,
            }) => {
                debug!(
                    target = position_secs,
                    index, estimated_local_time, "Seek past measured boundaries"
                );
                self.pending_seek = Some(position_secs);
                out.push(Signal::Time(position_secs));
                self.measure_active(sinks, out);
                self.resume_pending(sinks, ctx, out);
            }
            None => {}
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
        if matches!(self.phase, Phase::Halted | Phase::Detached) {
            return;
        }
        if slot == self.active {
            self.on_active_event(sinks, event, ctx, out);
        } else if self.preload.is_some_and(|p| p.slot == slot) {
            self.on_standby_event(sinks, event, out);
        }
    }

    fn on_active_event(
        &mut self,
        sinks: &mut SinkSet,
        event: SinkEvent,
        ctx: DriverContext,
        out: &mut Vec<Signal>,
    ) {
        let index = self.cursor.index;

        match event {
            SinkEvent::CanPlay => {
                if self.phase != Phase::Loading {
                    return;
                }
                self.resource_ready = true;
                if self.pending_seek.is_some() {
                    self.measure_active(sinks, out);
                    self.resume_pending(sinks, ctx, out);
                } else {
                    self.become_ready(sinks, ctx, out);
                }
            }
            SinkEvent::DurationChange => {
                self.measure_active(sinks, out);
                if self.pending_seek.is_some() {
                    self.resume_pending(sinks, ctx, out);
                }
            }
            SinkEvent::TimeUpdate => {
                if self.pending_seek.is_some() || self.phase == Phase::Loading {
                    return;
                }
                out.push(Signal::Time(self.current_time(sinks)));
                self.maybe_preload(sinks, ctx);
            }
            SinkEvent::Waiting | SinkEvent::Stalled => {
                if self.phase == Phase::Playing {
                    debug!(index, ?event, "Segment buffering");
                    self.phase = Phase::Buffering;
                    out.push(Signal::Buffering);
                }
            }
            SinkEvent::Playing => {
                if self.phase == Phase::Buffering {
                    self.phase = Phase::Playing;
                }
                if self.phase == Phase::Playing {
                    out.push(Signal::Playing);
                }
            }
            SinkEvent::Ended => {
                if !matches!(self.phase, Phase::Playing | Phase::Buffering) {
                    return;
                }
                let played = sinks
                    .get(self.active)
                    .map(|sink| match sink.duration() {
                        Some(duration) if duration > 0.0 => duration,
                        _ => sink.current_time(),
                    })
                    .unwrap_or(0.0);
                self.record(index, played, out);
                self.advance(sinks, ctx, out);
            }
            SinkEvent::Error { message } => {
                warn!(
                    index,
                    url = %self.segments[index].url,
                    %message,
                    "Segment failed to load"
                );
                out.push(Signal::Failed(
                    ErrorKind::SegmentUnavailable { index },
                    message,
                ));
            }
        }
    }

    fn on_standby_event(&mut self, sinks: &mut SinkSet, event: SinkEvent, out: &mut Vec<Signal>) {
        let Some(mut preload) = self.preload else {
            return;
        };

        match event {
            SinkEvent::CanPlay => {
                preload.ready = true;
                self.preload = Some(preload);
                debug!(index = preload.index, "Preloaded segment ready");
            }
            SinkEvent::DurationChange => {
                let measured = sinks.get(preload.slot).and_then(|sink| sink.duration());
                if let Some(duration) = measured {
                    self.record(preload.index, duration, out);
                }
            }
            SinkEvent::Error { message } => {
                // Surfaced for real once the segment becomes current
                warn!(index = preload.index, %message, "Preload failed");
                sinks.release(preload.slot);
                self.preload = None;
                self.preload_failed = Some(preload.index);
            }
            _ => {}
        }
    }

    /// Record a real duration and keep the cursor offset in sync
    fn record(&mut self, index: usize, secs: f64, out: &mut Vec<Signal>) {
        if self.table.record(index, secs) {
            self.cursor = SegmentCursor::at(self.cursor.index, &self.table);
            out.push(Signal::Duration(self.table.total()));
        }
    }

    /// Measure the active segment from its sink if nothing recorded it yet
    fn measure_active(&mut self, sinks: &SinkSet, out: &mut Vec<Signal>) {
        let index = self.cursor.index;
        if self.phase == Phase::Loading && !self.resource_ready && self.table.is_measured(index) {
            return;
        }
        let measured = sinks
            .get(self.active)
            .filter(|_| sinks.is_bound(self.active))
            .and_then(|sink| sink.duration());
        if let Some(duration) = measured {
            self.record(index, duration, out);
        }
    }

    fn become_ready(&mut self, sinks: &mut SinkSet, ctx: DriverContext, out: &mut Vec<Signal>) {
        if let Some(sink) = sinks.get_mut(self.active) {
            sink.set_rate(ctx.rate);
            if self.start_at > 0.0 {
                sink.seek(self.start_at);
            }
            if self.playing {
                sink.play();
            }
        }
        self.phase = Phase::Playing;
        out.push(Signal::Ready);
        self.push_time(self.cursor.segment_start_offset_secs + self.start_at, out);
    }

    /// Report a virtual time unless a pending seek is still hunting
    fn push_time(&self, time: f64, out: &mut Vec<Signal>) {
        if self.pending_seek.is_none() {
            out.push(Signal::Time(time));
        }
    }

    /// Re-resolve a pending seek against the current table
    fn resume_pending(&mut self, sinks: &mut SinkSet, ctx: DriverContext, out: &mut Vec<Signal>) {
        let Some(target) = self.pending_seek else {
            return;
        };

        match resolve_seek_target(target, &self.table) {
            Some(SeekTarget::Exact { index, local_time }) => {
                debug!(target, index, local_time, "Pending seek resolved");
                self.pending_seek = None;
                if index != self.cursor.index {
                    self.switch_to(sinks, index, local_time, ctx, out);
                } else if self.phase == Phase::Loading {
                    self.start_at = local_time;
                    if self.resource_ready {
                        self.become_ready(sinks, ctx, out);
                    }
                } else {
                    self.go_to(sinks, index, local_time, ctx, out);
                }
            }
            Some(SeekTarget::PendingApprox { .. }) => {
                // Learn the next unknown boundary by loading its segment
                if let Some(hunt) = self.table.first_unmeasured() {
                    if hunt != self.cursor.index {
                        self.switch_to(sinks, hunt, 0.0, ctx, out);
                    }
                }
            }
            None => self.pending_seek = None,
        }
    }

    fn go_to(
        &mut self,
        sinks: &mut SinkSet,
        index: usize,
        local_time: f64,
        ctx: DriverContext,
        out: &mut Vec<Signal>,
    ) {
        if index != self.cursor.index {
            self.switch_to(sinks, index, local_time, ctx, out);
            return;
        }

        if self.phase == Phase::Loading {
            self.start_at = local_time;
        } else if let Some(sink) = sinks.get_mut(self.active) {
            sink.seek(local_time);
            if self.phase == Phase::Ended {
                self.phase = Phase::Playing;
                if self.playing {
                    sink.play();
                }
            }
        }
        out.push(Signal::Time(
            self.cursor.segment_start_offset_secs + local_time,
        ));
    }

    /// Make `index` the current segment, reusing a matching preload
    fn switch_to(
        &mut self,
        sinks: &mut SinkSet,
        index: usize,
        local_time: f64,
        ctx: DriverContext,
        out: &mut Vec<Signal>,
    ) {
        let preload = self.preload.take();
        self.cursor = SegmentCursor::at(index, &self.table);
        self.start_at = local_time;

        match preload {
            Some(preload) if preload.index == index => {
                sinks.release(self.active);
                self.active = preload.slot;
                self.resource_ready = preload.ready;
                debug!(index, ready = preload.ready, slot = ?preload.slot, "Swapped to preloaded segment");

                if let Some(sink) = sinks.get_mut(self.active) {
                    sink.set_rate(ctx.rate);
                }
                out.push(Signal::Segment(index));
                if preload.ready && self.pending_seek.is_none() {
                    self.become_ready(sinks, ctx, out);
                } else {
                    self.phase = Phase::Loading;
                    out.push(Signal::Loading);
                    self.push_time(self.cursor.segment_start_offset_secs + local_time, out);
                    // A hunting seek stays parked until the segment is measured
                    if self.pending_seek.is_some() {
                        self.measure_active(sinks, out);
                        self.resume_pending(sinks, ctx, out);
                    }
                }
            }
            stale => {
                if let Some(stale) = stale {
                    sinks.release(stale.slot);
                }
                let url = self.segments[index].url.clone();
                sinks.load(self.active, &url);
                if let Some(sink) = sinks.get_mut(self.active) {
                    sink.set_rate(ctx.rate);
                }
                self.phase = Phase::Loading;
                self.resource_ready = false;
                debug!(index, url = %url, "Loading segment");

                out.push(Signal::Segment(index));
                out.push(Signal::Loading);
                self.push_time(self.cursor.segment_start_offset_secs + local_time, out);
            }
        }
    }

    fn advance(&mut self, sinks: &mut SinkSet, ctx: DriverContext, out: &mut Vec<Signal>) {
        let next = self.cursor.index + 1;

        if next >= self.segments.len() {
            info!(segments = self.segments.len(), duration = self.table.total(), "Sequential source ended");
            self.phase = Phase::Ended;
            out.push(Signal::Time(self.table.total()));
            out.push(Signal::Ended);
            return;
        }

        debug!(from = self.cursor.index, to = next, "Segment advance");
        self.switch_to(sinks, next, 0.0, ctx, out);
    }

    /// Load the next segment on the standby sink near the end of this one
    fn maybe_preload(&mut self, sinks: &mut SinkSet, ctx: DriverContext) {
        let next = self.cursor.index + 1;
        let standby = self.active.other();

        if next >= self.segments.len()
            || self.preload.is_some()
            || self.preload_failed == Some(next)
            || !sinks.has(standby)
            || self.phase != Phase::Playing
        {
            return;
        }

        let Some(sink) = sinks.get(self.active) else {
            return;
        };
        let length = sink
            .duration()
            .unwrap_or_else(|| self.table.estimate(self.cursor.index));
        let remaining = length - sink.current_time();
        if remaining > ctx.preload_threshold_secs {
            return;
        }

        let url = self.segments[next].url.clone();
        if sinks.load(standby, &url).is_some() {
            if let Some(sink) = sinks.get_mut(standby) {
                sink.set_rate(ctx.rate);
            }
            debug!(index = next, remaining, "Preloading segment");
            self.preload = Some(Preload {
                index: next,
                slot: standby,
                ready: false,
            });
        }
    }

    /// Stop after a failure, keeping the table for an explicit skip
    pub(crate) fn halt(&mut self, sinks: &mut SinkSet) {
        sinks.release_all();
        self.failed = Some(self.cursor.index);
        self.preload = None;
        self.pending_seek = None;
        self.phase = Phase::Halted;
    }

    /// Continue after a halted segment, counting it as zero-length
    pub(crate) fn skip_failed(
        &mut self,
        sinks: &mut SinkSet,
        ctx: DriverContext,
        out: &mut Vec<Signal>,
    ) -> Result<()> {
        let Some(index) = self.failed.take() else {
            return Err(PlaybackError::InvalidOperation(
                "no failed segment to skip".to_string(),
            ));
        };

        warn!(index, url = %self.segments[index].url, "Skipping failed segment");
        self.record(index, 0.0, out);
        self.active = SinkSlot::Primary;

        let next = index + 1;
        if next >= self.segments.len() {
            self.cursor = SegmentCursor::at(index, &self.table);
            self.phase = Phase::Ended;
            out.push(Signal::Time(self.table.total()));
            out.push(Signal::Ended);
            return Ok(());
        }

        self.switch_to(sinks, next, 0.0, ctx, out);
        Ok(())
    }

    pub(crate) fn detach(&mut self, sinks: &mut SinkSet) {
        sinks.release_all();
        self.preload = None;
        self.pending_seek = None;
        self.phase = Phase::Detached;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;

    const CTX: DriverContext = DriverContext {
        rate: 2.0,
        preload_threshold_secs: 1.0,
    };

    struct Rig {
        primary: RecordingSink,
        secondary: RecordingSink,
        sinks: SinkSet,
        driver: SequentialDriver,
        out: Vec<Signal>,
    }

    fn rig(hints: &[Option<f64>]) -> Rig {
        let primary = RecordingSink::default();
        let secondary = RecordingSink::default();
        let mut sinks = SinkSet::new(Box::new(primary.clone()));
        sinks.set_secondary(Box::new(secondary.clone()));

        let segments = hints
            .iter()
            .enumerate()
            .map(|(i, hint)| SegmentDescriptor {
                url: format!("seg{}.mp4", i),
                duration_hint_secs: *hint,
            })
            .collect();

        let mut out = Vec::new();
        let driver = SequentialDriver::attach(segments, &mut sinks, 0.0, CTX, true, &mut out);
        Rig {
            primary,
            secondary,
            sinks,
            driver,
            out,
        }
    }

    impl Rig {
        fn event(&mut self, slot: SinkSlot, event: SinkEvent) {
            self.driver
                .on_sink_event(&mut self.sinks, slot, event, CTX, &mut self.out);
        }

        fn load(&mut self, slot: SinkSlot, duration: f64) {
            let sink = match slot {
                SinkSlot::Primary => &self.primary,
                SinkSlot::Secondary => &self.secondary,
            };
            sink.log().duration = Some(duration);
            self.event(slot, SinkEvent::DurationChange);
            self.event(slot, SinkEvent::CanPlay);
        }

        fn tick(&mut self, slot: SinkSlot, time: f64) {
            let sink = match slot {
                SinkSlot::Primary => &self.primary,
                SinkSlot::Secondary => &self.secondary,
            };
            sink.log().time = time;
            self.event(slot, SinkEvent::TimeUpdate);
        }
    }

    #[test]
    fn attach_loads_first_segment_with_rate() {
        let rig = rig(&[Some(10.0), Some(5.0)]);
        let log = rig.primary.log();
        assert_eq!(log.loads, vec!["seg0.mp4".to_string()]);
        assert_eq!(log.rate, 2.0);
        assert_eq!(rig.out[0], Signal::Duration(15.0));
        assert!(rig.out.contains(&Signal::Loading));
    }

    #[test]
    fn preload_then_swap_on_ended() {
        let mut rig = rig(&[Some(10.0), Some(5.0)]);
        rig.load(SinkSlot::Primary, 10.0);
        assert!(rig.primary.log().playing);

        rig.tick(SinkSlot::Primary, 9.5);
        assert_eq!(rig.secondary.log().loads, vec!["seg1.mp4".to_string()]);
        assert_eq!(rig.secondary.log().rate, 2.0);

        rig.load(SinkSlot::Secondary, 6.0);
        assert!(!rig.secondary.log().playing);

        rig.tick(SinkSlot::Primary, 10.0);
        rig.out.clear();
        rig.event(SinkSlot::Primary, SinkEvent::Ended);

        assert_eq!(rig.driver.cursor().index, 1);
        assert_eq!(rig.driver.cursor().segment_start_offset_secs, 10.0);
        assert!(rig.secondary.log().playing);
        assert_eq!(rig.primary.log().unloads, 1);
        assert!(rig.out.contains(&Signal::Segment(1)));
        assert!(rig.out.contains(&Signal::Time(10.0)));
        assert_eq!(rig.driver.duration(), 16.0);
    }

    #[test]
    fn cold_load_without_preload() {
        let mut rig = rig(&[Some(3.0), Some(3.0)]);
        rig.load(SinkSlot::Primary, 3.0);
        rig.primary.log().time = 3.0;
        rig.event(SinkSlot::Primary, SinkEvent::Ended);

        assert_eq!(
            rig.primary.log().loads,
            vec!["seg0.mp4".to_string(), "seg1.mp4".to_string()]
        );
        assert!(rig.out.contains(&Signal::Loading));
    }

    #[test]
    fn last_segment_ends_source() {
        let mut rig = rig(&[Some(3.0)]);
        rig.load(SinkSlot::Primary, 3.0);
        rig.primary.log().time = 3.0;
        rig.out.clear();
        rig.event(SinkSlot::Primary, SinkEvent::Ended);

        assert_eq!(rig.out, vec![Signal::Time(3.0), Signal::Ended]);
    }

    #[test]
    fn failure_halts_and_skip_continues() {
        let mut rig = rig(&[Some(3.0), Some(3.0), Some(3.0)]);
        rig.event(
            SinkSlot::Primary,
            SinkEvent::Error {
                message: "404".into(),
            },
        );
        assert!(rig.out.contains(&Signal::Failed(
            ErrorKind::SegmentUnavailable { index: 0 },
            "404".into()
        )));

        rig.driver.halt(&mut rig.sinks);
        assert_eq!(rig.primary.log().unloads, 1);

        rig.out.clear();
        rig.driver
            .skip_failed(&mut rig.sinks, CTX, &mut rig.out)
            .unwrap();
        assert_eq!(rig.driver.cursor().index, 1);
        assert_eq!(rig.driver.cursor().segment_start_offset_secs, 0.0);
        assert!(rig.out.contains(&Signal::Duration(6.0)));

        assert!(rig
            .driver
            .skip_failed(&mut rig.sinks, CTX, &mut rig.out)
            .is_err());
    }

    #[test]
    fn stall_and_resume() {
        let mut rig = rig(&[Some(3.0)]);
        rig.load(SinkSlot::Primary, 3.0);
        rig.out.clear();

        rig.event(SinkSlot::Primary, SinkEvent::Waiting);
        rig.event(SinkSlot::Primary, SinkEvent::Playing);
        assert_eq!(rig.out, vec![Signal::Buffering, Signal::Playing]);
    }

    #[test]
    fn pending_seek_hunts_forward() {
        let mut rig = rig(&[Some(10.0), Some(10.0), Some(10.0)]);
        rig.load(SinkSlot::Primary, 10.0);

        // 25s lies in segment 2 by the hints; segment 1 is unmeasured
        rig.driver.seek(&mut rig.sinks, 25.0, CTX, &mut rig.out);
        assert_eq!(rig.driver.cursor().index, 1);
        assert_eq!(rig.driver.current_time(&rig.sinks), 25.0);

        // Segment 1 turns out shorter: 25s now lies in segment 2 at 7s
        rig.load(SinkSlot::Primary, 8.0);
        assert_eq!(rig.driver.cursor().index, 2);
        assert_eq!(rig.driver.cursor().segment_start_offset_secs, 18.0);

        rig.load(SinkSlot::Primary, 10.0);
        assert_eq!(rig.primary.log().seeks.last(), Some(&7.0));
        assert_eq!(rig.driver.current_time(&rig.sinks), 25.0);
    }
}
