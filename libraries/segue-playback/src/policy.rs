//! Rate and seek policy
//!
//! Stateless functions mapping caller requests onto values the sinks accept.

use crate::timeline::SegmentTable;
use crate::types::{DEFAULT_PLAYBACK_RATE, MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
use serde::{Deserialize, Serialize};

/// Where a virtual-time seek lands on a sequential source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SeekTarget {
    /// Segment start is measured; the local time is exact
    Exact { index: usize, local_time: f64 },

    /// Target lies past the measured boundaries; index and local time rest on
    /// hints and must be re-resolved as real durations arrive
    PendingApprox {
        index: usize,
        estimated_local_time: f64,
    },
}

impl SeekTarget {
    pub fn index(&self) -> usize {
        match *self {
            Self::Exact { index, .. } | Self::PendingApprox { index, .. } => index,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact { .. })
    }
}

/// Clamp a requested rate into `[0.5, 3.0]`
///
/// NaN falls back to the default rate.
pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return DEFAULT_PLAYBACK_RATE;
    }
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// Clamp a seek target into `[0, duration]`
///
/// An unknown or unbounded (live) duration only bounds from below.
pub fn clamp_seek(position_secs: f64, duration: Option<f64>) -> f64 {
    if position_secs.is_nan() {
        return 0.0;
    }
    let position = position_secs.max(0.0);
    match duration {
        Some(d) if d.is_finite() && d >= 0.0 => position.min(d),
        _ => position,
    }
}

/// Map a virtual time onto a segment of `table`
///
/// Linear scan over the best known boundaries. A time exactly on a boundary
/// belongs to the later segment, so it starts at local time 0. Times past the
/// end land at the end of the last segment. Returns `None` for an empty
/// table.
pub fn resolve_seek_target(virtual_time: f64, table: &SegmentTable) -> Option<SeekTarget> {
    let last = table.len().checked_sub(1)?;
    let target = virtual_time.max(0.0);
    let measured = table.measured_prefix();

    let mut start = 0.0;
    for index in 0..=last {
        let length = table.estimate(index);
        let end = start + length;

        if target < end || index == last {
            let mut local_time = (target - start).max(0.0);
            if index == last && table.is_measured(index) {
                local_time = local_time.min(length);
            }

            return Some(if index < measured {
                SeekTarget::Exact { index, local_time }
            } else {
                SeekTarget::PendingApprox {
                    index,
                    estimated_local_time: local_time,
                }
            });
        }

        start = end;
    }

    None
}
