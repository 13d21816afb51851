//! Virtual timeline bookkeeping for sequential sources
//!
//! Each segment contributes its measured duration once known and its hint
//! (or the configured fallback) until then. Offsets are recomputed from the
//! table on demand; segment counts are in the tens, so linear scans are fine.

use serde::{Deserialize, Serialize};

/// Duration knowledge for one segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpan {
    /// Duration supplied with the source
    pub hint: Option<f64>,
    /// Duration reported by the sink (or zero for a skipped segment)
    pub measured: Option<f64>,
}

/// Per-segment durations of a sequential source
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTable {
    spans: Vec<SegmentSpan>,
    fallback: f64,
}

impl SegmentTable {
    /// Build a table from hints; `fallback` stands in for missing ones
    pub fn from_hints(hints: impl IntoIterator<Item = Option<f64>>, fallback: f64) -> Self {
        Self {
            spans: hints
                .into_iter()
                .map(|hint| SegmentSpan {
                    hint,
                    measured: None,
                })
                .collect(),
            fallback,
        }
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn spans(&self) -> &[SegmentSpan] {
        &self.spans
    }

    /// Best known duration of segment `index`
    pub fn estimate(&self, index: usize) -> f64 {
        self.spans
            .get(index)
            .map(|span| span.measured.or(span.hint).unwrap_or(self.fallback))
            .unwrap_or(0.0)
    }

    pub fn is_measured(&self, index: usize) -> bool {
        self.spans
            .get(index)
            .is_some_and(|span| span.measured.is_some())
    }

    /// Record the real duration of a segment
    ///
    /// Returns true when the table total changed.
    pub fn record(&mut self, index: usize, secs: f64) -> bool {
        if !secs.is_finite() || secs < 0.0 {
            return false;
        }
        let before = self.estimate(index);
        match self.spans.get_mut(index) {
            Some(span) => {
                span.measured = Some(secs);
                (before - secs).abs() > f64::EPSILON
            }
            None => false,
        }
    }

    /// Virtual time at which segment `index` starts
    pub fn start_offset(&self, index: usize) -> f64 {
        (0..index.min(self.len())).map(|i| self.estimate(i)).sum()
    }

    /// Sum of all best known durations
    pub fn total(&self) -> f64 {
        self.start_offset(self.len())
    }

    /// Number of leading segments whose duration is measured
    pub fn measured_prefix(&self) -> usize {
        self.spans
            .iter()
            .take_while(|span| span.measured.is_some())
            .count()
    }

    /// First segment whose duration has not been measured
    pub fn first_unmeasured(&self) -> Option<usize> {
        let prefix = self.measured_prefix();
        (prefix < self.len()).then_some(prefix)
    }
}

/// Position of the sequential driver on the table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentCursor {
    pub index: usize,
    pub segment_start_offset_secs: f64,
}

impl SegmentCursor {
    /// Cursor at `index`, offset taken from `table`
    pub fn at(index: usize, table: &SegmentTable) -> Self {
        Self {
            index,
            segment_start_offset_secs: table.start_offset(index),
        }
    }
}
