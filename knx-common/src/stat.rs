/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Runtime statistics of measured regions.
//!
//! A [`RuntimeStat`] accumulates the durations of one measured region (one
//! module's periodic work on one execution context, or a fixed framework
//! phase).  It never influences control flow; it only feeds the `runtime`
//! console commands.
//!
//! Each entry has exactly one writer: the call-site that measures it.  The
//! secondary context keeps its own entries.

use std::fmt::Write as _;

use crate::timer::elapsed;

// ── Histogram ─────────────────────────────────────────────────────────────────

/// Upper bounds (exclusive, µs) of the histogram buckets.  The last bucket
/// collects everything at or above the final bound.
pub const HISTOGRAM_BOUNDS_US: [u32; 7] = [10, 50, 100, 500, 1_000, 5_000, 10_000];

/// Number of buckets including the overflow bucket.
pub const HISTOGRAM_BUCKETS: usize = HISTOGRAM_BOUNDS_US.len() + 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatHistogram {
    buckets: [u64; HISTOGRAM_BUCKETS],
}

impl StatHistogram {
    pub fn record(&mut self, duration_us: u32) {
        let idx = HISTOGRAM_BOUNDS_US
            .iter()
            .position(|&bound| duration_us < bound)
            .unwrap_or(HISTOGRAM_BUCKETS - 1);
        self.buckets[idx] += 1;
    }

    pub fn buckets(&self) -> &[u64; HISTOGRAM_BUCKETS] {
        &self.buckets
    }

    /// Bucket labels in display order, e.g. `<10`, `<50`, … `>=10000`.
    pub fn labels() -> Vec<String> {
        let mut labels: Vec<String> = HISTOGRAM_BOUNDS_US
            .iter()
            .map(|b| format!("<{b}"))
            .collect();
        labels.push(format!(">={}", HISTOGRAM_BOUNDS_US[HISTOGRAM_BOUNDS_US.len() - 1]));
        labels
    }
}

// ── RuntimeStat ───────────────────────────────────────────────────────────────

/// Duration accumulator for one measured region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeStat {
    count: u64,
    min_us: u32,
    max_us: u32,
    sum_us: u64,
    histogram: StatHistogram,
    started_at: Option<u32>,
}

impl RuntimeStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a measurement.
    pub fn begin(&mut self, now_us: u32) {
        self.started_at = Some(now_us);
    }

    /// Close the measurement opened by [`begin`](Self::begin).  A call
    /// without a matching `begin` is ignored.
    pub fn end(&mut self, now_us: u32) {
        if let Some(start) = self.started_at.take() {
            self.record(elapsed(start, now_us));
        }
    }

    /// Add one sample.
    pub fn record(&mut self, duration_us: u32) {
        if self.count == 0 {
            self.min_us = duration_us;
            self.max_us = duration_us;
        } else {
            self.min_us = self.min_us.min(duration_us);
            self.max_us = self.max_us.max(duration_us);
        }
        self.count += 1;
        self.sum_us += duration_us as u64;
        self.histogram.record(duration_us);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min_us(&self) -> Option<u32> {
        (self.count > 0).then_some(self.min_us)
    }

    pub fn max_us(&self) -> Option<u32> {
        (self.count > 0).then_some(self.max_us)
    }

    pub fn avg_us(&self) -> Option<u64> {
        (self.count > 0).then(|| self.sum_us / self.count)
    }

    pub fn histogram(&self) -> &StatHistogram {
        &self.histogram
    }

    // ── Formatting ────────────────────────────────────────────────────────────

    /// Column header matching [`show`](Self::show).
    pub fn header(stat: bool, hist: bool) -> String {
        let mut line = format!("{:<24} {:>4}", "Name", "Ctx");
        if stat {
            let _ = write!(
                line,
                " {:>10} {:>8} {:>8} {:>8}",
                "Count", "Min", "Avg", "Max"
            );
        }
        if hist {
            for label in StatHistogram::labels() {
                let _ = write!(line, " {:>8}", label);
            }
        }
        line
    }

    /// One dump line: name, context, count, min/avg/max µs and, if requested,
    /// the histogram buckets.
    pub fn show(&self, name: &str, context: u8, stat: bool, hist: bool) -> String {
        let mut line = format!("{:<24} {:>4}", name, context);
        if stat {
            let fmt_opt = |v: Option<u64>| v.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
            let _ = write!(
                line,
                " {:>10} {:>8} {:>8} {:>8}",
                self.count,
                fmt_opt(self.min_us().map(u64::from)),
                fmt_opt(self.avg_us()),
                fmt_opt(self.max_us().map(u64::from)),
            );
        }
        if hist {
            for n in self.histogram.buckets() {
                let _ = write!(line, " {:>8}", n);
            }
        }
        line
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
