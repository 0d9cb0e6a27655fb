/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wraparound-safe delay checks and the small timers built on them.
//!
//! All timestamps are raw `u32` counter values.  The elapsed time between two
//! readings is `now - since` in wrapping arithmetic, which stays correct across
//! a counter overflow as long as the real interval is shorter than one full
//! counter period.
//!
//! | Timer | Kind | Purpose |
//! |---|---|---|
//! | [`StartupDelay`] | one-shot | gates the after-startup-delay hooks |
//! | [`Heartbeat`] | periodic | liveness telegram |
//! | [`LoopTimeWarning`] | rate limiter | overrun log at most once per interval |
//! | [`Uptime`] | accumulator | seconds since boot beyond the counter wrap |

// ── Free functions ────────────────────────────────────────────────────────────

/// Elapsed ticks between `since` and `now`, correct across a wrap.
#[inline]
pub fn elapsed(since: u32, now: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Returns `true` once at least `delay` ticks have passed since `since`.
#[inline]
pub fn delay_check(since: u32, delay: u32, now: u32) -> bool {
    elapsed(since, now) >= delay
}

// ── StartupDelay ──────────────────────────────────────────────────────────────

/// One-shot gate that opens `delay_ms` after [`start`](Self::start).
///
/// Without a configured delay the gate opens on the first poll after start.
/// Once open it never closes again.
#[derive(Debug, Clone, Default)]
pub struct StartupDelay {
    delay_ms: Option<u32>,
    started_at: Option<u32>,
    elapsed: bool,
}

impl StartupDelay {
    pub fn new(delay_ms: Option<u32>) -> Self {
        Self {
            delay_ms,
            started_at: None,
            elapsed: false,
        }
    }

    /// Record the reference point (end of module init).
    pub fn start(&mut self, now_ms: u32) {
        self.started_at = Some(now_ms);
    }

    /// Returns `true` exactly once: on the first poll where the delay has
    /// passed.  Every later call returns `false`.
    pub fn poll(&mut self, now_ms: u32) -> bool {
        if self.elapsed {
            return false;
        }
        let Some(started_at) = self.started_at else {
            return false;
        };
        if let Some(delay) = self.delay_ms {
            if !delay_check(started_at, delay, now_ms) {
                return false;
            }
        }
        self.elapsed = true;
        true
    }

    pub fn is_elapsed(&self) -> bool {
        self.elapsed
    }
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────

/// Periodic liveness timer.  The first beat is due immediately.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval_ms: u32,
    last_beat: Option<u32>,
    beats: u64,
}

impl Heartbeat {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_beat: None,
            beats: 0,
        }
    }

    /// Returns `true` when a beat is due and re-arms the timer.
    pub fn poll(&mut self, now_ms: u32) -> bool {
        let due = match self.last_beat {
            None => true,
            Some(last) => delay_check(last, self.interval_ms, now_ms),
        };
        if due {
            self.last_beat = Some(now_ms);
            self.beats += 1;
        }
        due
    }

    pub fn beats(&self) -> u64 {
        self.beats
    }
}

// ── LoopTimeWarning ───────────────────────────────────────────────────────────

/// Rate-limited detector for ticks that ran longer than `threshold_ms`.
///
/// A single tick can opt out through [`skip`](Self::skip); the flag is
/// cleared again at the start of every tick by [`begin_tick`](Self::begin_tick).
#[derive(Debug, Clone)]
pub struct LoopTimeWarning {
    threshold_ms: Option<u32>,
    interval_ms: u32,
    last_warning: Option<u32>,
    skip: bool,
}

impl LoopTimeWarning {
    pub fn new(threshold_ms: Option<u32>, interval_ms: u32) -> Self {
        Self {
            threshold_ms,
            interval_ms,
            last_warning: None,
            skip: false,
        }
    }

    pub fn begin_tick(&mut self) {
        self.skip = false;
    }

    /// Suppress the warning for the current tick.
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Returns `Some(duration_ms)` when the tick that started at `start_ms`
    /// overran and no warning was emitted during the last interval.
    pub fn check(&mut self, start_ms: u32, now_ms: u32) -> Option<u32> {
        let threshold = self.threshold_ms.filter(|t| *t > 1)?;
        if self.skip || !delay_check(start_ms, threshold, now_ms) {
            return None;
        }
        if let Some(last) = self.last_warning {
            if !delay_check(last, self.interval_ms, now_ms) {
                return None;
            }
        }
        self.last_warning = Some(now_ms);
        Some(elapsed(start_ms, now_ms))
    }
}

// ── Uptime ────────────────────────────────────────────────────────────────────

/// Seconds since boot, extended past the 32-bit millisecond wrap by
/// counting overflows.  Must be updated at least once per counter period.
#[derive(Debug, Clone, Default)]
pub struct Uptime {
    last_ms: u32,
    overflows: u32,
}

impl Uptime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, now_ms: u32) {
        if now_ms < self.last_ms {
            self.overflows += 1;
        }
        self.last_ms = now_ms;
    }

    pub fn seconds(&self) -> u64 {
        ((self.overflows as u64) << 32 | self.last_ms as u64) / 1_000
    }

    /// `Dd HH:MM:SS`
    pub fn format(&self) -> String {
        let mut secs = self.seconds();
        let days = secs / 86_400;
        secs -= days * 86_400;
        let hours = secs / 3_600;
        secs -= hours * 3_600;
        let mins = secs / 60;
        secs -= mins * 60;
        format!("{}d {:02}:{:02}:{:02}", days % 10_000, hours, mins, secs)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
