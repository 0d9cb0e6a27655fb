/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Free-running millisecond / microsecond time sources.
//!
//! Both counters are `u32` and wrap around exactly like a microcontroller
//! tick counter: milliseconds after ~49.7 days, microseconds after ~71.6
//! minutes.  Every consumer compares timestamps through
//! [`crate::timer::elapsed`] so the wrap is harmless.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A monotonic, wrapping time source.
///
/// Shared between the primary and secondary execution contexts, hence
/// `Send + Sync`.
pub trait Clock: Send + Sync {
    /// Milliseconds since start, wrapping at `u32::MAX`.
    fn millis(&self) -> u32;

    /// Microseconds since start, wrapping at `u32::MAX`.
    fn micros(&self) -> u32;
}

/// Shared handle used throughout the framework.
pub type SharedClock = Arc<dyn Clock>;

// ── SystemClock ───────────────────────────────────────────────────────────────

/// Host clock backed by [`Instant`].
///
/// The 128-bit elapsed values are truncated to `u32`, which is the same
/// wrapping behaviour a hardware counter shows.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }

    fn micros(&self) -> u32 {
        self.origin.elapsed().as_micros() as u32
    }
}

// ── MockClock ─────────────────────────────────────────────────────────────────

/// Manually advanced clock for deterministic tests and simulations.
///
/// The microsecond counter is the source of truth; milliseconds are kept in
/// a separate counter so a test can place either one right below its wrap
/// point independently.
#[derive(Debug, Default)]
pub struct MockClock {
    millis: AtomicU32,
    micros: AtomicU32,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock whose counters start at the given values.
    pub fn starting_at(millis: u32, micros: u32) -> Self {
        Self {
            millis: AtomicU32::new(millis),
            micros: AtomicU32::new(micros),
        }
    }

    /// Advance both counters by `ms` milliseconds (wrapping).
    pub fn advance_ms(&self, ms: u32) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
        self.micros.fetch_add(ms.wrapping_mul(1_000), Ordering::SeqCst);
    }

    /// Advance both counters by `us` microseconds (wrapping).
    ///
    /// The millisecond counter moves by the number of whole milliseconds
    /// crossed, so sub-millisecond steps accumulate correctly.
    pub fn advance_us(&self, us: u32) {
        let before = self.micros.fetch_add(us, Ordering::SeqCst);
        let sub_ms = before % 1_000;
        let crossed = (sub_ms as u64 + us as u64) / 1_000;
        self.millis.fetch_add(crossed as u32, Ordering::SeqCst);
    }

    /// Jump the millisecond counter to an absolute value.
    pub fn set_ms(&self, ms: u32) {
        self.millis.store(ms, Ordering::SeqCst);
    }

    /// Jump the microsecond counter to an absolute value.
    pub fn set_us(&self, us: u32) {
        self.micros.store(us, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn millis(&self) -> u32 {
        self.millis.load(Ordering::SeqCst)
    }

    fn micros(&self) -> u32 {
        self.micros.load(Ordering::SeqCst)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_both_counters() {
        let clock = MockClock::new();
        clock.advance_ms(5);
        assert_eq!(clock.millis(), 5);
        assert_eq!(clock.micros(), 5_000);
    }

    #[test]
    fn sub_millisecond_steps_accumulate() {
        let clock = MockClock::new();
        for _ in 0..4 {
            clock.advance_us(250);
        }
        assert_eq!(clock.micros(), 1_000);
        assert_eq!(clock.millis(), 1);
    }

    #[test]
    fn mock_clock_wraps_like_hardware_counter() {
        let clock = MockClock::starting_at(u32::MAX - 1, 0);
        clock.advance_ms(3);
        assert_eq!(clock.millis(), 1);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.micros();
        let b = clock.micros();
        assert!(b.wrapping_sub(a) < 1_000_000);
    }
}
