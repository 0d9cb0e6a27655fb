/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Time-budgeted round-robin dispatcher ("free loop").
//!
//! [`Dispatcher::run_pass`] is called once per main-loop tick.  It walks the
//! registry from where the previous tick stopped and calls each module's
//! periodic work until either
//!
//! * the tick's time budget is used up, or
//! * a full pass over all modules has completed.
//!
//! A module is never called twice before every other module had its turn in
//! the same pass, so over any sequence of ticks the call counts of two modules
//! differ by at most one.
//!
//! # Budget semantics
//! The budget is checked **between** invocations only.  A module that runs
//! longer than the remaining budget is not interrupted; the *next* module is
//! deferred to a later tick.  A single module slower than the whole budget is
//! therefore still called exactly once per tick.
//!
//! | Stop reason | Cursor after the tick |
//! |---|---|
//! | pass completed | `processed = 0`, `position` back at the pass start |
//! | budget exhausted | `processed` keeps the partial count, resumed next tick |
//! | empty registry | untouched |

use tracing::trace;

use crate::clock::Clock;
use crate::registry::ModuleRegistry;
use crate::timer::delay_check;

// ── Cursor ────────────────────────────────────────────────────────────────────

/// Resumable position of the dispatcher.
///
/// Invariant (non-empty registry of size `n`): `position < n` and
/// `processed < n` between ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCursor {
    /// Index of the next module to call.
    pub position: usize,
    /// Modules already called in the pass that is in progress.
    pub processed: usize,
}

/// What one [`Dispatcher::run_pass`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Number of module invocations in this tick.
    pub invoked: usize,
    /// A pass finished during this tick.
    pub pass_completed: bool,
    /// The tick stopped because the budget ran out.
    pub budget_exhausted: bool,
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Dispatcher {
    cursor: DispatchCursor,
    budget_us: u32,
    passes: u64,
}

impl Dispatcher {
    pub fn new(budget_us: u32) -> Self {
        Self {
            cursor: DispatchCursor::default(),
            budget_us,
            passes: 0,
        }
    }

    pub fn cursor(&self) -> DispatchCursor {
        self.cursor
    }

    pub fn budget_us(&self) -> u32 {
        self.budget_us
    }

    /// Number of completed passes since start.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// `true` while less than the budget has elapsed since `loop_start_us`.
    pub fn free_loop_time(&self, clock: &dyn Clock, loop_start_us: u32) -> bool {
        !delay_check(loop_start_us, self.budget_us, clock.micros())
    }

    /// Run as many modules as the budget allows, each at most once per pass.
    ///
    /// `loop_start_us` is the timestamp the budget is measured from; every
    /// invocation is timed into the module's [`RuntimeStat`].
    ///
    /// [`RuntimeStat`]: crate::stat::RuntimeStat
    pub fn run_pass(
        &mut self,
        registry: &mut ModuleRegistry,
        clock: &dyn Clock,
        loop_start_us: u32,
        configured: bool,
    ) -> PassReport {
        let size = registry.len();
        let mut report = PassReport::default();

        // Nothing registered (bootstrap / test builds)
        if size == 0 {
            return report;
        }

        debug_assert!(
            self.cursor.position < size && self.cursor.processed < size,
            "dispatch cursor {:?} out of range for {} modules",
            self.cursor,
            size
        );

        loop {
            let (module, stat) = registry.entry_mut(self.cursor.position);
            stat.begin(clock.micros());
            module.run(configured);
            stat.end(clock.micros());
            report.invoked += 1;

            if !self.iterate(size, clock, loop_start_us, &mut report) {
                break;
            }
        }

        trace!(
            invoked = report.invoked,
            position = self.cursor.position,
            processed = self.cursor.processed,
            budget_exhausted = report.budget_exhausted,
            "free loop"
        );
        report
    }

    /// Advance the cursor past the module just called and decide whether the
    /// next one may run in this tick.
    fn iterate(
        &mut self,
        size: usize,
        clock: &dyn Clock,
        loop_start_us: u32,
        report: &mut PassReport,
    ) -> bool {
        self.cursor.processed += 1;
        self.cursor.position += 1;

        // start from the beginning again
        if self.cursor.position >= size {
            self.cursor.position = 0;
        }

        let pass_done = self.cursor.processed >= size;
        if pass_done {
            self.cursor.processed = 0;
            self.passes += 1;
            report.pass_completed = true;
        }

        if !self.free_loop_time(clock, loop_start_us) {
            report.budget_exhausted = true;
            return false;
        }

        !pass_done
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
