/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Boot-time rendezvous between the primary and secondary execution contexts.
//!
//! Each side owns one one-directional [`ReadyFlag`] and polls the other's.
//! There is no barrier object: the primary raises its flag and then polls for
//! the secondary; the secondary polls for the primary, runs its setup and
//! raises its own flag.
//!
//! [`CoreSync`] is the only state the two contexts share.  Besides the flags
//! it carries values the primary publishes before raising its flag, and a
//! snapshot of the secondary's statistics, republished after every secondary
//! tick.  The secondary measures into its own table outside the lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::stat::RuntimeStat;

// ── ReadyFlag ─────────────────────────────────────────────────────────────────

/// Monotonic false → true flag, single writer.
#[derive(Debug, Default)]
pub struct ReadyFlag(AtomicBool);

impl ReadyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Poll every `poll` until the flag is raised.
    ///
    /// With `timeout = None` this waits forever.  Returns `false` only when
    /// the timeout expired first.
    pub fn wait(&self, poll: Duration, timeout: Option<Duration>) -> bool {
        let start = Instant::now();
        loop {
            if self.is_raised() {
                return true;
            }
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    return false;
                }
            }
            thread::sleep(poll);
        }
    }
}

// ── CoreSync ──────────────────────────────────────────────────────────────────

/// Statistics entry of one module on the secondary context.
#[derive(Debug, Clone, Default)]
pub struct NamedStat {
    /// Registry index of the module.
    pub module: usize,
    pub name: String,
    pub stat: RuntimeStat,
}

impl NamedStat {
    pub fn new(module: usize, name: &str) -> Self {
        Self {
            module,
            name: name.to_string(),
            stat: RuntimeStat::new(),
        }
    }
}

/// State shared between the two execution contexts.
#[derive(Debug, Default)]
pub struct CoreSync {
    pub primary_ready: ReadyFlag,
    pub secondary_ready: ReadyFlag,
    configured: AtomicBool,
    dual_core: AtomicBool,
    secondary_stats: Mutex<Vec<NamedStat>>,
}

impl CoreSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published by the primary; read by the secondary for its hooks.
    pub fn set_configured(&self, configured: bool) {
        self.configured.store(configured, Ordering::Release);
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    /// Published by the primary before it raises its ready flag.
    pub fn set_dual_core(&self, active: bool) {
        self.dual_core.store(active, Ordering::Release);
    }

    pub fn uses_dual_core(&self) -> bool {
        self.dual_core.load(Ordering::Acquire)
    }

    /// Replace the published copy of the secondary statistics.  The lock is
    /// held for the copy only; measuring happens on the secondary's own table.
    pub fn publish_secondary_stats(&self, stats: &[NamedStat]) {
        if let Ok(mut shared) = self.secondary_stats.lock() {
            shared.clear();
            shared.extend_from_slice(stats);
        }
    }

    /// Last published secondary statistics.
    pub fn secondary_stats(&self) -> Vec<NamedStat> {
        self.secondary_stats
            .lock()
            .map(|shared| shared.clone())
            .unwrap_or_default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
