/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The secondary execution context.
//!
//! Owns the secondary halves of the modules and runs them on its own thread.
//! It shares nothing with the primary except [`CoreSync`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::FrameworkConfig;
use crate::hal::StatusLed;
use crate::registry::SecondaryEntry;
use crate::rendezvous::{CoreSync, NamedStat};

pub struct SecondaryContext {
    sync: Arc<CoreSync>,
    modules: Vec<SecondaryEntry>,
    stats: Vec<NamedStat>,
    clock: SharedClock,
    led: Option<Box<dyn StatusLed + Send>>,
    led_heartbeat: bool,
    poll: Duration,
    active: bool,
}

impl SecondaryContext {
    pub(super) fn new(
        sync: Arc<CoreSync>,
        modules: Vec<SecondaryEntry>,
        clock: SharedClock,
        config: &FrameworkConfig,
    ) -> Self {
        let stats: Vec<NamedStat> = modules
            .iter()
            .map(|e| NamedStat::new(e.id.index(), &e.name))
            .collect();
        sync.publish_secondary_stats(&stats);
        Self {
            sync,
            modules,
            stats,
            clock,
            led: None,
            led_heartbeat: config.led_heartbeat,
            poll: Duration::from_millis(config.secondary_poll_ms),
            active: false,
        }
    }

    /// Info LED driven by this context.
    pub fn with_led(mut self, led: Box<dyn StatusLed + Send>) -> Self {
        self.led = Some(led);
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Wait for the primary setup, then run every secondary setup hook and
    /// raise the secondary ready flag.
    pub fn setup(&mut self) {
        self.sync.primary_ready.wait(self.poll, None);

        if !self.sync.uses_dual_core() {
            warn!("secondary setup invoked without dual-core modules");
            self.sync.secondary_ready.raise();
            return;
        }

        let configured = self.sync.is_configured();
        info!(modules = self.modules.len(), configured, "setup secondary modules");
        for entry in &mut self.modules {
            entry.module.setup(configured);
        }

        self.active = true;
        self.sync.secondary_ready.raise();
    }

    /// Run every secondary periodic hook once.
    pub fn tick(&mut self) {
        if !self.active || !self.sync.secondary_ready.is_raised() {
            return;
        }

        if self.led_heartbeat {
            if let Some(led) = self.led.as_mut() {
                led.heartbeat();
            }
        }

        let configured = self.sync.is_configured();
        for (entry, named) in self.modules.iter_mut().zip(self.stats.iter_mut()) {
            named.stat.begin(self.clock.micros());
            entry.module.run(configured);
            named.stat.end(self.clock.micros());
        }
        self.sync.publish_secondary_stats(&self.stats);
    }

    /// Setup, then tick until `stop` is set.
    pub fn run(mut self, stop: &AtomicBool) {
        self.setup();
        debug!("secondary loop started");
        while !stop.load(Ordering::Relaxed) {
            self.tick();
            thread::yield_now();
        }
        debug!("secondary loop stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::module::{Module, SecondaryModule};
    use crate::registry::ModuleRegistry;
    use std::sync::atomic::AtomicU64;

    struct Counting(Arc<AtomicU64>);
    impl SecondaryModule for Counting {
        fn run(&mut self, _configured: bool) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct Plain;
    impl Module for Plain {}

    struct Dual(Option<Counting>);
    impl Module for Dual {
        fn name(&self) -> &str {
            "Dual"
        }
        fn take_secondary(&mut self) -> Option<Box<dyn SecondaryModule>> {
            self.0.take().map(|c| Box::new(c) as Box<dyn SecondaryModule>)
        }
    }

    /// Context holding the half of the module at registry index 2.
    fn context(sync: &Arc<CoreSync>, counter: &Arc<AtomicU64>) -> SecondaryContext {
        let mut reg = ModuleRegistry::new(3);
        reg.add(Box::new(Plain)).unwrap();
        reg.add(Box::new(Plain)).unwrap();
        reg.add(Box::new(Dual(Some(Counting(Arc::clone(counter))))))
            .unwrap();

        let config = FrameworkConfig {
            secondary_poll_ms: 1,
            ..FrameworkConfig::default()
        };
        SecondaryContext::new(
            Arc::clone(sync),
            reg.take_secondary(),
            Arc::new(MockClock::new()),
            &config,
        )
    }

    #[test]
    fn tick_before_setup_is_noop() {
        let sync = Arc::new(CoreSync::new());
        let counter = Arc::new(AtomicU64::new(0));
        let mut ctx = context(&sync, &counter);
        ctx.tick();
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn setup_then_tick_measures_into_partition() {
        let sync = Arc::new(CoreSync::new());
        sync.set_dual_core(true);
        sync.primary_ready.raise();
        let counter = Arc::new(AtomicU64::new(0));
        let mut ctx = context(&sync, &counter);

        ctx.setup();
        assert!(sync.secondary_ready.is_raised());
        ctx.tick();
        ctx.tick();

        assert_eq!(counter.load(Ordering::Relaxed), 2);
        let recorded = sync.secondary_stats();
        assert_eq!((recorded[0].module, recorded[0].stat.count()), (2, 2));
    }

    /// Reads the published statistics from inside its own run.
    struct Peeking {
        sync: Arc<CoreSync>,
        seen: Arc<AtomicU64>,
    }
    impl SecondaryModule for Peeking {
        fn run(&mut self, _configured: bool) {
            let count = self.sync.secondary_stats()[0].stat.count();
            self.seen.store(count, Ordering::Relaxed);
        }
    }

    struct PeekingModule(Option<Peeking>);
    impl Module for PeekingModule {
        fn take_secondary(&mut self) -> Option<Box<dyn SecondaryModule>> {
            self.0.take().map(|p| Box::new(p) as Box<dyn SecondaryModule>)
        }
    }

    #[test]
    fn stats_stay_readable_while_modules_run() {
        let sync = Arc::new(CoreSync::new());
        sync.set_dual_core(true);
        sync.primary_ready.raise();
        let seen = Arc::new(AtomicU64::new(u64::MAX));

        let mut reg = ModuleRegistry::new(1);
        reg.add(Box::new(PeekingModule(Some(Peeking {
            sync: Arc::clone(&sync),
            seen: Arc::clone(&seen),
        }))))
        .unwrap();
        let mut ctx = SecondaryContext::new(
            Arc::clone(&sync),
            reg.take_secondary(),
            Arc::new(MockClock::new()),
            &FrameworkConfig::default(),
        );

        ctx.setup();
        ctx.tick();
        assert_eq!(seen.load(Ordering::Relaxed), 0);
        ctx.tick();
        // the snapshot published after the first tick
        assert_eq!(seen.load(Ordering::Relaxed), 1);
        assert_eq!(sync.secondary_stats()[0].stat.count(), 2);
    }

    #[test]
    fn unused_context_raises_flag_and_stays_idle() {
        let sync = Arc::new(CoreSync::new());
        sync.primary_ready.raise();
        let counter = Arc::new(AtomicU64::new(0));
        let mut ctx = context(&sync, &counter);

        ctx.setup();
        ctx.tick();
        assert!(sync.secondary_ready.is_raised());
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn run_stops_on_flag() {
        let sync = Arc::new(CoreSync::new());
        sync.set_dual_core(true);
        sync.primary_ready.raise();
        let counter = Arc::new(AtomicU64::new(0));
        let ctx = context(&sync, &counter);
        let stop = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || ctx.run(&flag));
        while counter.load(Ordering::Relaxed) == 0 {
            thread::yield_now();
        }
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
        assert!(counter.load(Ordering::Relaxed) > 0);
    }
}
