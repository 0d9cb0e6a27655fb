/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Module lifecycle and the primary tick.
//!
//! [`Framework`] owns everything the primary execution context needs: the
//! module registry, the dispatcher, the power-loss handler, the timers and
//! the collaborators.  There is exactly one per process, but it is an
//! ordinary value passed around explicitly.
//!
//! # Phases
//!
//! ```text
//! Unconfigured ─init()─► InitDone ─setup()─► SetupPrimaryDone ─┬──────────────► Running
//!                                                               └─(dual core)─► SetupSecondaryDone ─► Running
//!
//! Running ─► PowerLossTriggered ─► PowerLossSaved ─► Restoring ─┬─► Running
//!                                                               └─► RebootPending ─► Terminal(Restart)
//!
//! any running phase ─ fatal ─► Terminal(Fatal)
//! ```
//!
//! # Tick order
//!
//! | # | Step | Condition |
//! |---|---|---|
//! | 1 | clear loop-warning skip, update uptime | always |
//! | 2 | return | setup not complete |
//! | 3 | LED heartbeat | `led_heartbeat` |
//! | 4 | console (one queued command) | |
//! | 5 | protocol stack poll | |
//! | 6 | heartbeat, power-loss save/restore, after-startup-delay | configured |
//! | 7 | dispatcher pass | |
//! | 8 | watchdog feed | watchdog enabled |
//! | 9 | loop-time warning, fatal signal, buttons | |

mod secondary;

pub use secondary::SecondaryContext;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::button::Button;
use crate::clock::SharedClock;
use crate::config::FrameworkConfig;
use crate::dispatcher::{DispatchCursor, Dispatcher};
use crate::error::{FatalCode, FatalSignal, RegistryError};
use crate::hal::{Collaborators, DEFAULT_PULSE_MS};
use crate::module::{InputEvent, Module};
use crate::power::{PowerLossHandler, PowerLossTrigger, PowerState, PowerStep};
use crate::registry::{ModuleId, ModuleRegistry};
use crate::rendezvous::CoreSync;
use crate::stat::RuntimeStat;
use crate::timer::{delay_check, Heartbeat, LoopTimeWarning, StartupDelay, Uptime};

/// Longest command accepted through the diagnostic group object.
pub const DIAGNOSE_COMMAND_LEN: usize = 14;

// ── Phase ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    Restart,
    Fatal(FatalCode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unconfigured,
    InitDone,
    SetupPrimaryDone,
    SetupSecondaryDone,
    Running,
    PowerLossTriggered,
    PowerLossSaved,
    Restoring,
    RebootPending,
    Terminal(TerminalReason),
}

// ── Framework statistics ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct FrameworkStats {
    tick: RuntimeStat,
    console: RuntimeStat,
    stack: RuntimeStat,
    modules: RuntimeStat,
}

// ── Framework ─────────────────────────────────────────────────────────────────

pub struct Framework {
    config: FrameworkConfig,
    clock: SharedClock,
    collab: Collaborators,
    registry: ModuleRegistry,
    dispatcher: Dispatcher,
    power: PowerLossHandler,
    sync: Arc<CoreSync>,
    fatal: FatalSignal,
    startup: StartupDelay,
    heartbeat: Option<Heartbeat>,
    loop_warning: LoopTimeWarning,
    uptime: Uptime,
    stats: FrameworkStats,
    buttons: Vec<Button>,
    commands: VecDeque<String>,
    diagnose_asap: Option<u16>,
    phase: Phase,
    uses_dual_core: bool,
    has_secondary_work: bool,
    secondary_taken: bool,
    configured: bool,
    loop_start_us: u32,
    watchdog_fed_at: u32,
}

impl Framework {
    pub fn new(config: FrameworkConfig, clock: SharedClock, collab: Collaborators) -> Self {
        let registry = ModuleRegistry::new(config.max_modules);
        let dispatcher = Dispatcher::new(config.max_loop_time_us);
        let power = PowerLossHandler::new();
        let startup = StartupDelay::new(config.startup_delay_ms);
        let heartbeat = config.heartbeat_interval_ms.map(Heartbeat::new);
        let loop_warning = LoopTimeWarning::new(
            config.loop_time_warning_ms,
            config.loop_time_warning_interval_ms,
        );

        Self {
            config,
            clock,
            collab,
            registry,
            dispatcher,
            power,
            sync: Arc::new(CoreSync::new()),
            fatal: FatalSignal::new(),
            startup,
            heartbeat,
            loop_warning,
            uptime: Uptime::new(),
            stats: FrameworkStats::default(),
            buttons: Vec::new(),
            commands: VecDeque::new(),
            diagnose_asap: None,
            phase: Phase::Unconfigured,
            uses_dual_core: false,
            has_secondary_work: false,
            secondary_taken: false,
            configured: false,
            loop_start_us: 0,
            watchdog_fed_at: 0,
        }
    }

    /// Route input events on group object `asap` to the console.
    pub fn with_diagnose_object(mut self, asap: u16) -> Self {
        self.diagnose_asap = Some(asap);
        self
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Register a module.  Only possible before [`init`](Self::init).
    pub fn register(&mut self, module: Box<dyn Module>) -> Result<ModuleId, RegistryError> {
        let id = self.registry.add(module).inspect_err(|e| {
            warn!(error = %e, "module registration refused");
        })?;
        if self.registry.has_secondary() {
            self.has_secondary_work = true;
        }
        Ok(id)
    }

    /// Build the secondary context from the secondary halves of all
    /// registered modules.  Available once, after [`init`](Self::init) has
    /// closed registration; `None` before that and on later calls.
    pub fn secondary_context(&mut self) -> Option<SecondaryContext> {
        if !self.registry.is_sealed() {
            warn!("secondary context requested while registration is open");
            return None;
        }
        if self.secondary_taken {
            return None;
        }
        self.secondary_taken = true;
        let entries = self.registry.take_secondary();
        Some(SecondaryContext::new(
            Arc::clone(&self.sync),
            entries,
            Arc::clone(&self.clock),
            &self.config,
        ))
    }

    // ── Boot ──────────────────────────────────────────────────────────────────

    /// Seal the registry and run every module's `init` in order.
    pub fn init(&mut self) {
        if self.phase != Phase::Unconfigured {
            debug!(phase = ?self.phase, "init called twice");
            return;
        }

        self.collab.each_led(|led| led.pulsing(DEFAULT_PULSE_MS));
        self.registry.seal();
        self.uses_dual_core = self.config.dual_core && self.has_secondary_work;
        self.sync.set_dual_core(self.uses_dual_core);

        info!(
            modules = self.registry.len(),
            dual_core = self.uses_dual_core,
            "init modules"
        );
        for module in self.registry.iter_mut() {
            module.init();
        }

        self.startup.start(self.clock.millis());
        self.phase = Phase::InitDone;
    }

    /// Run every module's primary setup, start the stack and, with a
    /// secondary context in use, wait for it to finish its own setup.
    ///
    /// Blocks until the secondary context is ready; with dual core enabled a
    /// secondary context must be running on another thread.
    pub fn setup(&mut self) {
        if self.phase == Phase::Unconfigured {
            self.init();
        }
        if self.phase != Phase::InitDone {
            debug!(phase = ?self.phase, "setup called twice");
            return;
        }

        let configured = self.collab.stack.is_configured();
        self.configured = configured;
        self.sync.set_configured(configured);

        info!(configured, "setup modules");
        for module in self.registry.iter_mut() {
            module.setup(configured);
        }

        if configured {
            self.collab.storage.load();
        }

        self.collab.prog_led.off();
        self.collab.stack.start();
        // Re-enable after a restart during power loss
        self.collab.hardware.activate_power_rail();

        if let Some(period) = self.config.watchdog_period_ms {
            info!(period_ms = period, "watchdog enabled");
            self.collab.hardware.enable_watchdog(period);
            self.watchdog_fed_at = self.clock.millis();
        }

        self.phase = Phase::SetupPrimaryDone;
        self.sync.primary_ready.raise();

        if self.uses_dual_core {
            debug!("waiting for secondary setup");
            self.sync.secondary_ready.wait(
                Duration::from_millis(self.config.primary_poll_ms),
                None,
            );
            self.phase = Phase::SetupSecondaryDone;
        }

        for led in &mut self.collab.info_leds {
            led.off();
        }

        self.phase = Phase::Running;
        info!(
            address = %format!("{:#06x}", self.collab.stack.individual_address()),
            "setup complete"
        );
    }

    // ── Tick ──────────────────────────────────────────────────────────────────

    /// One iteration of the primary loop.
    pub fn tick(&mut self) {
        if matches!(self.phase, Phase::Terminal(_)) {
            return;
        }

        self.loop_warning.begin_tick();
        let tick_start_ms = self.clock.millis();
        self.uptime.update(tick_start_ms);

        if !self.sync.primary_ready.is_raised() {
            return;
        }
        if self.uses_dual_core && !self.sync.secondary_ready.is_raised() {
            return;
        }

        self.stats.tick.begin(self.clock.micros());

        if self.config.led_heartbeat {
            self.collab.prog_led.heartbeat();
        }

        self.stats.console.begin(self.clock.micros());
        if let Some(command) = self.commands.pop_front() {
            self.process_command(&command, false);
        }
        self.stats.console.end(self.clock.micros());
        // `restart` / `fatal` from the console
        if matches!(self.phase, Phase::Terminal(_)) {
            return;
        }

        self.stats.stack.begin(self.clock.micros());
        self.collab.stack.poll();
        self.stats.stack.end(self.clock.micros());

        self.loop_start_us = self.clock.micros();
        self.configured = self.collab.stack.is_configured();
        self.sync.set_configured(self.configured);

        if self.configured {
            self.process_heartbeat();
            self.process_power_loss();
            if matches!(self.phase, Phase::Terminal(_)) {
                return;
            }
            self.process_after_startup_delay();
        }

        self.stats.modules.begin(self.clock.micros());
        self.dispatcher.run_pass(
            &mut self.registry,
            self.clock.as_ref(),
            self.loop_start_us,
            self.configured,
        );
        self.stats.modules.end(self.clock.micros());

        self.feed_watchdog();

        self.stats.tick.end(self.clock.micros());

        let now_ms = self.clock.millis();
        if let Some(duration_ms) = self.loop_warning.check(tick_start_ms, now_ms) {
            error!(
                duration_ms,
                threshold_ms = ?self.config.loop_time_warning_ms,
                "loop took longer than usual"
            );
        }

        if let Some(request) = self.fatal.take() {
            self.fatal_error(request.code, &request.message);
            return;
        }

        for button in &mut self.buttons {
            button.poll(now_ms);
        }
    }

    fn process_heartbeat(&mut self) {
        let now = self.clock.millis();
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            if heartbeat.poll(now) {
                debug!(beats = heartbeat.beats(), "heartbeat");
                self.collab.stack.send_heartbeat();
            }
        }
    }

    fn process_power_loss(&mut self) {
        let step = self
            .power
            .process(&mut self.registry, &mut self.collab, self.clock.as_ref());
        if step.suppresses_loop_warning() {
            self.loop_warning.skip();
        }
        if let PowerStep::RebootRequired { module } = step {
            info!(module = %module, "restart after power loss");
            self.restart();
        }
    }

    fn process_after_startup_delay(&mut self) {
        if !self.startup.poll(self.clock.millis()) {
            return;
        }
        info!("process after startup delay");
        for module in self.registry.iter_mut() {
            module.process_after_startup_delay();
        }
    }

    fn feed_watchdog(&mut self) {
        let Some(period) = self.config.watchdog_period_ms else {
            return;
        };
        let now = self.clock.millis();
        if delay_check(self.watchdog_fed_at, period / 10, now) {
            self.collab.hardware.feed_watchdog();
            self.watchdog_fed_at = now;
        }
    }

    // ── Escalation ────────────────────────────────────────────────────────────

    /// Enter the irrecoverable error state.  Later ticks do nothing.
    pub fn fatal_error(&mut self, code: FatalCode, message: &str) {
        error!(%code, message, "fatal error");
        self.collab.prog_led.error_code(code.code());
        self.collab.hardware.fatal_error(code, message);
        self.phase = Phase::Terminal(TerminalReason::Fatal(code));
    }

    /// Restart the device through the protocol stack.
    pub fn restart(&mut self) {
        info!("restart");
        self.collab.stack.restart();
        self.phase = Phase::Terminal(TerminalReason::Restart);
    }

    /// Suppress the loop-time warning for the current tick.
    pub fn skip_loop_time_warning(&mut self) {
        self.loop_warning.skip();
    }

    pub fn is_loop_time_warning_skipped(&self) -> bool {
        self.loop_warning.is_skipped()
    }

    // ── Event fan-out ─────────────────────────────────────────────────────────

    pub fn process_before_restart(&mut self) {
        info!("process before restart");
        for module in self.registry.iter_mut() {
            module.process_before_restart();
        }
        self.collab.storage.save();
    }

    pub fn process_before_tables_unload(&mut self) {
        info!("process before tables unload");
        for module in self.registry.iter_mut() {
            module.process_before_tables_unload();
        }
        self.collab.storage.save();
    }

    /// Forward a group object update to every module, or to the console when
    /// it arrives on the diagnostic object.
    pub fn process_input_event(&mut self, event: &InputEvent) {
        if self.diagnose_asap == Some(event.asap) {
            self.process_diagnose_event(event);
            return;
        }
        for module in self.registry.iter_mut() {
            module.process_input_event(event);
        }
    }

    fn process_diagnose_event(&mut self, event: &InputEvent) {
        let raw = &event.value[..event.value.len().min(DIAGNOSE_COMMAND_LEN)];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let command = String::from_utf8_lossy(&raw[..end]).into_owned();
        if command.is_empty() {
            return;
        }

        info!(command = %command, "diagnose command received");
        if !self.process_command(&command, true).handled {
            info!(command = %command, "diagnose command not found");
        }
    }

    /// First module answering the function property command wins.
    pub fn process_function_property(
        &mut self,
        object_index: u8,
        property_id: u8,
        data: &[u8],
    ) -> Option<Vec<u8>> {
        self.registry
            .iter_mut()
            .find_map(|m| m.process_function_property(object_index, property_id, data))
    }

    pub fn process_function_property_state(
        &mut self,
        object_index: u8,
        property_id: u8,
        data: &[u8],
    ) -> Option<Vec<u8>> {
        self.registry
            .iter_mut()
            .find_map(|m| m.process_function_property_state(object_index, property_id, data))
    }

    // ── Console and buttons ───────────────────────────────────────────────────

    /// Queue a console line; the tick processes one per iteration.
    pub fn queue_command(&mut self, command: impl Into<String>) {
        self.commands.push_back(command.into());
    }

    /// Returns the button's index for [`button_event`](Self::button_event).
    pub fn add_button(&mut self, button: Button) -> usize {
        self.buttons.push(button);
        self.buttons.len() - 1
    }

    /// Feed a button edge.  Unknown indices are ignored.
    pub fn button_event(&mut self, index: usize, pressed: bool) {
        let now = self.clock.millis();
        if let Some(button) = self.buttons.get_mut(index) {
            button.change(pressed, now);
        } else {
            warn!(index, "edge for unknown button");
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    /// Current phase, including the power-loss sub-states while running.
    pub fn phase(&self) -> Phase {
        match self.phase {
            Phase::Running => match self.power.state() {
                PowerState::Triggered | PowerState::Saving => Phase::PowerLossTriggered,
                PowerState::Saved => Phase::PowerLossSaved,
                PowerState::RestorePending => Phase::Restoring,
                PowerState::RebootPending => Phase::RebootPending,
                PowerState::Idle | PowerState::Restored => Phase::Running,
            },
            other => other,
        }
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn dispatch_cursor(&self) -> DispatchCursor {
        self.dispatcher.cursor()
    }

    /// `true` while the dispatcher budget of the current tick is not used up.
    pub fn free_loop_time(&self) -> bool {
        self.dispatcher
            .free_loop_time(self.clock.as_ref(), self.loop_start_us)
    }

    /// Handle modules use to request a fatal escalation.
    pub fn fatal_signal(&self) -> FatalSignal {
        self.fatal.clone()
    }

    /// Handle to signal a power loss (interrupt handler, button).
    pub fn power_loss_trigger(&self) -> PowerLossTrigger {
        self.power.trigger()
    }

    pub fn core_sync(&self) -> Arc<CoreSync> {
        Arc::clone(&self.sync)
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn uses_dual_core(&self) -> bool {
        self.uses_dual_core
    }

    pub fn after_startup_delay(&self) -> bool {
        self.startup.is_elapsed()
    }

    pub fn uptime(&self) -> &Uptime {
        &self.uptime
    }

    pub(crate) fn modules_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Module>> {
        self.registry.iter_mut()
    }

    pub(crate) fn collaborators_mut(&mut self) -> &mut Collaborators {
        &mut self.collab
    }

    pub(crate) fn individual_address(&self) -> u16 {
        self.collab.stack.individual_address()
    }

    // ── Runtime statistics ────────────────────────────────────────────────────

    /// Header plus one line per framework phase and per module and context.
    pub fn runtime_stat_lines(&self, stat: bool, hist: bool) -> Vec<String> {
        let mut lines = vec![
            format!("Runtime statistics (uptime {} ms)", self.clock.millis()),
            RuntimeStat::header(stat, hist),
            self.stats.tick.show("Loop", 0, stat, hist),
            self.stats.console.show("Console", 0, stat, hist),
            self.stats.stack.show("KnxStack", 0, stat, hist),
            self.stats.modules.show("AllModulesLoop", 0, stat, hist),
        ];

        let secondary = self.sync.secondary_stats();

        for index in 0..self.registry.len() {
            let name = self.registry.name(index);
            if let Some(runtime) = self.registry.runtime(index) {
                lines.push(runtime.show(name, 0, stat, hist));
            }
            for entry in secondary.iter().filter(|e| e.module == index) {
                lines.push(entry.stat.show(&entry.name, 1, stat, hist));
            }
        }
        lines
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::power::RESTORE_DEBOUNCE_MS;
    use crate::sim::{self, Hook, Journal, LedState, RecordingModule, SimEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn framework(config: FrameworkConfig, configured: bool) -> (Framework, Arc<MockClock>, Journal) {
        let journal = Journal::new();
        let clock = Arc::new(MockClock::starting_at(1_000, 1_000_000));
        let fw = Framework::new(
            config,
            clock.clone(),
            sim::collaborators(&journal, configured),
        );
        (fw, clock, journal)
    }

    fn module_hooks(journal: &Journal, name: &str) -> Vec<Hook> {
        journal
            .events()
            .into_iter()
            .filter_map(|e| match e {
                SimEvent::Module { name: n, hook } if n == name => Some(hook),
                _ => None,
            })
            .collect()
    }

    fn count(journal: &Journal, wanted: &SimEvent) -> usize {
        journal.events().iter().filter(|e| *e == wanted).count()
    }

    /// Module that raises a fatal request from its periodic work.
    struct Faulty(FatalSignal);
    impl Module for Faulty {
        fn name(&self) -> &str {
            "Faulty"
        }
        fn run(&mut self, _configured: bool) {
            self.0.raise(FatalCode::SensorUnknown, "sensor vanished");
        }
    }

    /// Answers function property 7 only.
    struct Responder(u8);
    impl Module for Responder {
        fn process_function_property(&mut self, _o: u8, p: u8, _d: &[u8]) -> Option<Vec<u8>> {
            (p == 7).then(|| vec![self.0])
        }
    }

    // ── Boot ──────────────────────────────────────────────────────────────────

    #[test]
    fn init_runs_all_hooks_before_any_setup() {
        let (mut fw, _, journal) = framework(FrameworkConfig::default(), true);
        fw.register(Box::new(RecordingModule::new("A", &journal))).unwrap();
        fw.register(Box::new(RecordingModule::new("B", &journal))).unwrap();
        assert_eq!(fw.phase(), Phase::Unconfigured);

        fw.init();
        assert_eq!(fw.phase(), Phase::InitDone);
        fw.setup();
        assert_eq!(fw.phase(), Phase::Running);

        let a_init = journal.position(&SimEvent::module("A", Hook::Init)).unwrap();
        let b_init = journal.position(&SimEvent::module("B", Hook::Init)).unwrap();
        let a_setup = journal.position(&SimEvent::module("A", Hook::Setup(true))).unwrap();
        let b_setup = journal.position(&SimEvent::module("B", Hook::Setup(true))).unwrap();
        assert!(a_init < b_init && b_init < a_setup && a_setup < b_setup);
    }

    #[test]
    fn setup_sequence_when_configured() {
        let (mut fw, _, journal) = framework(FrameworkConfig::default(), true);
        fw.register(Box::new(RecordingModule::new("A", &journal))).unwrap();
        fw.setup();

        let pos = |e: SimEvent| journal.position(&e).unwrap();
        let setup = pos(SimEvent::module("A", Hook::Setup(true)));
        let load = pos(SimEvent::StorageLoaded);
        let started = pos(SimEvent::StackStarted);
        let rail = pos(SimEvent::PowerRailOn);
        let info_off = pos(SimEvent::led("info", LedState::Off));
        assert!(setup < load && load < started && started < rail && rail < info_off);
        assert!(fw.is_configured());
    }

    #[test]
    fn unconfigured_setup_skips_storage_load() {
        let (mut fw, _, journal) = framework(FrameworkConfig::default(), false);
        fw.register(Box::new(RecordingModule::new("A", &journal))).unwrap();
        fw.setup();

        assert!(journal.contains(&SimEvent::module("A", Hook::Setup(false))));
        assert!(!journal.contains(&SimEvent::StorageLoaded));
    }

    #[test]
    fn registration_closes_at_init() {
        let (mut fw, _, journal) = framework(FrameworkConfig::default(), true);
        fw.init();
        let err = fw
            .register(Box::new(RecordingModule::new("Late", &journal)))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Sealed { .. }));
    }

    #[test]
    fn registry_capacity_follows_config() {
        let config = FrameworkConfig {
            max_modules: 2,
            ..FrameworkConfig::default()
        };
        let (mut fw, _, journal) = framework(config, true);
        fw.register(Box::new(RecordingModule::new("A", &journal))).unwrap();
        fw.register(Box::new(RecordingModule::new("B", &journal))).unwrap();
        assert!(matches!(
            fw.register(Box::new(RecordingModule::new("C", &journal))),
            Err(RegistryError::Full { capacity: 2, .. })
        ));
    }

    #[test]
    fn tick_before_setup_runs_nothing() {
        let (mut fw, _, journal) = framework(FrameworkConfig::default(), true);
        let m = RecordingModule::new("A", &journal);
        let runs = m.run_counter();
        fw.register(Box::new(m)).unwrap();
        fw.init();

        fw.tick();
        assert_eq!(runs.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn watchdog_enabled_at_setup() {
        let config = FrameworkConfig {
            watchdog_period_ms: Some(16_000),
            ..FrameworkConfig::default()
        };
        let (mut fw, _, journal) = framework(config, true);
        fw.setup();
        assert!(journal.contains(&SimEvent::WatchdogEnabled(16_000)));
    }

    // ── Tick ──────────────────────────────────────────────────────────────────

    #[test]
    fn tick_dispatches_modules() {
        let (mut fw, _, journal) = framework(FrameworkConfig::default(), true);
        let a = RecordingModule::new("A", &journal);
        let b = RecordingModule::new("B", &journal);
        let (ra, rb) = (a.run_counter(), b.run_counter());
        fw.register(Box::new(a)).unwrap();
        fw.register(Box::new(b)).unwrap();
        fw.setup();

        for _ in 0..3 {
            fw.tick();
        }
        assert_eq!(ra.load(Ordering::Relaxed), 3);
        assert_eq!(rb.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn budget_spreads_a_pass_over_ticks() {
        let (mut fw, clock, journal) = framework(FrameworkConfig::default(), true);
        let mut counters = Vec::new();
        for name in ["A", "B", "C", "D", "E"] {
            let m = RecordingModule::new(name, &journal).costing(&clock, 1_500);
            counters.push(m.run_counter());
            fw.register(Box::new(m)).unwrap();
        }
        fw.setup();

        fw.tick();
        let first: Vec<u64> = counters.iter().map(|c| c.load(Ordering::Relaxed)).collect();
        assert_eq!(first, vec![1, 1, 1, 0, 0]);
        assert_eq!(fw.dispatch_cursor().position, 3);

        fw.tick();
        let second: Vec<u64> = counters.iter().map(|c| c.load(Ordering::Relaxed)).collect();
        assert_eq!(second, vec![1, 1, 1, 1, 1]);
        assert_eq!(fw.dispatch_cursor(), DispatchCursor::default());
    }

    #[test]
    fn unconfigured_device_only_dispatches() {
        let config = FrameworkConfig {
            heartbeat_interval_ms: Some(1_000),
            ..FrameworkConfig::default()
        };
        let (mut fw, _, journal) = framework(config, false);
        let m = RecordingModule::new("A", &journal);
        let runs = m.run_counter();
        fw.register(Box::new(m)).unwrap();
        fw.setup();
        fw.power_loss_trigger().trigger();

        fw.tick();
        assert_eq!(runs.load(Ordering::Relaxed), 1);
        assert!(!journal.contains(&SimEvent::HeartbeatSent));
        assert!(!journal.contains(&SimEvent::module("A", Hook::SavePower)));
        assert!(!journal.contains(&SimEvent::module("A", Hook::AfterStartupDelay)));
        assert!(!fw.after_startup_delay());
    }

    #[test]
    fn after_startup_delay_fires_once() {
        let config = FrameworkConfig {
            startup_delay_ms: Some(5_000),
            ..FrameworkConfig::default()
        };
        let (mut fw, clock, journal) = framework(config, true);
        fw.register(Box::new(RecordingModule::new("A", &journal))).unwrap();
        fw.register(Box::new(RecordingModule::new("B", &journal))).unwrap();
        fw.setup();

        fw.tick();
        clock.advance_ms(4_999);
        fw.tick();
        assert!(!fw.after_startup_delay());

        clock.advance_ms(1);
        fw.tick();
        assert!(fw.after_startup_delay());
        for _ in 0..3 {
            clock.advance_ms(1_000);
            fw.tick();
        }

        assert_eq!(count(&journal, &SimEvent::module("A", Hook::AfterStartupDelay)), 1);
        assert_eq!(count(&journal, &SimEvent::module("B", Hook::AfterStartupDelay)), 1);
        let a = journal.position(&SimEvent::module("A", Hook::AfterStartupDelay)).unwrap();
        let b = journal.position(&SimEvent::module("B", Hook::AfterStartupDelay)).unwrap();
        assert!(a < b);
    }

    #[test]
    fn heartbeat_first_beat_then_periodic() {
        let config = FrameworkConfig {
            heartbeat_interval_ms: Some(60_000),
            startup_delay_ms: Some(10_000),
            ..FrameworkConfig::default()
        };
        let (mut fw, clock, journal) = framework(config, true);
        fw.setup();

        fw.tick();
        assert_eq!(count(&journal, &SimEvent::HeartbeatSent), 1);
        clock.advance_ms(59_999);
        fw.tick();
        assert_eq!(count(&journal, &SimEvent::HeartbeatSent), 1);
        clock.advance_ms(1);
        fw.tick();
        assert_eq!(count(&journal, &SimEvent::HeartbeatSent), 2);
    }

    #[test]
    fn watchdog_fed_every_tenth_period() {
        let config = FrameworkConfig {
            watchdog_period_ms: Some(1_000),
            ..FrameworkConfig::default()
        };
        let (mut fw, clock, journal) = framework(config, true);
        fw.setup();
        for _ in 0..50 {
            clock.advance_ms(10);
            fw.tick();
        }
        // 500 ms at one feed per 100 ms
        assert_eq!(count(&journal, &SimEvent::WatchdogFed), 5);
    }

    // ── Power loss ────────────────────────────────────────────────────────────

    #[test]
    fn power_loss_phases() {
        let (mut fw, clock, journal) = framework(FrameworkConfig::default(), true);
        fw.register(Box::new(RecordingModule::new("A", &journal))).unwrap();
        fw.setup();
        fw.tick();

        let trigger = fw.power_loss_trigger();
        trigger.trigger();
        assert_eq!(fw.phase(), Phase::PowerLossTriggered);

        fw.tick();
        assert_eq!(fw.phase(), Phase::PowerLossSaved);
        assert!(fw.is_loop_time_warning_skipped());

        trigger.trigger();
        clock.advance_ms(500);
        fw.tick();
        assert_eq!(fw.phase(), Phase::PowerLossSaved);
        assert_eq!(count(&journal, &SimEvent::module("A", Hook::SavePower)), 1);

        clock.advance_ms(RESTORE_DEBOUNCE_MS);
        fw.tick();
        assert_eq!(fw.phase(), Phase::Running);
        assert_eq!(count(&journal, &SimEvent::module("A", Hook::RestorePower)), 1);
    }

    #[test]
    fn restore_never_follows_save_in_the_same_millisecond() {
        let (mut fw, clock, journal) = framework(FrameworkConfig::default(), true);
        fw.register(Box::new(RecordingModule::new("A", &journal))).unwrap();
        fw.setup();

        fw.power_loss_trigger().trigger();
        fw.tick();
        fw.tick();
        assert_eq!(fw.phase(), Phase::PowerLossSaved);

        clock.advance_ms(RESTORE_DEBOUNCE_MS - 1);
        fw.tick();
        assert_eq!(count(&journal, &SimEvent::module("A", Hook::RestorePower)), 0);

        clock.advance_ms(1);
        fw.tick();
        assert_eq!(count(&journal, &SimEvent::module("A", Hook::RestorePower)), 1);
    }

    #[test]
    fn restore_refusal_restarts_device() {
        let (mut fw, clock, journal) = framework(FrameworkConfig::default(), true);
        let a = RecordingModule::new("A", &journal);
        let runs = a.run_counter();
        fw.register(Box::new(a)).unwrap();
        fw.register(Box::new(RecordingModule::new("B", &journal).refuse_restore()))
            .unwrap();
        fw.register(Box::new(RecordingModule::new("C", &journal))).unwrap();
        fw.setup();

        fw.power_loss_trigger().trigger();
        fw.tick();
        clock.advance_ms(RESTORE_DEBOUNCE_MS);
        fw.tick();

        assert_eq!(fw.phase(), Phase::Terminal(TerminalReason::Restart));
        assert!(journal.contains(&SimEvent::StackRestarted));
        assert!(!module_hooks(&journal, "C").contains(&Hook::RestorePower));

        let before = runs.load(Ordering::Relaxed);
        fw.tick();
        assert_eq!(runs.load(Ordering::Relaxed), before);
    }

    // ── Escalation ────────────────────────────────────────────────────────────

    #[test]
    fn fatal_signal_escalates_at_end_of_tick() {
        let (mut fw, _, journal) = framework(FrameworkConfig::default(), true);
        let signal = fw.fatal_signal();
        fw.register(Box::new(Faulty(signal))).unwrap();
        fw.setup();

        fw.tick();
        assert_eq!(
            fw.phase(),
            Phase::Terminal(TerminalReason::Fatal(FatalCode::SensorUnknown))
        );
        assert!(journal.contains(&SimEvent::Fatal(5)));
        assert!(journal.contains(&SimEvent::led("prog", LedState::ErrorCode(5))));

        let events = journal.events().len();
        fw.tick();
        assert_eq!(journal.events().len(), events);
    }

    #[test]
    fn loop_warning_skip_is_cleared_each_tick() {
        let (mut fw, _, _) = framework(FrameworkConfig::default(), true);
        fw.setup();
        fw.skip_loop_time_warning();
        assert!(fw.is_loop_time_warning_skipped());
        fw.tick();
        assert!(!fw.is_loop_time_warning_skipped());
    }

    // ── Fan-out ───────────────────────────────────────────────────────────────

    #[test]
    fn before_restart_and_tables_unload_save_afterwards() {
        let (mut fw, _, journal) = framework(FrameworkConfig::default(), true);
        fw.register(Box::new(RecordingModule::new("A", &journal))).unwrap();
        fw.register(Box::new(RecordingModule::new("B", &journal))).unwrap();
        fw.setup();
        journal.clear();

        fw.process_before_restart();
        assert_eq!(
            journal.events(),
            vec![
                SimEvent::module("A", Hook::BeforeRestart),
                SimEvent::module("B", Hook::BeforeRestart),
                SimEvent::StorageSaved,
            ]
        );

        journal.clear();
        fw.process_before_tables_unload();
        assert_eq!(
            journal.events(),
            vec![
                SimEvent::module("A", Hook::BeforeTablesUnload),
                SimEvent::module("B", Hook::BeforeTablesUnload),
                SimEvent::StorageSaved,
            ]
        );
    }

    #[test]
    fn input_events_reach_every_module() {
        let (mut fw, _, journal) = framework(FrameworkConfig::default(), true);
        fw.register(Box::new(RecordingModule::new("A", &journal))).unwrap();
        fw.register(Box::new(RecordingModule::new("B", &journal))).unwrap();
        fw.setup();

        fw.process_input_event(&InputEvent::new(42, vec![1]));
        assert!(journal.contains(&SimEvent::module("A", Hook::InputEvent(42))));
        assert!(journal.contains(&SimEvent::module("B", Hook::InputEvent(42))));
    }

    #[test]
    fn diagnose_object_goes_to_console() {
        let (fw, _, journal) = framework(FrameworkConfig::default(), true);
        let mut fw = fw.with_diagnose_object(7);
        fw.register(Box::new(RecordingModule::new("A", &journal).handles_command("ping")))
            .unwrap();
        fw.setup();

        let mut value = b"ping".to_vec();
        value.resize(14, 0);
        fw.process_input_event(&InputEvent::new(7, value));

        assert!(journal.contains(&SimEvent::module("A", Hook::Command("ping".into()))));
        assert!(!journal.contains(&SimEvent::module("A", Hook::InputEvent(7))));
    }

    #[test]
    fn function_property_first_answer_wins() {
        let (mut fw, _, _) = framework(FrameworkConfig::default(), true);
        fw.register(Box::new(Responder(1))).unwrap();
        fw.register(Box::new(Responder(2))).unwrap();
        fw.setup();

        assert_eq!(fw.process_function_property(0, 7, &[]), Some(vec![1]));
        assert_eq!(fw.process_function_property(0, 8, &[]), None);
        assert_eq!(fw.process_function_property_state(0, 7, &[]), None);
    }

    #[test]
    fn button_long_click_triggers_power_loss() {
        let (mut fw, clock, _) = framework(FrameworkConfig::default(), true);
        fw.setup();
        let trigger = fw.power_loss_trigger();
        let clicks = Arc::new(AtomicUsize::new(0));
        let c = clicks.clone();
        let idx = fw.add_button(
            Button::new("prog")
                .on_short_click(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .on_long_click(move || trigger.trigger()),
        );

        fw.button_event(idx, true);
        clock.advance_ms(1_000);
        fw.tick();
        assert_eq!(fw.phase(), Phase::PowerLossTriggered);
        assert_eq!(clicks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn runtime_lines_cover_framework_and_modules() {
        let (mut fw, _, journal) = framework(FrameworkConfig::default(), true);
        fw.register(Box::new(RecordingModule::new("Logic", &journal))).unwrap();
        fw.setup();
        fw.tick();

        let lines = fw.runtime_stat_lines(true, false);
        for name in ["Loop", "Console", "KnxStack", "AllModulesLoop", "Logic"] {
            assert!(lines.iter().any(|l| l.starts_with(name)), "missing {name}");
        }
    }

    // ── Dual core ─────────────────────────────────────────────────────────────

    #[test]
    fn rendezvous_with_secondary_context() {
        let config = FrameworkConfig {
            dual_core: true,
            secondary_poll_ms: 20,
            ..FrameworkConfig::default()
        };
        let (mut fw, _, journal) = framework(config, true);
        let m = RecordingModule::new("Dual", &journal).with_secondary();
        let secondary_runs = m.secondary_run_counter().unwrap();
        fw.register(Box::new(m)).unwrap();
        fw.init();
        let mut secondary = fw.secondary_context().unwrap();
        let sync = fw.core_sync();

        let handle = thread::spawn(move || {
            secondary.setup();
            secondary.tick();
            secondary
        });

        // Secondary is parked until the primary is ready
        thread::sleep(Duration::from_millis(60));
        assert!(!sync.secondary_ready.is_raised());
        assert!(!journal.contains(&SimEvent::module("Dual", Hook::SetupSecondary(true))));

        let start = std::time::Instant::now();
        fw.setup();
        assert!(start.elapsed() < Duration::from_millis(20 + 500));
        assert_eq!(fw.phase(), Phase::Running);
        assert!(fw.uses_dual_core());

        let secondary = handle.join().unwrap();
        drop(secondary);
        assert!(journal.contains(&SimEvent::module("Dual", Hook::SetupSecondary(true))));
        assert_eq!(secondary_runs.load(Ordering::Relaxed), 1);

        let lines = fw.runtime_stat_lines(true, false);
        assert_eq!(lines.iter().filter(|l| l.starts_with("Dual")).count(), 2);
    }

    #[test]
    fn secondary_context_waits_for_closed_registration() {
        let config = FrameworkConfig {
            dual_core: true,
            ..FrameworkConfig::default()
        };
        let (mut fw, _, journal) = framework(config, true);
        fw.register(Box::new(RecordingModule::new("Early", &journal).with_secondary()))
            .unwrap();
        assert!(fw.secondary_context().is_none());

        fw.register(Box::new(RecordingModule::new("Late", &journal).with_secondary()))
            .unwrap();
        fw.init();
        let secondary = fw.secondary_context().unwrap();
        assert_eq!(secondary.len(), 2);
        assert!(fw.secondary_context().is_none());
    }

    #[test]
    fn secondary_without_dual_core_work_does_not_block() {
        let config = FrameworkConfig {
            dual_core: true,
            secondary_poll_ms: 5,
            ..FrameworkConfig::default()
        };
        let (mut fw, _, journal) = framework(config, true);
        fw.register(Box::new(RecordingModule::new("Single", &journal))).unwrap();
        fw.init();
        let mut secondary = fw.secondary_context().unwrap();
        let sync = fw.core_sync();

        let handle = thread::spawn(move || secondary.setup());
        fw.setup();
        handle.join().unwrap();

        assert!(!fw.uses_dual_core());
        assert!(sync.secondary_ready.is_raised());
        assert_eq!(fw.phase(), Phase::Running);
    }
}
