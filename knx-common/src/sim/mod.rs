/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Simulated collaborators for host runs and tests.
//!
//! Every simulated part writes what the framework asked it to do into a
//! shared [`Journal`], so tests can assert on call order and the simulator
//! binary can print a trace.  Nothing here touches real hardware.
//!
//! | Type | Implements |
//! |---|---|
//! | [`SimStack`] | [`ProtocolStack`] |
//! | [`SimStorage`] | [`Storage`] |
//! | [`SimHardware`] | [`PowerHardware`] |
//! | [`SimLed`] | [`StatusLed`] |
//! | [`RecordingModule`] | [`Module`] (+ optional [`SecondaryModule`] half) |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::clock::MockClock;
use crate::error::FatalCode;
use crate::hal::{Collaborators, PowerHardware, ProtocolStack, StatusLed, Storage};
use crate::module::{HelpEntry, InputEvent, Module, SecondaryModule};

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    On,
    Off,
    Pulsing(u16),
    Blinking(u16),
    PowerSave(bool),
    ForceOn(bool),
    ErrorCode(u8),
}

/// Module hook observed by a [`RecordingModule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    Init,
    Setup(bool),
    SetupSecondary(bool),
    AfterStartupDelay,
    SavePower,
    RestorePower,
    BeforeRestart,
    BeforeTablesUnload,
    InputEvent(u16),
    Command(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    StackStarted,
    StackRestarted,
    HeartbeatSent,
    ProgModeToggled,
    StorageLoaded,
    StorageSaved,
    PowerRailOn,
    PowerRailOff,
    CommunicationStopped,
    CommunicationStarted,
    StopConfirmed,
    Fatal(u8),
    WatchdogEnabled(u32),
    WatchdogFed,
    Led { led: String, state: LedState },
    Module { name: String, hook: Hook },
}

impl SimEvent {
    pub fn led(led: &str, state: LedState) -> Self {
        SimEvent::Led {
            led: led.to_string(),
            state,
        }
    }

    pub fn module(name: &str, hook: Hook) -> Self {
        SimEvent::Module {
            name: name.to_string(),
            hook,
        }
    }
}

// ── Journal ───────────────────────────────────────────────────────────────────

/// Append-only event log shared by all simulated parts.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<SimEvent>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: SimEvent) {
        trace!(?event, "sim");
        if let Ok(mut events) = self.0.lock() {
            events.push(event);
        }
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<SimEvent> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &SimEvent) -> Option<usize> {
        self.0
            .lock()
            .ok()
            .and_then(|events| events.iter().position(|e| e == event))
    }

    pub fn contains(&self, event: &SimEvent) -> bool {
        self.position(event).is_some()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.0.lock() {
            events.clear();
        }
    }
}

// ── Collaborators ─────────────────────────────────────────────────────────────

pub struct SimStack {
    journal: Journal,
    configured: bool,
    address: u16,
    prog_mode: bool,
    polls: Arc<AtomicU64>,
}

impl SimStack {
    pub fn new(journal: &Journal, configured: bool) -> Self {
        Self {
            journal: journal.clone(),
            configured,
            address: 0xFFFF,
            prog_mode: false,
            polls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_address(mut self, address: u16) -> Self {
        self.address = address;
        self
    }

    /// Shared counter of `poll()` calls.
    pub fn poll_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.polls)
    }
}

impl ProtocolStack for SimStack {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn start(&mut self) {
        self.journal.push(SimEvent::StackStarted);
    }

    fn poll(&mut self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    fn restart(&mut self) {
        debug!("simulated restart");
        self.journal.push(SimEvent::StackRestarted);
    }

    fn toggle_prog_mode(&mut self) -> bool {
        self.prog_mode = !self.prog_mode;
        self.journal.push(SimEvent::ProgModeToggled);
        self.prog_mode
    }

    fn send_heartbeat(&mut self) {
        self.journal.push(SimEvent::HeartbeatSent);
    }

    fn individual_address(&self) -> u16 {
        self.address
    }
}

pub struct SimStorage {
    journal: Journal,
}

impl SimStorage {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
        }
    }
}

impl Storage for SimStorage {
    fn load(&mut self) {
        self.journal.push(SimEvent::StorageLoaded);
    }

    fn save(&mut self) {
        self.journal.push(SimEvent::StorageSaved);
    }
}

pub struct SimHardware {
    journal: Journal,
}

impl SimHardware {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
        }
    }
}

impl PowerHardware for SimHardware {
    fn activate_power_rail(&mut self) {
        self.journal.push(SimEvent::PowerRailOn);
    }

    fn deactivate_power_rail(&mut self) {
        self.journal.push(SimEvent::PowerRailOff);
    }

    fn stop_communication(&mut self) {
        self.journal.push(SimEvent::CommunicationStopped);
    }

    fn start_communication(&mut self) {
        self.journal.push(SimEvent::CommunicationStarted);
    }

    fn confirm_stop(&mut self) {
        self.journal.push(SimEvent::StopConfirmed);
    }

    fn fatal_error(&mut self, code: FatalCode, message: &str) {
        debug!(%code, message, "simulated fatal error");
        self.journal.push(SimEvent::Fatal(code.code()));
    }

    fn enable_watchdog(&mut self, period_ms: u32) {
        self.journal.push(SimEvent::WatchdogEnabled(period_ms));
    }

    fn feed_watchdog(&mut self) {
        self.journal.push(SimEvent::WatchdogFed);
    }
}

pub struct SimLed {
    name: String,
    journal: Journal,
}

impl SimLed {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
        }
    }

    fn set(&self, state: LedState) {
        self.journal.push(SimEvent::led(&self.name, state));
    }
}

impl StatusLed for SimLed {
    fn on(&mut self) {
        self.set(LedState::On);
    }

    fn off(&mut self) {
        self.set(LedState::Off);
    }

    fn pulsing(&mut self, period_ms: u16) {
        self.set(LedState::Pulsing(period_ms));
    }

    fn blinking(&mut self, period_ms: u16) {
        self.set(LedState::Blinking(period_ms));
    }

    fn power_save(&mut self, active: bool) {
        self.set(LedState::PowerSave(active));
    }

    fn force_on(&mut self, active: bool) {
        self.set(LedState::ForceOn(active));
    }

    fn error_code(&mut self, code: u8) {
        self.set(LedState::ErrorCode(code));
    }
}

/// Stack, storage, hardware, a `prog` LED and one `info` LED, all writing
/// into `journal`.
pub fn collaborators(journal: &Journal, configured: bool) -> Collaborators {
    Collaborators::new(
        Box::new(SimStack::new(journal, configured)),
        Box::new(SimStorage::new(journal)),
        Box::new(SimHardware::new(journal)),
        Box::new(SimLed::new("prog", journal)),
    )
    .with_info_led(Box::new(SimLed::new("info", journal)))
}

// ── RecordingModule ───────────────────────────────────────────────────────────

/// Module that journals every lifecycle hook.
///
/// Periodic work is only counted, optionally burning `cost_us` of mock time
/// per call.
pub struct RecordingModule {
    name: String,
    journal: Journal,
    refuse_restore: bool,
    command: Option<String>,
    cost: Option<(Arc<MockClock>, u32)>,
    runs: Arc<AtomicU64>,
    secondary: Option<RecordingSecondary>,
}

impl RecordingModule {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            refuse_restore: false,
            command: None,
            cost: None,
            runs: Arc::new(AtomicU64::new(0)),
            secondary: None,
        }
    }

    /// `restore_power` returns `false`.
    pub fn refuse_restore(mut self) -> Self {
        self.refuse_restore = true;
        self
    }

    /// Consume the console command `command`.
    pub fn handles_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }

    /// Advance `clock` by `cost_us` in every periodic call.
    pub fn costing(mut self, clock: &Arc<MockClock>, cost_us: u32) -> Self {
        self.cost = Some((Arc::clone(clock), cost_us));
        self
    }

    /// Bring a secondary-context half.
    pub fn with_secondary(mut self) -> Self {
        self.secondary = Some(RecordingSecondary {
            name: self.name.clone(),
            journal: self.journal.clone(),
            runs: Arc::new(AtomicU64::new(0)),
        });
        self
    }

    /// Shared counter of primary periodic calls.
    pub fn run_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.runs)
    }

    /// Shared counter of secondary periodic calls, if there is a half.
    pub fn secondary_run_counter(&self) -> Option<Arc<AtomicU64>> {
        self.secondary.as_ref().map(|s| Arc::clone(&s.runs))
    }

    fn record(&self, hook: Hook) {
        self.journal.push(SimEvent::module(&self.name, hook));
    }
}

impl Module for RecordingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<String> {
        Some("0.1".to_string())
    }

    fn init(&mut self) {
        self.record(Hook::Init);
    }

    fn setup(&mut self, configured: bool) {
        self.record(Hook::Setup(configured));
    }

    fn take_secondary(&mut self) -> Option<Box<dyn SecondaryModule>> {
        self.secondary
            .take()
            .map(|s| Box::new(s) as Box<dyn SecondaryModule>)
    }

    fn run(&mut self, _configured: bool) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if let Some((clock, cost_us)) = &self.cost {
            clock.advance_us(*cost_us);
        }
    }

    fn process_after_startup_delay(&mut self) {
        self.record(Hook::AfterStartupDelay);
    }

    fn save_power(&mut self) {
        self.record(Hook::SavePower);
    }

    fn restore_power(&mut self) -> bool {
        self.record(Hook::RestorePower);
        !self.refuse_restore
    }

    fn process_before_restart(&mut self) {
        self.record(Hook::BeforeRestart);
    }

    fn process_before_tables_unload(&mut self) {
        self.record(Hook::BeforeTablesUnload);
    }

    fn process_input_event(&mut self, event: &InputEvent) {
        self.record(Hook::InputEvent(event.asap));
    }

    fn process_command(&mut self, command: &str, _from_diagnose: bool) -> bool {
        if self.command.as_deref() == Some(command) {
            self.record(Hook::Command(command.to_string()));
            return true;
        }
        false
    }

    fn information(&self) -> Vec<String> {
        vec![format!("{}: {} periodic calls", self.name, self.runs.load(Ordering::Relaxed))]
    }

    fn help(&self) -> Vec<HelpEntry> {
        self.command
            .iter()
            .map(|c| HelpEntry::new(c.clone(), format!("handled by {}", self.name)))
            .collect()
    }
}

/// Secondary half of a [`RecordingModule`].
pub struct RecordingSecondary {
    name: String,
    journal: Journal,
    runs: Arc<AtomicU64>,
}

impl SecondaryModule for RecordingSecondary {
    fn setup(&mut self, configured: bool) {
        self.journal
            .push(SimEvent::module(&self.name, Hook::SetupSecondary(configured)));
    }

    fn run(&mut self, _configured: bool) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;

    #[test]
    fn journal_keeps_order() {
        let journal = Journal::new();
        journal.push(SimEvent::StorageLoaded);
        journal.push(SimEvent::StorageSaved);
        assert_eq!(journal.position(&SimEvent::StorageSaved), Some(1));
        assert!(!journal.contains(&SimEvent::PowerRailOn));
        journal.clear();
        assert!(journal.events().is_empty());
    }

    #[test]
    fn recording_module_refuses_restore_on_request() {
        let journal = Journal::new();
        let mut ok = RecordingModule::new("Ok", &journal);
        let mut no = RecordingModule::new("No", &journal).refuse_restore();
        assert!(ok.restore_power());
        assert!(!no.restore_power());
        assert_eq!(journal.events().len(), 2);
    }

    #[test]
    fn secondary_half_is_handed_out_once() {
        let journal = Journal::new();
        let mut m = RecordingModule::new("Dual", &journal).with_secondary();
        let counter = m.secondary_run_counter().unwrap();
        let mut half = m.take_secondary().unwrap();
        assert!(m.take_secondary().is_none());

        half.run(true);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn costing_advances_mock_time() {
        let journal = Journal::new();
        let clock = Arc::new(MockClock::new());
        let mut m = RecordingModule::new("Slow", &journal).costing(&clock, 250);
        m.run(true);
        m.run(true);
        assert_eq!(clock.micros(), 500);
        assert_eq!(m.run_counter().load(Ordering::Relaxed), 2);
    }

    #[test]
    fn led_states_are_journaled_by_name() {
        let journal = Journal::new();
        let mut led = SimLed::new("info", &journal);
        led.on();
        led.blinking(200);
        assert_eq!(
            journal.events(),
            vec![
                SimEvent::led("info", LedState::On),
                SimEvent::led("info", LedState::Blinking(200)),
            ]
        );
    }
}
