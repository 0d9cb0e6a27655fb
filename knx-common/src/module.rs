/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The module capability set.
//!
//! A module is a feature unit of the firmware (logic engine, sensor driver,
//! actuator channel block, ...).  The framework only ever talks to it through
//! the [`Module`] trait; every hook has a no-op default so a module implements
//! exactly the capabilities it needs.
//!
//! ```text
//! register ─► init ─► setup(configured) ─► run(configured) … run(configured)
//!    │                                       ├─ process_after_startup_delay   (once)
//!    │                                       ├─ save_power / restore_power    (power loss)
//!    │                                       └─ process_before_restart        (restart)
//!    └─► take_secondary() ─► SecondaryModule::setup / run  (secondary context)
//! ```
//!
//! # Ownership model
//! Modules are boxed and **moved** into the [`ModuleRegistry`] at
//! registration; the registry owns them for the rest of the process.  Work
//! that runs on the secondary execution context lives in a separate
//! [`SecondaryModule`] value handed over once, so no module state is ever
//! shared between the two contexts.
//!
//! [`ModuleRegistry`]: crate::registry::ModuleRegistry

// ── Input events ──────────────────────────────────────────────────────────────

/// A value update on a communication object, delivered by the protocol stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    /// Object number (ASAP) of the updated communication object.
    pub asap: u16,
    /// Raw payload as received.
    pub value: Vec<u8>,
}

impl InputEvent {
    pub fn new(asap: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            asap,
            value: value.into(),
        }
    }
}

/// One line of the console help listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpEntry {
    pub command: String,
    pub description: String,
}

impl HelpEntry {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

// ── Module ────────────────────────────────────────────────────────────────────

/// Hooks the framework calls on a registered module.
///
/// All hooks run on the primary execution context and must not block; a hook
/// that stalls stalls the whole tick.
pub trait Module {
    /// Name used in logs and runtime statistics.
    fn name(&self) -> &str {
        "Unnamed"
    }

    /// Version string shown by the `versions` console command.
    fn version(&self) -> Option<String> {
        None
    }

    /// Called once for every module, in registration order, before any setup.
    fn init(&mut self) {}

    /// Called once after all modules are initialised.  `configured` is `true`
    /// only when the protocol stack holds a persisted configuration.
    fn setup(&mut self, _configured: bool) {}

    /// Hand over the part of this module that runs on the secondary
    /// execution context.  Called once at registration.
    fn take_secondary(&mut self) -> Option<Box<dyn SecondaryModule>> {
        None
    }

    /// Periodic work.  Called by the dispatcher at most once per pass.
    fn run(&mut self, _configured: bool) {}

    /// Called once when the startup delay has elapsed.
    fn process_after_startup_delay(&mut self) {}

    /// Supply power is about to vanish: stop outputs, prepare persistence.
    fn save_power(&mut self) {}

    /// Power came back without a reset.  Return `false` when the module cannot
    /// resume safely; the device then restarts.
    fn restore_power(&mut self) -> bool {
        true
    }

    /// The device is about to restart.
    fn process_before_restart(&mut self) {}

    /// The protocol stack is about to unload its tables (reprogramming).
    fn process_before_tables_unload(&mut self) {}

    /// A communication object received a value.
    fn process_input_event(&mut self, _event: &InputEvent) {}

    /// A console command that the framework itself did not handle.  Return
    /// `true` when this module consumed it.
    fn process_command(&mut self, _command: &str, _from_diagnose: bool) -> bool {
        false
    }

    /// Function property command.  The first module returning `Some` answers.
    fn process_function_property(
        &mut self,
        _object_index: u8,
        _property_id: u8,
        _data: &[u8],
    ) -> Option<Vec<u8>> {
        None
    }

    /// Function property state request.  The first module returning `Some`
    /// answers.
    fn process_function_property_state(
        &mut self,
        _object_index: u8,
        _property_id: u8,
        _data: &[u8],
    ) -> Option<Vec<u8>> {
        None
    }

    /// Lines for the `info` console command.
    fn information(&self) -> Vec<String> {
        Vec::new()
    }

    /// Entries for the `help` console command.
    fn help(&self) -> Vec<HelpEntry> {
        Vec::new()
    }
}

// ── SecondaryModule ───────────────────────────────────────────────────────────

/// The part of a module that runs on the secondary execution context.
pub trait SecondaryModule: Send {
    /// Setup on the secondary context, after the primary finished its setup.
    fn setup(&mut self, _configured: bool) {}

    /// Periodic work on the secondary context.  Called once per secondary tick.
    fn run(&mut self, _configured: bool) {}
}

// ── Tests ─────────────────────────────────────────────────────────────────────
