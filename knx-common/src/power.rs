/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Graceful power-loss handling.
//!
//! ```text
//!   Idle ──trigger()──► Triggered ──tick──► Saving ──► Saved
//!    ▲                                                   │ restore debounce
//!    │                                                   ▼
//!    └───────── Restored ◄────── all ok ────────── RestorePending
//!                                                        │ a module refused
//!                                                        ▼
//!                                                  RebootPending
//! ```
//!
//! The trigger is a [`PowerLossTrigger`] flag that may be set from any thread
//! (supply-monitor interrupt, console, button) at any time.  Everything else
//! runs inside the primary tick through [`PowerLossHandler::process`].
//!
//! Re-triggering while a save is pending or done has no effect: the save
//! sequence runs once per trigger cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::hal::Collaborators;
use crate::registry::ModuleRegistry;
use crate::timer::{delay_check, elapsed};

/// Fixed wait between the end of a save and the restore attempt, in ms.
pub const RESTORE_DEBOUNCE_MS: u32 = 1_000;

// ── PowerLossTrigger ──────────────────────────────────────────────────────────

/// Edge-triggered power-loss flag, safe to set from another thread.
#[derive(Debug, Clone, Default)]
pub struct PowerLossTrigger(Arc<AtomicBool>);

impl PowerLossTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Idle,
    Triggered,
    Saving,
    Saved,
    RestorePending,
    Restored,
    RebootPending,
}

/// Outcome of one [`PowerLossHandler::process`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerStep {
    /// No power loss pending.
    Idle,
    /// The save sequence ran in this tick.
    Saved { duration_ms: u32 },
    /// Saved earlier; the restore debounce has not expired yet.
    Waiting,
    /// Power and communication were restored; back to normal operation.
    Restored,
    /// `module` refused to resume; the device must restart.
    RebootRequired { module: String },
}

impl PowerStep {
    /// Whether this step did unbounded work and the loop-time warning of the
    /// current tick must be suppressed.
    pub fn suppresses_loop_warning(&self) -> bool {
        matches!(
            self,
            PowerStep::Saved { .. } | PowerStep::Restored | PowerStep::RebootRequired { .. }
        )
    }
}

// ── PowerLossHandler ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PowerLossHandler {
    trigger: PowerLossTrigger,
    state: PowerState,
    saved_at: Option<u32>,
    saves: u64,
}

impl Default for PowerLossHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerLossHandler {
    pub fn new() -> Self {
        Self {
            trigger: PowerLossTrigger::new(),
            state: PowerState::Idle,
            saved_at: None,
            saves: 0,
        }
    }

    /// Handle to set the trigger from elsewhere.
    pub fn trigger(&self) -> PowerLossTrigger {
        self.trigger.clone()
    }

    pub fn state(&self) -> PowerState {
        let settled = matches!(self.state, PowerState::Idle | PowerState::Restored);
        if settled && self.trigger.is_triggered() {
            PowerState::Triggered
        } else {
            self.state
        }
    }

    /// Number of save sequences executed since start.
    pub fn saves(&self) -> u64 {
        self.saves
    }

    /// Advance the state machine.  Call once per configured tick.
    pub fn process(
        &mut self,
        registry: &mut ModuleRegistry,
        collab: &mut Collaborators,
        clock: &dyn Clock,
    ) -> PowerStep {
        if !self.trigger.is_triggered() {
            self.state = PowerState::Idle;
            return PowerStep::Idle;
        }

        let Some(saved_at) = self.saved_at else {
            let duration_ms = self.save(registry, collab, clock);
            return PowerStep::Saved { duration_ms };
        };

        if !delay_check(saved_at, RESTORE_DEBOUNCE_MS, clock.millis()) {
            return PowerStep::Waiting;
        }

        self.restore(registry, collab)
    }

    fn save(
        &mut self,
        registry: &mut ModuleRegistry,
        collab: &mut Collaborators,
        clock: &dyn Clock,
    ) -> u32 {
        self.state = PowerState::Saving;
        let start = clock.millis();
        error!("power loss detected, saving state");

        collab.each_led(|led| led.power_save(true));
        collab.hardware.stop_communication();

        for module in registry.iter_mut() {
            module.save_power();
        }

        collab.hardware.deactivate_power_rail();
        let duration_ms = elapsed(start, clock.millis());
        info!(duration_ms, "modules saved");

        collab.storage.save();
        collab.hardware.confirm_stop();

        self.saved_at = Some(clock.millis());
        self.saves += 1;
        self.state = PowerState::Saved;
        duration_ms
    }

    fn restore(&mut self, registry: &mut ModuleRegistry, collab: &mut Collaborators) -> PowerStep {
        self.state = PowerState::RestorePending;
        info!(debounce_ms = RESTORE_DEBOUNCE_MS, "restoring power");

        collab.each_led(|led| led.power_save(false));
        collab.hardware.activate_power_rail();
        collab.hardware.start_communication();

        for module in registry.iter_mut() {
            if !module.restore_power() {
                let name = module.name().to_string();
                warn!(module = %name, "module cannot resume without a restart");
                self.state = PowerState::RebootPending;
                return PowerStep::RebootRequired { module: name };
            }
        }

        info!("power restored");
        self.trigger.reset();
        self.saved_at = None;
        self.state = PowerState::Restored;
        PowerStep::Restored
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
