/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Collaborators the framework drives but does not implement.
//!
//! ```text
//!                 ┌──────────────┐
//!   tick ───────► │  Framework   │──► ProtocolStack  (bus I/O, configured?, restart)
//!                 │              │──► Storage        (persist framework state)
//!                 │              │──► StatusLed      (prog + info LEDs)
//!                 └──────────────┘──► PowerHardware  (power rail, bus coupler, fatal)
//! ```
//!
//! All of them are handed to the framework in one [`Collaborators`] bundle at
//! construction; nothing is reached through global state.

use crate::error::FatalCode;

/// Default period of the pulsing LED pattern, in ms.
pub const DEFAULT_PULSE_MS: u16 = 1_000;

// ── ProtocolStack ─────────────────────────────────────────────────────────────

/// The bus protocol stack (property tables, group objects, flash formats).
pub trait ProtocolStack {
    /// `true` when a persisted configuration (application download) exists.
    fn is_configured(&self) -> bool;

    /// Start bus communication after setup.
    fn start(&mut self) {}

    /// Drive protocol I/O.  Called once per tick.
    fn poll(&mut self);

    /// Restart the device.  On hardware this does not return.
    fn restart(&mut self);

    /// Toggle programming mode and return the new state.
    fn toggle_prog_mode(&mut self) -> bool {
        false
    }

    /// Send the periodic heartbeat telegram.
    fn send_heartbeat(&mut self) {}

    /// Individual address from the persisted configuration.
    fn individual_address(&self) -> u16 {
        0
    }
}

// ── Storage ───────────────────────────────────────────────────────────────────

/// Persistent storage of framework and module state.
pub trait Storage {
    fn load(&mut self);
    fn save(&mut self);
}

// ── StatusLed ─────────────────────────────────────────────────────────────────

/// A status LED.  The framework only issues state changes at defined
/// transition points; pattern timing is the LED driver's business.
///
/// Priority, highest first: power save, error code, force on, normal states.
pub trait StatusLed {
    fn on(&mut self);
    fn off(&mut self);
    fn pulsing(&mut self, period_ms: u16);
    fn blinking(&mut self, period_ms: u16);

    /// Dark while the supply is failing.
    fn power_save(&mut self, active: bool);

    /// Programming-mode override.
    fn force_on(&mut self, active: bool);

    /// Fatal error pattern: `code` blinks with a long pause.
    fn error_code(&mut self, code: u8);

    /// Liveness pattern, called once per tick when enabled.
    fn heartbeat(&mut self) {}
}

// ── PowerHardware ─────────────────────────────────────────────────────────────

/// Power rail, bus coupler and fatal error handling of the board.
pub trait PowerHardware {
    /// Turn on the auxiliary rail (also after a false power-loss alarm).
    fn activate_power_rail(&mut self);

    /// Turn off the auxiliary rail to leave the remaining energy to storage.
    fn deactivate_power_rail(&mut self);

    /// Put the bus coupler into stop mode.
    fn stop_communication(&mut self);

    /// Leave stop mode.
    fn start_communication(&mut self);

    /// Wait for the coupler to acknowledge the stop request.
    fn confirm_stop(&mut self) {}

    /// Enter the irrecoverable error state.
    fn fatal_error(&mut self, code: FatalCode, message: &str);

    fn enable_watchdog(&mut self, _period_ms: u32) {}

    fn feed_watchdog(&mut self) {}
}

// ── Collaborators ─────────────────────────────────────────────────────────────

/// Everything the framework needs from the outside, owned in one place.
pub struct Collaborators {
    pub stack: Box<dyn ProtocolStack>,
    pub storage: Box<dyn Storage>,
    pub hardware: Box<dyn PowerHardware>,
    /// Programming LED; also carries the error and heartbeat patterns.
    pub prog_led: Box<dyn StatusLed>,
    /// Additional info LEDs of the primary context.
    pub info_leds: Vec<Box<dyn StatusLed>>,
}

impl Collaborators {
    pub fn new(
        stack: Box<dyn ProtocolStack>,
        storage: Box<dyn Storage>,
        hardware: Box<dyn PowerHardware>,
        prog_led: Box<dyn StatusLed>,
    ) -> Self {
        Self {
            stack,
            storage,
            hardware,
            prog_led,
            info_leds: Vec::new(),
        }
    }

    pub fn with_info_led(mut self, led: Box<dyn StatusLed>) -> Self {
        self.info_leds.push(led);
        self
    }

    /// Apply `f` to the programming LED and every info LED.
    pub fn each_led(&mut self, mut f: impl FnMut(&mut dyn StatusLed)) {
        f(self.prog_led.as_mut());
        for led in &mut self.info_leds {
            f(led.as_mut());
        }
    }
}
