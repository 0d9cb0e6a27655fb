/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Error and escalation types of the framework.
//!
//! The core itself never returns errors from its control flow.  Two kinds of
//! failure exist:
//!
//! * [`RegistryError`]: a programming error during the registration phase,
//!   returned to the firmware author as a value.
//! * [`FatalCode`]: an irrecoverable hardware or system condition.  Raised
//!   through a [`FatalSignal`] and escalated by the framework at the end of
//!   the tick; the device then stays in its error signalling pattern.

use std::fmt;
use std::sync::{Arc, Mutex};

use thiserror::Error;

// ── Registration errors ───────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry already holds `capacity` modules.
    #[error("module registry full: cannot add '{module}' (capacity {capacity})")]
    Full { module: String, capacity: usize },

    /// Registration was attempted after scheduling started.
    #[error("module registry is sealed: cannot add '{module}' after setup")]
    Sealed { module: String },
}

// ── Fatal codes ───────────────────────────────────────────────────────────────

/// Escalation codes.  The numeric value is the number of blinks the status
/// LED shows in its error pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalCode {
    /// Persisted parameters are unusable.
    FlashParameters,
    /// I2C bus stayed busy during startup.
    I2cBusy,
    /// Application data carries more logic channels than supported.
    LogWrongChannelCount,
    /// Unknown or unsupported sensor.
    SensorUnknown,
    /// Too many callbacks registered in a scheduler.
    ScheduleMaxCallbacks,
    /// Filesystem could not be mounted.
    InitFilesystem,
    /// Generic system error (buffer overrun and the like).
    System,
    /// Module specific code.
    Other(u8),
}

impl FatalCode {
    pub fn code(self) -> u8 {
        match self {
            FatalCode::FlashParameters => 2,
            FatalCode::I2cBusy => 3,
            FatalCode::LogWrongChannelCount => 4,
            FatalCode::SensorUnknown => 5,
            FatalCode::ScheduleMaxCallbacks => 6,
            FatalCode::InitFilesystem => 10,
            FatalCode::System => 20,
            FatalCode::Other(c) => c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            2 => FatalCode::FlashParameters,
            3 => FatalCode::I2cBusy,
            4 => FatalCode::LogWrongChannelCount,
            5 => FatalCode::SensorUnknown,
            6 => FatalCode::ScheduleMaxCallbacks,
            10 => FatalCode::InitFilesystem,
            20 => FatalCode::System,
            other => FatalCode::Other(other),
        }
    }
}

impl fmt::Display for FatalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FatalCode::FlashParameters => "flash parameters",
            FatalCode::I2cBusy => "i2c busy",
            FatalCode::LogWrongChannelCount => "wrong channel count",
            FatalCode::SensorUnknown => "unknown sensor",
            FatalCode::ScheduleMaxCallbacks => "scheduler callbacks exhausted",
            FatalCode::InitFilesystem => "filesystem init",
            FatalCode::System => "system",
            FatalCode::Other(_) => "module",
        };
        write!(f, "{} ({})", label, self.code())
    }
}

/// A pending escalation: code plus a human readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalRequest {
    pub code: FatalCode,
    pub message: String,
}

// ── FatalSignal ───────────────────────────────────────────────────────────────

/// Cloneable handle through which modules request a fatal escalation.
///
/// Only the first request is kept; the framework drains it at the end of the
/// tick in which it was raised.
#[derive(Debug, Clone, Default)]
pub struct FatalSignal {
    pending: Arc<Mutex<Option<FatalRequest>>>,
}

impl FatalSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, code: FatalCode, message: impl Into<String>) {
        if let Ok(mut slot) = self.pending.lock() {
            if slot.is_none() {
                *slot = Some(FatalRequest {
                    code,
                    message: message.into(),
                });
            }
        }
    }

    pub fn take(&self) -> Option<FatalRequest> {
        self.pending.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn is_raised(&self) -> bool {
        self.pending.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
