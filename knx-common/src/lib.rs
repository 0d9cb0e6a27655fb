/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! KNX common – cooperative module scheduler and lifecycle framework
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── clock        – millisecond / microsecond time source (+ mock)
//! ├── timer        – wraparound-safe delays, startup delay, heartbeat, uptime
//! ├── config/      – YAML framework configuration
//! ├── error        – registry errors, fatal codes, fatal signal
//! ├── module       – Module / SecondaryModule capability traits
//! ├── registry     – bounded module registry with per-module statistics
//! ├── stat         – runtime statistics and histogram
//! ├── dispatcher   – time-budgeted round-robin ("free loop")
//! ├── power        – power-loss save / restore state machine
//! ├── rendezvous   – boot-time flags between the two execution contexts
//! ├── hal          – collaborator traits (stack, storage, LEDs, hardware)
//! ├── lifecycle/   – Framework (primary tick) and SecondaryContext
//! ├── console      – diagnostic commands
//! ├── button       – debounced button with click callbacks
//! └── sim/         – simulated collaborators for host runs and tests
//! ```

pub mod button;
pub mod clock;
pub mod config;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod hal;
pub mod lifecycle;
pub mod module;
pub mod power;
pub mod registry;
pub mod rendezvous;
pub mod sim;
pub mod stat;
pub mod timer;
