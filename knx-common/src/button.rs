/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Debounced push button with short, double and long click callbacks.
//!
//! Edges are fed through [`Button::change`] (from an interrupt handler or a
//! GPIO poll); time-based events are resolved in [`Button::poll`], which the
//! framework calls once per tick.
//!
//! | Event | Condition |
//! |---|---|
//! | short | released after ≥ debounce, no second press within the double-click window |
//! | double | second release within the double-click window |
//! | long | held for ≥ long-click time (fires while still held) |
//!
//! Without a double-click callback a release fires the short click at once.

use std::fmt;

use tracing::debug;

use crate::timer::delay_check;

pub const DEBOUNCE_MS: u32 = 50;
pub const DOUBLE_CLICK_MS: u32 = 500;
pub const LONG_CLICK_MS: u32 = 1_000;

/// Click callback.  `None` on the button means "not set".
pub type ClickCallback = Box<dyn FnMut() + Send>;

pub struct Button {
    id: String,
    hold_since: Option<u32>,
    double_since: Option<u32>,
    on_short: Option<ClickCallback>,
    on_double: Option<ClickCallback>,
    on_long: Option<ClickCallback>,
}

impl fmt::Debug for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Button")
            .field("id", &self.id)
            .field("hold_since", &self.hold_since)
            .field("double_since", &self.double_since)
            .field("short", &self.on_short.is_some())
            .field("double", &self.on_double.is_some())
            .field("long", &self.on_long.is_some())
            .finish()
    }
}

impl Button {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hold_since: None,
            double_since: None,
            on_short: None,
            on_double: None,
            on_long: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn on_short_click(mut self, cb: impl FnMut() + Send + 'static) -> Self {
        self.on_short = Some(Box::new(cb));
        self
    }

    pub fn on_double_click(mut self, cb: impl FnMut() + Send + 'static) -> Self {
        self.on_double = Some(Box::new(cb));
        self
    }

    pub fn on_long_click(mut self, cb: impl FnMut() + Send + 'static) -> Self {
        self.on_long = Some(Box::new(cb));
        self
    }

    /// Feed an edge: `pressed = true` on press, `false` on release.
    pub fn change(&mut self, pressed: bool, now_ms: u32) {
        if pressed {
            if self.hold_since.is_none() {
                self.hold_since = Some(now_ms);
            }
            return;
        }

        // Release.  A long click already consumed the press.
        let Some(since) = self.hold_since.take() else {
            return;
        };
        if !delay_check(since, DEBOUNCE_MS, now_ms) {
            return;
        }

        if self.on_double.is_none() {
            self.fire_short();
        } else if self.double_since.take().is_some() {
            debug!(button = %self.id, "double click");
            if let Some(cb) = self.on_double.as_mut() {
                cb();
            }
        } else {
            self.double_since = Some(now_ms);
        }
    }

    /// Resolve pending short and long clicks.
    pub fn poll(&mut self, now_ms: u32) {
        if let Some(since) = self.double_since {
            if delay_check(since, DOUBLE_CLICK_MS, now_ms) {
                self.double_since = None;
                self.fire_short();
            }
        }

        if let Some(since) = self.hold_since {
            if delay_check(since, LONG_CLICK_MS, now_ms) {
                self.hold_since = None;
                debug!(button = %self.id, "long click");
                if let Some(cb) = self.on_long.as_mut() {
                    cb();
                }
            }
        }
    }

    fn fire_short(&mut self) {
        debug!(button = %self.id, "short click");
        if let Some(cb) = self.on_short.as_mut() {
            cb();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
