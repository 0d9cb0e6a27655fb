/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Diagnostic command surface.
//!
//! Commands arrive either from the serial console (queued on the framework and
//! executed inside the tick) or through the diagnostic group object.  The
//! latter is limited to the commands that make sense remotely; the rest are
//! interactive-only.
//!
//! | Command | Aliases | Interactive only |
//! |---|---|---|
//! | `help` | `h` | yes |
//! | `info` | `i` | yes |
//! | `versions` | `v` | yes |
//! | `uptime` | `u` | |
//! | `prog` | `p` | yes |
//! | `restart` | `r` | yes |
//! | `fatal` | | yes |
//! | `powerloss` | | yes |
//! | `save` | `s`, `w` | |
//! | `runtime` / `runtime hist` / `runtime full` | | yes |
//!
//! Anything else is offered to the modules in registration order.

use tracing::info;

use crate::error::FatalCode;
use crate::lifecycle::Framework;

// ── Command ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Info,
    Versions,
    Uptime,
    Prog,
    Restart,
    Fatal,
    PowerLoss,
    Save,
    Runtime { stat: bool, hist: bool },
}

impl Command {
    /// Parse a built-in command.  `None` for anything the framework does not
    /// handle itself.
    pub fn parse(text: &str) -> Option<Self> {
        let cmd = match text.trim() {
            "h" | "help" => Command::Help,
            "i" | "info" => Command::Info,
            "v" | "versions" => Command::Versions,
            "u" | "uptime" => Command::Uptime,
            "p" | "prog" => Command::Prog,
            "r" | "restart" => Command::Restart,
            "fatal" => Command::Fatal,
            "powerloss" => Command::PowerLoss,
            "s" | "w" | "save" => Command::Save,
            "runtime" => Command::Runtime {
                stat: true,
                hist: false,
            },
            "runtime hist" => Command::Runtime {
                stat: false,
                hist: true,
            },
            "runtime full" => Command::Runtime {
                stat: true,
                hist: true,
            },
            _ => return None,
        };
        Some(cmd)
    }

    /// Rejected when the command comes from the diagnostic group object.
    pub fn interactive_only(self) -> bool {
        !matches!(self, Command::Uptime | Command::Save)
    }
}

/// Result of one console command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleOutput {
    /// Some part of the system consumed the command.
    pub handled: bool,
    pub lines: Vec<String>,
}

impl ConsoleOutput {
    fn handled(lines: Vec<String>) -> Self {
        Self {
            handled: true,
            lines,
        }
    }
}

// ── Execution ─────────────────────────────────────────────────────────────────

impl Framework {
    /// Execute a console command.  Output lines are logged and returned.
    pub fn process_command(&mut self, text: &str, from_diagnose: bool) -> ConsoleOutput {
        let text = text.trim();
        self.skip_loop_time_warning();

        let output = match Command::parse(text) {
            Some(cmd) if !(from_diagnose && cmd.interactive_only()) => {
                ConsoleOutput::handled(self.execute(cmd))
            }
            _ => {
                let handled = self
                    .modules_mut()
                    .any(|m| m.process_command(text, from_diagnose));
                ConsoleOutput {
                    handled,
                    lines: Vec::new(),
                }
            }
        };

        for line in &output.lines {
            info!(target: "console", "{line}");
        }
        if !output.handled {
            info!(command = %text, from_diagnose, "unknown command");
        }
        output
    }

    fn execute(&mut self, cmd: Command) -> Vec<String> {
        match cmd {
            Command::Help => self.help_lines(),
            Command::Info => self.info_lines(),
            Command::Versions => self.version_lines(),
            Command::Uptime => vec![format!("Uptime: {}", self.uptime().format())],
            Command::Prog => {
                let collab = self.collaborators_mut();
                let active = collab.stack.toggle_prog_mode();
                collab.prog_led.force_on(active);
                vec![format!("Programming mode {}", if active { "on" } else { "off" })]
            }
            Command::Restart => {
                self.restart();
                vec!["Restarting".to_string()]
            }
            Command::Fatal => {
                self.fatal_error(FatalCode::SensorUnknown, "Test with 5x blinking");
                vec!["Fatal error triggered".to_string()]
            }
            Command::PowerLoss => {
                self.power_loss_trigger().trigger();
                vec!["Power loss triggered".to_string()]
            }
            Command::Save => {
                self.collaborators_mut().storage.save();
                vec!["Saved".to_string()]
            }
            Command::Runtime { stat, hist } => self.runtime_stat_lines(stat, hist),
        }
    }

    fn help_lines(&self) -> Vec<String> {
        const BUILTIN: [(&str, &str); 11] = [
            ("help, h", "Show this help"),
            ("info, i", "Show general information"),
            ("uptime, u", "Show uptime"),
            ("versions, v", "Show module versions"),
            ("restart, r", "Restart the device"),
            ("prog, p", "Toggle the programming mode"),
            ("save, s, w", "Save data to storage"),
            ("fatal", "Trigger a fatal error"),
            ("powerloss", "Trigger a power loss"),
            ("runtime", "Show runtime statistics"),
            ("runtime hist|full", "Show runtime histogram / both"),
        ];

        let mut lines: Vec<String> = BUILTIN
            .iter()
            .map(|(c, d)| format!("> {c:<24} {d}"))
            .collect();
        for module in self.registry().iter() {
            for entry in module.help() {
                lines.push(format!("> {:<24} {}", entry.command, entry.description));
            }
        }
        lines
    }

    fn info_lines(&self) -> Vec<String> {
        let address = self.individual_address();
        let mut lines = vec![
            format!(
                "Address: {}.{}.{}",
                address >> 12,
                (address >> 8) & 0x0F,
                address & 0xFF
            ),
            format!("Configured: {}", self.is_configured()),
            format!("Uptime: {}", self.uptime().format()),
            format!("Dual core: {}", self.uses_dual_core()),
            format!(
                "Watchdog: {}",
                self.config()
                    .watchdog_period_ms
                    .map(|p| format!("{p} ms"))
                    .unwrap_or_else(|| "off".to_string())
            ),
        ];
        for module in self.registry().iter() {
            lines.extend(module.information());
        }
        lines
    }

    fn version_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("Framework: {}", env!("CARGO_PKG_VERSION"))];
        for module in self.registry().iter() {
            if let Some(version) = module.version() {
                lines.push(format!("{}: {}", module.name(), version));
            }
        }
        lines
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
