//! Framework configuration loading and management.
//!
//! The expected YAML structure is:
//! ```yaml
//! framework:
//!   max_modules: 9
//!   max_loop_time_us: 4000
//!   loop_time_warning_ms: 7
//!   loop_time_warning_interval_ms: 1000
//!   startup_delay_ms: 5000
//!   heartbeat_interval_ms: 60000
//!   led_heartbeat: false
//!   dual_core: true
//!   watchdog_period_ms: 16000
//! ```
//!
//! Every key is optional; absent keys keep the defaults listed on
//! [`FrameworkConfig`].

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Registry capacity when nothing else is configured.
pub const DEFAULT_MAX_MODULES: usize = 9;

/// Free-loop budget in microseconds.
pub const DEFAULT_MAX_LOOP_TIME_US: u32 = 4_000;

/// Tick duration in milliseconds above which an overrun is logged.
pub const DEFAULT_LOOP_TIME_WARNING_MS: u32 = 7;

/// Minimum spacing of two overrun logs, in milliseconds.
pub const DEFAULT_LOOP_TIME_WARNING_INTERVAL_MS: u32 = 1_000;

fn default_max_modules() -> usize {
    DEFAULT_MAX_MODULES
}

fn default_max_loop_time_us() -> u32 {
    DEFAULT_MAX_LOOP_TIME_US
}

fn default_loop_time_warning_ms() -> Option<u32> {
    Some(DEFAULT_LOOP_TIME_WARNING_MS)
}

fn default_loop_time_warning_interval_ms() -> u32 {
    DEFAULT_LOOP_TIME_WARNING_INTERVAL_MS
}

fn default_primary_poll_ms() -> u64 {
    1
}

fn default_secondary_poll_ms() -> u64 {
    50
}

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Deserialize)]
struct FrameworkConfigFile {
    framework: Option<FrameworkConfig>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Tunables of the scheduler, the lifecycle and the optional subsystems.
///
/// Optional subsystems are switched off by leaving their value at `None`
/// (or `false`) instead of being compiled out.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameworkConfig {
    /// Registry capacity.  Registration beyond it is refused.
    #[serde(default = "default_max_modules")]
    pub max_modules: usize,

    /// Time budget of the dispatcher, measured from the start of the
    /// application part of a tick, in µs.
    #[serde(default = "default_max_loop_time_us")]
    pub max_loop_time_us: u32,

    /// Tick duration that triggers an overrun log, in ms.  `None` disables it.
    #[serde(default = "default_loop_time_warning_ms")]
    pub loop_time_warning_ms: Option<u32>,

    /// Minimum spacing between two overrun logs, in ms.
    #[serde(default = "default_loop_time_warning_interval_ms")]
    pub loop_time_warning_interval_ms: u32,

    /// Delay between setup completion and the after-startup-delay hooks.
    #[serde(default)]
    pub startup_delay_ms: Option<u32>,

    /// Interval of the heartbeat telegram.  `None` disables it.
    #[serde(default)]
    pub heartbeat_interval_ms: Option<u32>,

    /// Drive the status-LED liveness pattern every tick.
    #[serde(default)]
    pub led_heartbeat: bool,

    /// Whether a secondary execution context participates.
    #[serde(default)]
    pub dual_core: bool,

    /// Hardware watchdog period.  `None` leaves the watchdog disabled.
    #[serde(default)]
    pub watchdog_period_ms: Option<u32>,

    /// Poll cadence of the primary while waiting for the secondary, in ms.
    #[serde(default = "default_primary_poll_ms")]
    pub primary_poll_ms: u64,

    /// Poll cadence of the secondary while waiting for the primary, in ms.
    #[serde(default = "default_secondary_poll_ms")]
    pub secondary_poll_ms: u64,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            max_modules: DEFAULT_MAX_MODULES,
            max_loop_time_us: DEFAULT_MAX_LOOP_TIME_US,
            loop_time_warning_ms: Some(DEFAULT_LOOP_TIME_WARNING_MS),
            loop_time_warning_interval_ms: DEFAULT_LOOP_TIME_WARNING_INTERVAL_MS,
            startup_delay_ms: None,
            heartbeat_interval_ms: None,
            led_heartbeat: false,
            dual_core: false,
            watchdog_period_ms: None,
            primary_poll_ms: default_primary_poll_ms(),
            secondary_poll_ms: default_secondary_poll_ms(),
        }
    }
}

// ── FrameworkConfigManager ────────────────────────────────────────────────────

/// Loads and holds the framework configuration from a YAML file.
#[derive(Debug, Default)]
pub struct FrameworkConfigManager {
    config: FrameworkConfig,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl FrameworkConfigManager {
    /// Creates a manager holding the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and replaces the held configuration.
    ///
    /// * A file without a `framework:` section yields the defaults.
    /// * On error the previously held configuration is reset to the defaults
    ///   and the manager reports "not loaded".
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or if the YAML is
    /// structurally invalid.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading framework configuration from: {}", path.display());

        self.config = FrameworkConfig::default();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: FrameworkConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        match file.framework {
            Some(config) => self.config = config,
            None => {
                warn!("No framework section in configuration file, using defaults");
            }
        }

        self.loaded = true;

        let c = &self.config;
        info!(
            max_modules = c.max_modules,
            max_loop_time_us = c.max_loop_time_us,
            dual_core = c.dual_core,
            startup_delay_ms = ?c.startup_delay_ms,
            heartbeat_interval_ms = ?c.heartbeat_interval_ms,
            "Framework configuration loaded"
        );
        debug!(
            loop_time_warning_ms = ?c.loop_time_warning_ms,
            loop_time_warning_interval_ms = c.loop_time_warning_interval_ms,
            watchdog_period_ms = ?c.watchdog_period_ms,
            "  timing"
        );

        Ok(())
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    /// Mutable access, used by the binary to apply CLI overrides.
    pub fn config_mut(&mut self) -> &mut FrameworkConfig {
        &mut self.config
    }

    pub fn into_config(self) -> FrameworkConfig {
        self.config
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
