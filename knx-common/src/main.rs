/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};

use knx_common::button::Button;
use knx_common::clock::{Clock, SharedClock, SystemClock};
use knx_common::config::FrameworkConfigManager;
use knx_common::lifecycle::{Framework, Phase};
use knx_common::module::{HelpEntry, Module, SecondaryModule};
use knx_common::sim::{self, Journal, SimLed};
use knx_common::timer::elapsed;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Host simulator for the KNX module framework.
///
/// Example:
///   knx-common -c framework.yaml -d 3000 --powerloss-at 1000 -x runtime
#[derive(Debug, Parser)]
#[command(
    name = "knx-common",
    about = "KNX module framework – host simulator",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML framework configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Simulated run time in milliseconds.
    #[arg(short = 'd', long = "duration", default_value_t = 5_000)]
    duration_ms: u32,

    /// Pause between two ticks in milliseconds.
    #[arg(short = 't', long = "tick-ms", default_value_t = 1)]
    tick_ms: u64,

    /// Signal a power loss this many milliseconds after setup.
    #[arg(short = 'p', long = "powerloss-at")]
    powerloss_at_ms: Option<u32>,

    /// Simulate a device without application download.
    #[arg(short = 'u', long = "unconfigured", default_value_t = false)]
    unconfigured: bool,

    /// Run the secondary context on a second thread.
    #[arg(long = "dual-core", default_value_t = false)]
    dual_core: bool,

    /// Console command executed after setup (repeatable).
    #[arg(short = 'x', long = "command")]
    commands: Vec<String>,
}

// ── Demo modules ──────────────────────────────────────────────────────────────

fn busy_wait(clock: &dyn Clock, us: u32) {
    let start = clock.micros();
    while elapsed(start, clock.micros()) < us {
        std::hint::spin_loop();
    }
}

/// Polls a simulated sensor; each poll costs `cost_us` of CPU time.
struct Sensor {
    clock: SharedClock,
    cost_us: u32,
    readings: u64,
}

impl Module for Sensor {
    fn name(&self) -> &str {
        "Sensor"
    }

    fn version(&self) -> Option<String> {
        Some("1.2".to_string())
    }

    fn run(&mut self, configured: bool) {
        if !configured {
            return;
        }
        busy_wait(self.clock.as_ref(), self.cost_us);
        self.readings += 1;
    }

    fn information(&self) -> Vec<String> {
        vec![format!("Sensor: {} readings", self.readings)]
    }
}

/// Logic engine.  The channel evaluation runs on the secondary context when
/// one is used.
struct Logic {
    evaluations: Arc<AtomicU64>,
    half: Option<LogicChannels>,
}

struct LogicChannels(Arc<AtomicU64>);

impl SecondaryModule for LogicChannels {
    fn setup(&mut self, configured: bool) {
        debug!(configured, "logic channels ready");
    }

    fn run(&mut self, configured: bool) {
        if configured {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Logic {
    fn new() -> Self {
        let evaluations = Arc::new(AtomicU64::new(0));
        Self {
            half: Some(LogicChannels(Arc::clone(&evaluations))),
            evaluations,
        }
    }
}

impl Module for Logic {
    fn name(&self) -> &str {
        "Logic"
    }

    fn version(&self) -> Option<String> {
        Some("3.4".to_string())
    }

    fn take_secondary(&mut self) -> Option<Box<dyn SecondaryModule>> {
        self.half
            .take()
            .map(|h| Box::new(h) as Box<dyn SecondaryModule>)
    }

    fn process_after_startup_delay(&mut self) {
        info!("logic channels enabled");
    }

    fn save_power(&mut self) {
        info!(
            evaluations = self.evaluations.load(Ordering::Relaxed),
            "logic state saved"
        );
    }

    fn process_command(&mut self, command: &str, _from_diagnose: bool) -> bool {
        if command != "logic" {
            return false;
        }
        info!(
            evaluations = self.evaluations.load(Ordering::Relaxed),
            "logic status"
        );
        true
    }

    fn help(&self) -> Vec<HelpEntry> {
        vec![HelpEntry::new("logic", "Show logic status")]
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!(
        config         = ?cli.config,
        duration_ms    = cli.duration_ms,
        tick_ms        = cli.tick_ms,
        powerloss_at   = ?cli.powerloss_at_ms,
        unconfigured   = cli.unconfigured,
        dual_core      = cli.dual_core,
        "Simulator configuration"
    );

    if let Err(e) = run(cli) {
        error!("Simulation failed: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // ── Load framework configuration ──────────────────────────────────────────
    let mut manager = FrameworkConfigManager::new();
    match &cli.config {
        Some(path) => manager.load_from_file(path)?,
        None => warn!("No configuration file provided, using default framework settings"),
    }
    let mut config = manager.into_config();
    if cli.dual_core {
        config.dual_core = true;
    }

    // ── Build the framework ───────────────────────────────────────────────────
    let clock: SharedClock = Arc::new(SystemClock::new());
    let journal = Journal::new();
    let collab = sim::collaborators(&journal, !cli.unconfigured);
    let mut fw = Framework::new(config, Arc::clone(&clock), collab);

    fw.register(Box::new(Sensor {
        clock: Arc::clone(&clock),
        cost_us: 300,
        readings: 0,
    }))
    .context("registering Sensor")?;
    fw.register(Box::new(Logic::new()))
        .context("registering Logic")?;

    let trigger = fw.power_loss_trigger();
    fw.add_button(Button::new("prog").on_long_click(move || trigger.trigger()));

    // Registration is closed from here on
    fw.init();

    let stop = Arc::new(AtomicBool::new(false));
    let secondary = if fw.config().dual_core {
        fw.secondary_context()
    } else {
        None
    };
    let handle = secondary
        .map(|ctx| {
            let ctx = ctx.with_led(Box::new(SimLed::new("info2", &journal)));
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("secondary".into())
                .spawn(move || ctx.run(&stop))
        })
        .transpose()
        .context("spawning the secondary context")?;

    fw.setup();
    for command in cli.commands {
        fw.queue_command(command);
    }

    // ── Main loop ─────────────────────────────────────────────────────────────
    let trigger = fw.power_loss_trigger();
    let mut power_lost = false;
    let start = clock.millis();
    loop {
        let now = elapsed(start, clock.millis());
        if now >= cli.duration_ms {
            break;
        }
        if let Some(at) = cli.powerloss_at_ms {
            if !power_lost && now >= at {
                info!(at_ms = now, "simulated supply failure");
                trigger.trigger();
                power_lost = true;
            }
        }

        fw.tick();
        if let Phase::Terminal(reason) = fw.phase() {
            warn!(?reason, "framework stopped");
            break;
        }
        thread::sleep(Duration::from_millis(cli.tick_ms));
    }

    stop.store(true, Ordering::Relaxed);
    if let Some(handle) = handle {
        handle
            .join()
            .map_err(|_| anyhow!("secondary context panicked"))?;
    }

    // ── Summary ───────────────────────────────────────────────────────────────
    for line in fw.runtime_stat_lines(true, false) {
        info!("{line}");
    }
    info!(
        events = journal.events().len(),
        uptime = %fw.uptime().format(),
        "Simulation finished"
    );
    Ok(())
}
