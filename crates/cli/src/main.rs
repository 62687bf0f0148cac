// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod runner;

use anyhow::Context;
use clap::{Parser, Subcommand};
use picoblink_config::{SocDescriptor, Variant};
use picoblink_core::bus::SystemBus;
use picoblink_core::machine::{poll_config_for, Machine};
use picoblink_core::observer::TracingObserver;
use picoblink_core::peripherals::uart::Uart;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

pub(crate) const EXIT_PASS: u8 = 0;
pub(crate) const EXIT_ASSERT_FAIL: u8 = 1;
pub(crate) const EXIT_CONFIG_ERROR: u8 = 2;
pub(crate) const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "PicoBlink poll-loop simulator for PicoSoC",
    long_about = None
)]
struct Cli {
    /// Path to the SoC descriptor (YAML). Uses the built-in PicoSoC map when omitted.
    #[arg(long, global = true)]
    soc: Option<PathBuf>,

    /// Log every register access and LED change
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the firmware for a span of simulated time, printing UART output.
    Run(RunArgs),

    /// Deterministic, CI-friendly runner mode driven by a test script (YAML).
    Test(TestArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Firmware variant: echo or burst
    #[arg(long, default_value = "echo")]
    variant: Variant,

    /// Simulated milliseconds to run
    #[arg(long, default_value_t = 1_000)]
    ms: u64,

    /// Bytes pushed into the UART receiver before boot
    #[arg(long)]
    input: Option<String>,

    /// Reference clock cycles that elapse per poll-loop iteration
    #[arg(long, default_value_t = 1_000, value_parser = clap::value_parser!(u32).range(1..))]
    cycles_per_iteration: u32,

    /// Write a machine snapshot (JSON) when the run ends
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub(crate) struct TestArgs {
    /// Path to the test script (YAML)
    #[arg(short = 'c', long)]
    pub script: PathBuf,

    /// Override max iterations (takes precedence over script)
    #[arg(long)]
    pub max_iterations: Option<u64>,

    /// Disable UART stdout echo (still captured for assertions/artifacts)
    #[arg(long)]
    pub no_uart_stdout: bool,

    /// Directory to write test artifacts (result.json, uart.log, snapshot.json)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // UART output owns stdout; logs go to stderr.
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_interactive(cli.soc.as_deref(), cli.trace, &args),
        Commands::Test(args) => runner::run_test(args, cli.soc.as_deref(), cli.trace),
    }
}

/// Loads the SoC descriptor at `path`, or the built-in PicoSoC map.
pub(crate) fn load_soc(path: Option<&Path>) -> anyhow::Result<SocDescriptor> {
    match path {
        Some(path) => {
            info!("Loading SoC descriptor: {:?}", path);
            SocDescriptor::from_file(path)
        }
        None => Ok(SocDescriptor::picosoc()),
    }
}

pub(crate) fn build_bus(soc: &SocDescriptor, trace: bool) -> anyhow::Result<SystemBus> {
    let mut bus = SystemBus::from_config(soc)
        .with_context(|| format!("Failed to build bus for SoC '{}'", soc.name))?;
    if trace {
        bus.add_observer(Arc::new(TracingObserver));
    }
    Ok(bus)
}

fn run_interactive(soc_path: Option<&Path>, trace: bool, args: &RunArgs) -> ExitCode {
    info!("Starting PicoBlink Simulator");

    let (soc, bus) = match load_soc(soc_path).and_then(|soc| {
        let bus = build_bus(&soc, trace)?;
        Ok((soc, bus))
    }) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let uart_tx = Arc::new(Mutex::new(Vec::new()));
    let mut machine = Machine::new(
        bus,
        poll_config_for(args.variant, soc.reference_clock_hz),
        args.cycles_per_iteration,
    );
    machine.bus.attach_uart_tx_sink(uart_tx.clone(), true);

    if let Some(input) = &args.input {
        machine.push_uart_rx(input.as_bytes());
    }

    info!(
        "Running {} variant on '{}' for {} ms ({} cycles per iteration)",
        args.variant, soc.name, args.ms, args.cycles_per_iteration
    );

    let result = machine.run_for_ms(args.ms);

    let tx_bytes = uart_tx.lock().map(|g| g.len()).unwrap_or(0);
    info!(
        "Stopped after {} iterations ({} ms): LED = {} ({} changes), UART TX bytes = {}",
        machine.iterations(),
        machine.elapsed_ms(),
        machine.led_value(),
        machine.led_changes(),
        tx_bytes
    );
    if let Some(uart) = machine.bus.first_of::<Uart>() {
        if uart.overruns() > 0 {
            info!("UART RX overruns: {}", uart.overruns());
        }
    }

    if let Some(path) = &args.snapshot {
        write_snapshot(path, &machine);
    }

    match result {
        Ok(()) => ExitCode::from(EXIT_PASS),
        Err(e) => {
            error!("Simulation error: {}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

pub(crate) fn write_snapshot(path: &Path, machine: &Machine) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!("Failed to create snapshot parent dir {:?}: {}", parent, e);
            return;
        }
    }

    match std::fs::File::create(path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, &machine.snapshot()) {
                error!("Failed to write snapshot {:?}: {}", path, e);
            }
        }
        Err(e) => error!("Failed to create snapshot {:?}: {}", path, e),
    }
}
