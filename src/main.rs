use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;

use antiidle::app::{Attached, Mode};
use antiidle::clock::{Clock, SystemClock};
use antiidle::inject::{open_injector, InjectorBackend};
use antiidle::scheduler::SchedulerConfig;
use antiidle::sink::{LogSink, DEFAULT_LOG_FILE};
use antiidle::timing::{TimingConfig, TimingModel};
use antiidle::window::open_window_bridge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Auto,
    Uinput,
    X11,
}

impl BackendArg {
    fn to_library(self) -> InjectorBackend {
        match self {
            BackendArg::Auto => InjectorBackend::Auto,
            BackendArg::Uinput => InjectorBackend::Uinput,
            BackendArg::X11 => InjectorBackend::X11,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "antiidle")]
#[command(about = "Keeps a chosen X11 window from idling out with sporadic, human-like arrow-key presses", long_about = None)]
struct Cli {
    /// Seconds to wait before the first action
    #[arg(value_name = "STARTUP_DELAY", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    startup_delay: u64,

    /// Run 10 actions one second apart, then exit
    #[arg(short, long)]
    test: bool,

    /// Append-only log file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Input backend.
    ///
    /// - auto: uinput when /dev/uinput exists, otherwise XTEST when DISPLAY is set
    /// - uinput: virtual USB keyboard through the kernel
    /// - x11: XTEST fake input
    #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
    backend: BackendArg,

    /// Optional RNG seed (for debugging)
    #[arg(long)]
    seed: Option<u64>,

    /// Simulate this many turns in virtual time and print a JSON report.
    ///
    /// No input device or window is touched.
    #[arg(long, value_name = "TURNS", conflicts_with = "test")]
    simulate: Option<usize>,
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn build_scheduler_config(startup_delay: u64) -> Result<SchedulerConfig> {
    let cfg = SchedulerConfig {
        startup_delay: Duration::from_secs(startup_delay),
        ..Default::default()
    };
    cfg.validate()?;
    Ok(cfg)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let cfg = build_scheduler_config(cli.startup_delay)?;
    let timing = TimingModel::new(TimingConfig::default())?;
    let mut rng = rng_from_seed(cli.seed);

    if let Some(turns) = cli.simulate {
        let report = antiidle::sim::simulate(turns, &cfg, &timing, chrono::Local::now(), &mut rng);
        let stats = &report.stats;
        eprintln!(
            "Simulated: {} turns, {} keys, {} extended breaks, ~{:.1} h",
            stats.turns,
            stats.keys,
            stats.extended_breaks,
            (stats.total_delay_secs as f64) / 3600.0
        );
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{json}");
        return Ok(());
    }

    let mut sink = LogSink::new(Some(cli.log_file));
    let backend = cli.backend.to_library();

    let mut attached = Attached::open(
        |rng| open_injector(backend, rng),
        open_window_bridge,
        &mut sink,
        &mut rng,
    )?;

    // Installed only after the blocking window pick, so Ctrl+C still kills the
    // process while it waits for a click.
    let mut clock = SystemClock::default();
    clock.install_ctrlc_handler()?;

    let mode = if cli.test { Mode::Test } else { Mode::Continuous };
    attached.run(mode, &cfg, &timing, &mut clock, &mut sink, &mut rng);

    if clock.stop_requested() {
        eprintln!("Stopped.");
    }

    Ok(())
}
