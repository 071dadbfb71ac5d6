// ─────────────────────────────────────────────────────────────────────
// Recursive Attractor Engine — Command-Line Driver
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! `attractor run --suite <name>` runs a built-in suite (or a JSON list of
//! scenarios) and prints the summary table or the structured report.
//!
//! Exit status: 0 when every run completed, 1 when any run aborted with a
//! numerical collapse, 2 on configuration errors.

use std::error::Error;
use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueHint};
use tracing_subscriber::EnvFilter;

use attractor_harness::suites::{describe, SUITE_NAMES};
use attractor_harness::{
    suite, Harness, HarnessConfig, HarnessReport, ScenarioOverrides, ScenarioSpec,
};

type DynError = Box<dyn Error>;

const EXIT_COLLAPSE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(
    name = "attractor",
    author,
    version,
    about = "Recursive fixed-point discovery and validation engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a validation suite
    Run(RunArgs),

    /// List the built-in suites
    List,
}

#[derive(Args)]
struct RunArgs {
    /// Suite to run: fortress, goldilocks, spectral, mirror or all
    #[arg(long, default_value = "fortress")]
    suite: String,

    /// JSON list of scenarios that replaces the suite
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Iteration budget per run
    #[arg(long)]
    iterations: Option<u64>,

    /// Seeds per scenario (scale scenarios keep their own)
    #[arg(long)]
    seeds: Option<usize>,

    /// Ensemble size for ensemble scenarios
    #[arg(long)]
    particles: Option<usize>,

    /// Verdict and stability tolerance
    #[arg(long)]
    tolerance: Option<f64>,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Skip runs dispatched after this many seconds
    #[arg(long)]
    max_seconds: Option<f64>,

    /// Skip runs dispatched after this many total kernel iterations
    #[arg(long)]
    max_total_iterations: Option<u64>,

    /// Log a progress line every N iterations of every run
    #[arg(long, default_value_t = 0)]
    progress_every: u64,

    /// Print the structured report as JSON instead of the table
    #[arg(long)]
    json: bool,

    /// Also write the structured report to this file
    #[arg(long, value_hint = ValueHint::FilePath)]
    out: Option<PathBuf>,

    /// Include raw per-run trajectories in the structured report
    #[arg(long)]
    trajectories: bool,
}

impl RunArgs {
    fn overrides(&self) -> ScenarioOverrides {
        ScenarioOverrides {
            iterations: self.iterations,
            seeds: self.seeds,
            particles: self.particles,
            tolerance: self.tolerance,
        }
    }

    fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            max_wall_clock_s: self.max_seconds,
            max_total_iterations: self.max_total_iterations,
            keep_trajectories: self.trajectories,
            progress_every: self.progress_every,
        }
    }

    fn scenarios(&self) -> Result<Vec<ScenarioSpec>, DynError> {
        let mut specs = match &self.config {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
                ScenarioSpec::list_from_json(&raw)?
            }
            None => suite(&self.suite)?,
        };
        let overrides = self.overrides();
        for spec in &mut specs {
            spec.apply_overrides(&overrides);
        }
        Ok(specs)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // `log` records from the library crates are bridged by tracing-log.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();
}

fn list() {
    for name in SUITE_NAMES {
        println!("{name:<12} {}", describe(name));
    }
    println!("{:<12} every suite above", "all");
}

fn run(args: &RunArgs) -> Result<HarnessReport, DynError> {
    if let Some(n) = args.threads {
        if n == 0 {
            return Err("--threads must be >= 1".into());
        }
        rayon::ThreadPoolBuilder::new().num_threads(n).build_global()?;
    }
    let harness = Harness::new(args.harness_config())?;
    let specs = args.scenarios()?;
    log::info!("running {} scenario(s)", specs.len());
    Ok(harness.run(&specs))
}

fn emit(args: &RunArgs, report: &HarnessReport) -> Result<(), DynError> {
    if args.json || args.out.is_some() {
        let json = report.to_json()?;
        if let Some(path) = &args.out {
            fs::write(path, &json).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
            log::info!("report written to {}", path.display());
        }
        if args.json {
            println!("{json}");
        }
    }
    if !args.json {
        print!("{}", report.render_table());
    }
    Ok(())
}

fn exit_status(report: &HarnessReport) -> u8 {
    if report.has_config_errors() {
        EXIT_CONFIG
    } else if report.has_collapse() {
        EXIT_COLLAPSE
    } else {
        0
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::List => {
            list();
            ExitCode::SUCCESS
        }
        Command::Run(args) => {
            let report = match run(&args) {
                Ok(report) => report,
                Err(e) => {
                    log::error!("{e}");
                    return ExitCode::from(EXIT_CONFIG);
                }
            };
            if let Err(e) = emit(&args, &report) {
                log::error!("{e}");
                return ExitCode::from(EXIT_CONFIG);
            }
            ExitCode::from(exit_status(&report))
        }
    }
}
