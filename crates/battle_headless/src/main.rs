//! Headless auto-battler runner.
//!
//! Runs battles without any display. Results go to stdout as JSON, logs
//! go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run a single battle of a built-in scenario
//! cargo run -p battle_headless -- run --scenario duel --seed 3
//!
//! # Run a batch for win rates
//! cargo run -p battle_headless -- batch --scenario skirmish_4v4 --count 1000 --output results/
//!
//! # Verify determinism
//! cargo run -p battle_headless -- verify --scenario kiting --seed 12345 --runs 5
//! ```
//!
//! `RUST_LOG` overrides the log filter; `--verbose` raises the default to
//! `debug`.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use battle_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    scenario::{Scenario, BUILTIN_SCENARIOS},
};

#[derive(Parser)]
#[command(name = "battle_headless")]
#[command(about = "Headless auto-battler runner for balance testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single battle
    Run {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "duel")]
        scenario: String,

        /// Random seed (random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Print the full report with its event log instead of the summary
        #[arg(long)]
        events: bool,

        /// Also write the full report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a batch of battles for win rates
    Batch {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "duel")]
        scenario: String,

        /// Number of battles to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Worker threads (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Verify determinism by running the same seed several times
    Verify {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "skirmish_4v4")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// List built-in scenarios
    List,
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr, stdout is for results
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .init();

    match cli.command {
        Some(Commands::Run {
            scenario,
            seed,
            events,
            output,
        }) => cmd_run(&scenario, seed, events, output),
        Some(Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
        }) => cmd_batch(scenario, count, parallel, output, seed),
        Some(Commands::Verify {
            scenario,
            seed,
            runs,
        }) => cmd_verify(&scenario, seed, runs),
        Some(Commands::List) | None => cmd_list(),
    }
}

fn load_scenario(name: &str) -> Scenario {
    match Scenario::resolve(name) {
        Ok(scenario) => scenario,
        Err(e) => {
            tracing::error!(error = %e, scenario = name, "Failed to load scenario");
            eprintln!("FATAL: {e}");
            process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("FATAL: Failed to serialize output: {e}");
            process::exit(1);
        }
    }
}

/// Run a single battle
fn cmd_run(name: &str, seed: Option<u64>, events: bool, output: Option<PathBuf>) {
    let scenario = load_scenario(name);
    let battle = match scenario.build_battle(seed) {
        Ok(battle) => battle,
        Err(e) => {
            eprintln!("FATAL: {e}");
            process::exit(1);
        }
    };

    tracing::info!(scenario = %scenario.name, seed = battle.seed(), "Running battle");
    let report = battle.into_report();
    tracing::info!(
        outcome = %report.outcome,
        frames = report.frames,
        events = report.events.len(),
        "Battle finished"
    );

    if let Some(path) = output {
        let written = serde_json::to_string_pretty(&report)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(&path, json));
        if let Err(e) = written {
            tracing::error!(error = %e, path = %path.display(), "Failed to write report");
            eprintln!("FATAL: Failed to write report: {e}");
            process::exit(1);
        }
    }

    if events {
        print_json(&report);
    } else {
        print_json(&serde_json::json!({
            "scenario": scenario.name,
            "seed": report.seed,
            "winner": report.winner(),
            "frames": report.frames,
            "events": report.events.len(),
        }));
    }
}

/// Run a batch of battles for win rates
fn cmd_batch(name: String, count: u32, parallel: u32, output: PathBuf, seed: u64) {
    let scenario = load_scenario(&name);

    tracing::info!(
        scenario = %name,
        count = count,
        parallel = parallel,
        seed = seed,
        output = %output.display(),
        "Batch configuration"
    );

    if let Err(e) = std::fs::create_dir_all(&output) {
        tracing::error!(error = %e, path = %output.display(), "Failed to create output directory");
        eprintln!(
            "FATAL: Cannot create output directory '{}': {}",
            output.display(),
            e
        );
        process::exit(1);
    }

    let config = BatchConfig::new(&name, count)
        .with_output(output.clone())
        .with_seed(seed)
        .with_parallel(parallel);
    let results = run_batch(config, &scenario);

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, path = %results_path.display(), "Failed to save results");
        eprintln!("FATAL: Failed to save results: {e}");
        process::exit(1);
    }

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE: {}", scenario.name);
    eprintln!("{}", "=".repeat(50));
    eprintln!("Battles played: {}", summary.total_battles);
    if !results.errors.is_empty() {
        eprintln!("Battles failed: {}", results.errors.len());
    }
    eprintln!("Team 1 wins:    {:>5.1}%", summary.team_one_win_rate() * 100.0);
    eprintln!("Team 2 wins:    {:>5.1}%", summary.team_two_win_rate() * 100.0);
    eprintln!("Draws:          {:>5.1}%", summary.draw_rate() * 100.0);
    eprintln!("Mean length:    {:.1} frames", summary.mean_frames);
    eprintln!("Results:        {}", results_path.display());

    print_json(summary);

    if !results.errors.is_empty() {
        process::exit(1);
    }
}

/// Verify determinism by running the same seed several times
fn cmd_verify(name: &str, seed: u64, runs: u32) {
    let scenario = load_scenario(name);
    tracing::info!(
        "Verifying determinism: {} with seed {} ({} runs)",
        scenario.name,
        seed,
        runs
    );

    match verify_determinism(&scenario, seed, runs) {
        Ok(true) => eprintln!("PASS: All {runs} runs produced identical results"),
        Ok(false) => {
            eprintln!("FAIL: Non-determinism detected!");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("FATAL: {e}");
            process::exit(1);
        }
    }
}

/// List built-in scenarios
fn cmd_list() {
    for name in BUILTIN_SCENARIOS {
        if let Some(scenario) = Scenario::builtin(name) {
            println!("{:<14} {}", scenario.name, scenario.description);
        }
    }
}
