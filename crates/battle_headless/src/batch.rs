//! Batch battle runner for win-rate estimation.
//!
//! Runs many seeds of one scenario in parallel using rayon. Every battle
//! owns its board, units and RNG, so battles share nothing but the
//! read-only scenario.

use std::path::{Path, PathBuf};
use std::time::Instant;

use battle_core::simulation::BattleOutcome;
use battle_core::unit::Team;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::scenario::{Scenario, ScenarioError};

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario name or path
    pub scenario: String,
    /// Number of battles to run
    pub battle_count: u32,
    /// Worker threads (0 = use rayon default)
    pub parallel: u32,
    /// Output directory for results
    pub output_dir: PathBuf,
    /// Seed of the first battle; battle `i` uses `seed_start + i`
    pub seed_start: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "duel".to_string(),
            battle_count: 100,
            parallel: 0,
            output_dir: PathBuf::from("results"),
            seed_start: 0,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    pub fn new(scenario: &str, battle_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            battle_count,
            ..Default::default()
        }
    }

    /// Set output directory
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set worker thread count
    pub fn with_parallel(mut self, threads: u32) -> Self {
        self.parallel = threads;
        self
    }
}

/// Result of one battle in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecord {
    /// Seed used
    pub seed: u64,
    /// Outcome
    pub outcome: BattleOutcome,
    /// Frames executed
    pub frames: u32,
    /// Events logged
    pub events: usize,
    /// Hash of the event log
    pub log_hash: u64,
}

/// Aggregate win rates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Battles that finished
    pub total_battles: u32,
    /// Team one victories
    pub team_one_wins: u32,
    /// Team two victories
    pub team_two_wins: u32,
    /// Draws
    pub draws: u32,
    /// Mean battle length in frames
    pub mean_frames: f64,
    /// Longest battle in frames
    pub max_frames: u32,
}

impl BatchSummary {
    /// Tally a set of battle records
    pub fn from_records(records: &[BattleRecord]) -> Self {
        let mut summary = Self {
            total_battles: records.len() as u32,
            ..Self::default()
        };
        for record in records {
            match record.outcome {
                BattleOutcome::Victory(Team::One) => summary.team_one_wins += 1,
                BattleOutcome::Victory(Team::Two) => summary.team_two_wins += 1,
                BattleOutcome::Draw => summary.draws += 1,
            }
            summary.max_frames = summary.max_frames.max(record.frames);
        }
        if !records.is_empty() {
            let total: u64 = records.iter().map(|r| u64::from(r.frames)).sum();
            summary.mean_frames = total as f64 / records.len() as f64;
        }
        summary
    }

    /// Share of battles won by team one
    pub fn team_one_win_rate(&self) -> f64 {
        f64::from(self.team_one_wins) / f64::from(self.total_battles.max(1))
    }

    /// Share of battles won by team two
    pub fn team_two_win_rate(&self) -> f64 {
        f64::from(self.team_two_wins) / f64::from(self.total_battles.max(1))
    }

    /// Share of battles drawn
    pub fn draw_rate(&self) -> f64 {
        f64::from(self.draws) / f64::from(self.total_battles.max(1))
    }
}

/// Error during batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Battle index
    pub battle_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Results from a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual battle records, in seed order
    pub battles: Vec<BattleRecord>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Run one seeded battle of a scenario to completion.
pub fn run_single_battle(scenario: &Scenario, seed: u64) -> Result<BattleRecord, ScenarioError> {
    let mut battle = scenario.build_battle(Some(seed))?;
    let outcome = battle.run();
    Ok(BattleRecord {
        seed,
        outcome,
        frames: battle.frame(),
        events: battle.events().len(),
        log_hash: battle.battlefield().log().hash(),
    })
}

/// Run a batch of battles
pub fn run_batch(config: BatchConfig, scenario: &Scenario) -> BatchResults {
    let start = Instant::now();

    info!(
        "Starting batch run: {} battles of '{}'",
        config.battle_count, scenario.name
    );

    let run_all = || -> Vec<Result<BattleRecord, BatchError>> {
        (0..config.battle_count)
            .into_par_iter()
            .map(|i| {
                let seed = config.seed_start.wrapping_add(u64::from(i));
                run_single_battle(scenario, seed).map_err(|e| {
                    warn!("Battle {} failed: {}", i, e);
                    BatchError {
                        battle_index: i,
                        seed,
                        message: e.to_string(),
                    }
                })
            })
            .collect()
    };

    let pool = if config.parallel > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel as usize)
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(
                    "Failed to build a {}-thread pool: {}, using the global pool",
                    config.parallel, e
                );
                None
            }
        }
    } else {
        None
    };
    let results = match pool {
        Some(pool) => pool.install(run_all),
        None => run_all(),
    };

    let (battles, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let battles: Vec<BattleRecord> = battles.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_records(&battles);
    let duration_seconds = start.elapsed().as_secs_f64();

    debug!(?summary, "Batch summary");
    info!(
        "Batch complete: {} battles in {:.2}s (team one {:.1}%, team two {:.1}%, draws {:.1}%)",
        battles.len(),
        duration_seconds,
        summary.team_one_win_rate() * 100.0,
        summary.team_two_win_rate() * 100.0,
        summary.draw_rate() * 100.0
    );

    BatchResults {
        config,
        battles,
        summary,
        duration_seconds,
        errors,
    }
}

/// Verify determinism by running the same seed several times.
///
/// Returns `true` when every run produced the same outcome, length and
/// event log hash.
pub fn verify_determinism(scenario: &Scenario, seed: u64, runs: u32) -> Result<bool, ScenarioError> {
    let mut records = (0..runs.max(1)).map(|_| run_single_battle(scenario, seed));
    let Some(first) = records.next().transpose()? else {
        return Ok(true);
    };
    for record in records {
        let record = record?;
        if record != first {
            warn!(
                seed,
                expected = first.log_hash,
                actual = record.log_hash,
                "Replay diverged"
            );
            return Ok(false);
        }
    }
    Ok(true)
}
