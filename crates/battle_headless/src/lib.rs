//! Headless battle runner for scenario playback and win-rate batches.
//!
//! Loads a scenario (built-in or RON file), deploys it into a
//! [`battle_core::simulation::Battle`] and runs it without any display.
//! This enables:
//!
//! - **Balance testing**: Win rates across thousands of seeds
//! - **CI verification**: Same seed, same event log
//! - **Debugging**: Full JSON event logs of a single battle
//!
//! # Output
//!
//! - **stdout**: Results as JSON
//! - **stderr**: Logs (human-readable)
//!
//! # Example
//!
//! ```bash
//! # Run one battle and print its event log
//! cargo run -p battle_headless -- run --scenario kiting --seed 7 --events
//!
//! # Win rates over 1000 seeds
//! cargo run -p battle_headless -- batch --scenario skirmish_4v4 --count 1000
//!
//! # Verify determinism
//! cargo run -p battle_headless -- verify --scenario scenarios/corridor.ron --seed 42
//! ```

pub mod batch;
pub mod scenario;

pub use batch::{run_batch, run_single_battle, BatchConfig, BatchResults, BatchSummary};
pub use scenario::{Scenario, ScenarioError, UnitPlacement};
