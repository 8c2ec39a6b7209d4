//! # Battle Core
//!
//! Deterministic combat core for the Hexfall Arena auto-battler.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No unseeded randomness inside a battle
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Replays from a seed and a roster
//! - Headless win-rate batches
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`grid`] - Square and hex boards, distances, occupancy
//! - [`pathfinding`] - A* and range queries
//! - [`unit`] - Combatants and their stats
//! - [`spells`] - Spell contract and built-in spells
//! - [`simulation`] - Frame-based combat engine
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod actions;
pub mod battlefield;
pub mod combat;
pub mod data;
pub mod error;
pub mod events;
pub mod grid;
pub mod math;
pub mod pathfinding;
pub mod simulation;
pub mod spells;
pub mod targeting;
pub mod unit;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::actions::{ActionKind, ActionTiming, PlannedAction};
    pub use crate::battlefield::Battlefield;
    pub use crate::combat::{mitigate, Damage, DamageType, BASIC_ATTACK};
    pub use crate::data::{Archetype, ArchetypeData, ArchetypeTable};
    pub use crate::error::{BattleError, Result};
    pub use crate::events::{CombatEvent, CombatEventKind, CombatLog};
    pub use crate::grid::{CellState, Grid, GridPos, Metric, Topology};
    pub use crate::math::{percent, Fixed};
    pub use crate::pathfinding::{distance_to_range, guided_path, path_to_range, shortest_path};
    pub use crate::simulation::{
        simulate, Battle, BattleOutcome, BattleReport, BattleSnapshot, BattleSummary,
        CombatConfig,
    };
    pub use crate::spells::{CastContext, CritRoll, Spell};
    pub use crate::unit::{Buff, Team, Unit, UnitId, UnitRegistry, UnitStats};
}
