//! Test fixtures and helpers.
//!
//! Pre-built rosters and battles for consistent testing.

use battle_core::data::Archetype;
use battle_core::grid::{GridPos, Topology};
use battle_core::simulation::{Battle, CombatConfig};
use battle_core::unit::{Team, Unit, UnitRegistry};
use fixed::types::I32F32;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from an integer percentage.
#[must_use]
pub fn fixed_pct(pct: i32) -> I32F32 {
    I32F32::from_num(pct) / I32F32::from_num(100)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Shorthand for a grid position.
#[must_use]
pub const fn pos(x: i32, y: i32) -> GridPos {
    GridPos::new(x, y)
}

/// Builds placed units with ids from one registry.
#[derive(Debug, Default)]
pub struct RosterBuilder {
    registry: UnitRegistry,
    team_one: Vec<Unit>,
    team_two: Vec<Unit>,
}

impl RosterBuilder {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: UnitRegistry::new(),
            team_one: Vec::new(),
            team_two: Vec::new(),
        }
    }

    /// Add a level 1 unit.
    #[must_use]
    pub fn with(self, archetype: Archetype, team: Team, at: GridPos) -> Self {
        self.with_level(archetype, team, 1, at)
    }

    /// Add a unit of the given level.
    #[must_use]
    pub fn with_level(mut self, archetype: Archetype, team: Team, level: u32, at: GridPos) -> Self {
        let unit = self.registry.spawn(archetype, team, level).at(at);
        match team {
            Team::One => self.team_one.push(unit),
            Team::Two => self.team_two.push(unit),
        }
        self
    }

    /// The two rosters, ready for `simulate`.
    #[must_use]
    pub fn build(self) -> (Vec<Unit>, Vec<Unit>) {
        (self.team_one, self.team_two)
    }

    /// Deploy both rosters into a fresh battle.
    ///
    /// # Panics
    ///
    /// Panics if any placement is rejected.
    #[must_use]
    pub fn battle(self, config: CombatConfig, seed: u64) -> Battle {
        let mut battle = Battle::new(config, Some(seed)).expect("valid config");
        for unit in self.team_one.into_iter().chain(self.team_two) {
            let at = unit.position().expect("fixture units are placed");
            battle.deploy(unit, at).expect("fixture placement is valid");
        }
        battle
    }
}

/// Level 1 warrior against a level 1 archer on the default board.
#[must_use]
pub fn duel_battle(seed: u64) -> Battle {
    RosterBuilder::new()
        .with(Archetype::Warrior, Team::One, pos(3, 1))
        .with(Archetype::Archer, Team::Two, pos(3, 6))
        .battle(CombatConfig::default(), seed)
}

/// One of every front-line and back-line archetype per side on a hex board.
#[must_use]
pub fn skirmish_battle(seed: u64) -> Battle {
    RosterBuilder::new()
        .with(Archetype::Warrior, Team::One, pos(2, 3))
        .with(Archetype::Tank, Team::One, pos(4, 3))
        .with(Archetype::Mage, Team::One, pos(1, 0))
        .with(Archetype::Archer, Team::One, pos(5, 0))
        .with(Archetype::Assassin, Team::Two, pos(2, 4))
        .with(Archetype::Warrior, Team::Two, pos(4, 4))
        .with(Archetype::Support, Team::Two, pos(1, 7))
        .with(Archetype::Mage, Team::Two, pos(5, 7))
        .battle(CombatConfig::with_board(7, 8, Topology::HexOddR), seed)
}
