//! Scenario loading and configuration.
//!
//! Scenarios describe a board and the units deployed on it. They are
//! authored as RON files or picked from the built-in set by name.

use std::path::Path;

use battle_core::actions::ActionTiming;
use battle_core::data::{Archetype, ArchetypeTable};
use battle_core::error::BattleError;
use battle_core::grid::{GridPos, Topology};
use battle_core::simulation::{Battle, CombatConfig, DEFAULT_MAX_FRAMES};
use battle_core::unit::{Team, UnitRegistry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Names accepted by [`Scenario::builtin`].
pub const BUILTIN_SCENARIOS: [&str; 3] = ["duel", "kiting", "skirmish_4v4"];

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The combat core rejected the board or a placement.
    #[error("Invalid scenario setup: {0}")]
    Setup(#[from] BattleError),
}

/// Board shape and terrain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSetup {
    /// Width in cells.
    pub width: i32,
    /// Height in cells.
    pub height: i32,
    /// Square or hex.
    pub topology: Topology,
    /// Impassable cells (x, y).
    #[serde(default)]
    pub obstacles: Vec<(i32, i32)>,
}

impl Default for BoardSetup {
    fn default() -> Self {
        Self {
            width: 7,
            height: 8,
            topology: Topology::Square,
            obstacles: Vec::new(),
        }
    }
}

/// Placement of a unit at scenario start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Unit archetype.
    pub archetype: Archetype,
    /// Star level.
    #[serde(default = "default_level")]
    pub level: u32,
    /// Side: 1 or 2.
    pub team: u8,
    /// Position (x, y).
    pub position: (i32, i32),
    /// Whether the unit's spell damage can crit.
    #[serde(default)]
    pub spell_crit: bool,
}

const fn default_level() -> u32 {
    1
}

impl UnitPlacement {
    /// Create a new level 1 placement.
    #[must_use]
    pub fn new(archetype: Archetype, team: u8, x: i32, y: i32) -> Self {
        Self {
            archetype,
            level: 1,
            team,
            position: (x, y),
            spell_crit: false,
        }
    }

    /// Set the level.
    #[must_use]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// Let the unit's spell crit.
    #[must_use]
    pub fn with_spell_crit(mut self) -> Self {
        self.spell_crit = true;
        self
    }
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Board setup.
    #[serde(default)]
    pub board: BoardSetup,
    /// Frame cap.
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,
    /// Action delays.
    #[serde(default)]
    pub timing: ActionTiming,
    /// Stat overrides per archetype.
    #[serde(default)]
    pub archetypes: ArchetypeTable,
    /// Units of both teams.
    pub units: Vec<UnitPlacement>,
}

const fn default_max_frames() -> u32 {
    DEFAULT_MAX_FRAMES
}

impl Default for Scenario {
    fn default() -> Self {
        Self::duel()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Built-in scenario by name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "duel" => Some(Self::duel()),
            "kiting" => Some(Self::kiting()),
            "skirmish_4v4" => Some(Self::skirmish_4v4()),
            _ => None,
        }
    }

    /// A built-in name, or else a path to a RON file.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match Self::builtin(name_or_path) {
            Some(scenario) => Ok(scenario),
            None => Self::load(name_or_path),
        }
    }

    /// Warrior against warrior, one level apart, face to face.
    #[must_use]
    pub fn duel() -> Self {
        Self {
            name: "duel".to_string(),
            description: "Level 2 warrior against a level 1 warrior".to_string(),
            board: BoardSetup::default(),
            max_frames: DEFAULT_MAX_FRAMES,
            timing: ActionTiming::default(),
            archetypes: ArchetypeTable::default(),
            units: vec![
                UnitPlacement::new(Archetype::Warrior, 1, 3, 3).with_level(2),
                UnitPlacement::new(Archetype::Warrior, 2, 3, 4),
            ],
        }
    }

    /// A melee unit closing in on an archer across the board.
    #[must_use]
    pub fn kiting() -> Self {
        Self {
            name: "kiting".to_string(),
            description: "Warrior walks into an archer's fire".to_string(),
            board: BoardSetup::default(),
            max_frames: DEFAULT_MAX_FRAMES,
            timing: ActionTiming::default(),
            archetypes: ArchetypeTable::default(),
            units: vec![
                UnitPlacement::new(Archetype::Warrior, 1, 3, 1),
                UnitPlacement::new(Archetype::Archer, 2, 3, 6),
            ],
        }
    }

    /// Mixed 4v4 on a hex board with a broken wall in the middle.
    #[must_use]
    pub fn skirmish_4v4() -> Self {
        Self {
            name: "skirmish_4v4".to_string(),
            description: "Four archetypes per side on a hex board".to_string(),
            board: BoardSetup {
                width: 7,
                height: 8,
                topology: Topology::HexOddR,
                obstacles: vec![(1, 4), (5, 3)],
            },
            max_frames: DEFAULT_MAX_FRAMES,
            timing: ActionTiming::default(),
            archetypes: ArchetypeTable::default(),
            units: vec![
                UnitPlacement::new(Archetype::Warrior, 1, 2, 3),
                UnitPlacement::new(Archetype::Tank, 1, 4, 3),
                UnitPlacement::new(Archetype::Mage, 1, 1, 0),
                UnitPlacement::new(Archetype::Archer, 1, 5, 0),
                UnitPlacement::new(Archetype::Assassin, 2, 2, 4),
                UnitPlacement::new(Archetype::Warrior, 2, 4, 4),
                UnitPlacement::new(Archetype::Support, 2, 1, 7),
                UnitPlacement::new(Archetype::Mage, 2, 5, 7),
            ],
        }
    }

    /// Combat configuration for this scenario.
    #[must_use]
    pub fn config(&self) -> CombatConfig {
        CombatConfig {
            max_frames: self.max_frames,
            timing: self.timing,
            ..CombatConfig::with_board(self.board.width, self.board.height, self.board.topology)
        }
    }

    /// Number of units deployed for `team`.
    #[must_use]
    pub fn team_size(&self, team: Team) -> usize {
        self.units
            .iter()
            .filter(|unit| unit.team == team.number())
            .count()
    }

    /// Build a battle ready to run.
    ///
    /// Unit ids follow placement order, starting at 1.
    pub fn build_battle(&self, seed: Option<u64>) -> Result<Battle, ScenarioError> {
        let mut battle = Battle::new(self.config(), seed)?;
        for &(x, y) in &self.board.obstacles {
            battle.add_obstacle(GridPos::new(x, y))?;
        }

        let mut registry = UnitRegistry::new();
        for placement in &self.units {
            let team =
                Team::from_number(placement.team).ok_or(BattleError::InvalidTeam(placement.team))?;
            if placement.level == 0 {
                return Err(BattleError::InvalidLevel(placement.level).into());
            }
            let unit = registry
                .spawn_with_stats(
                    placement.archetype,
                    team,
                    placement.level,
                    self.archetypes.stats(placement.archetype),
                )
                .with_spell_crit(placement.spell_crit);
            let (x, y) = placement.position;
            battle.deploy(unit, GridPos::new(x, y))?;
        }

        tracing::debug!(
            scenario = %self.name,
            units = self.units.len(),
            seed = battle.seed(),
            "Scenario deployed"
        );
        Ok(battle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use battle_core::simulation::BattleOutcome;

    #[test]
    fn test_builtins_resolve() {
        for name in BUILTIN_SCENARIOS {
            let scenario = Scenario::builtin(name).unwrap();
            assert_eq!(scenario.name, name);
            assert!(scenario.build_battle(Some(1)).is_ok(), "{name} fails to deploy");
        }
        assert!(Scenario::builtin("nope").is_none());
    }

    #[test]
    fn test_skirmish_scenario() {
        let scenario = Scenario::skirmish_4v4();
        assert_eq!(scenario.config().topology, Topology::HexOddR);
        assert_eq!(scenario.team_size(Team::One), 4);
        assert_eq!(scenario.team_size(Team::Two), 4);
    }

    #[test]
    fn test_duel_favours_the_higher_level() {
        let mut battle = Scenario::duel().build_battle(Some(3)).unwrap();
        assert_eq!(battle.run(), BattleOutcome::Victory(Team::One));
    }

    #[test]
    fn test_parse_from_ron() {
        let ron = r#"
            Scenario(
                name: "Test",
                board: (
                    width: 5,
                    height: 6,
                    topology: HexOddR,
                    obstacles: [(2, 3)],
                ),
                max_frames: 200,
                archetypes: (
                    entries: {
                        Warrior: (health: 300),
                    },
                ),
                units: [
                    (archetype: Warrior, level: 2, team: 1, position: (2, 0)),
                    (archetype: Archer, team: 2, position: (2, 5)),
                ],
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name, "Test");
        assert_eq!(scenario.units[1].level, 1);
        assert_eq!(scenario.timing, ActionTiming::default());

        let config = scenario.config();
        assert_eq!((config.width, config.height), (5, 6));
        assert_eq!(config.max_frames, 200);

        let battle = scenario.build_battle(Some(9)).unwrap();
        let warrior = battle.units().next().unwrap();
        assert_eq!(warrior.archetype(), Archetype::Warrior);
        assert_eq!(warrior.base_stats().max_health.to_num::<i32>(), 300);
    }

    #[test]
    fn test_bad_team_is_rejected() {
        let mut scenario = Scenario::duel();
        scenario.units[0].team = 3;
        assert!(matches!(
            scenario.build_battle(Some(1)),
            Err(ScenarioError::Setup(BattleError::InvalidTeam(3)))
        ));
    }

    #[test]
    fn test_level_zero_is_rejected() {
        let mut scenario = Scenario::duel();
        scenario.units[1].level = 0;
        assert!(matches!(
            scenario.build_battle(Some(1)),
            Err(ScenarioError::Setup(BattleError::InvalidLevel(0)))
        ));
    }

    #[test]
    fn test_spell_crit_flag_reaches_the_unit() {
        let ron = r#"
            Scenario(
                name: "crit",
                units: [
                    (archetype: Mage, team: 1, position: (3, 1), spell_crit: true),
                    (archetype: Tank, team: 2, position: (3, 6)),
                ],
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        let battle = scenario.build_battle(Some(2)).unwrap();
        let crits: Vec<bool> = battle.units().map(|unit| unit.spell_crit()).collect();
        assert_eq!(crits, vec![true, false]);
    }

    #[test]
    fn test_placement_in_enemy_half_is_rejected() {
        let mut scenario = Scenario::kiting();
        scenario.units[0].position = (3, 6);
        assert!(matches!(
            scenario.build_battle(Some(1)),
            Err(ScenarioError::Setup(BattleError::WrongTeamHalf { .. }))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::resolve("no/such/scenario.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
