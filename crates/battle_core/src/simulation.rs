//! Frame-based combat engine.
//!
//! Every frame runs four phases in a fixed order:
//!
//! 1. **Resolve** actions whose resolution frame has arrived: attacks,
//!    then spells, then moves. Liveness of the acting unit is read once
//!    at the start of each phase, so units that die mid-phase still act
//!    in it.
//! 2. **Plan** a new action for every living unit without one.
//! 3. **Resolve move conflicts**: when several units claim the same
//!    cell, one is picked uniformly at random and the rest wait.
//! 4. **Cleanup**: dead units leave the board and drop their actions.
//!
//! A battle ends when one side has no living units, or at the frame cap,
//! where the side with more total health wins.
//!
//! # Determinism
//!
//! - All arithmetic is fixed-point ([`Fixed`])
//! - Every random draw comes from the battle's own seeded `ChaCha8Rng`
//! - Units are visited in board order; maps are `BTreeMap`s
//! - Same roster + same seed = byte-identical event log
//!
//! # Example
//!
//! ```
//! use battle_core::prelude::*;
//!
//! let mut registry = UnitRegistry::new();
//! let warrior = registry
//!     .spawn(Archetype::Warrior, Team::One, 1)
//!     .at(GridPos::new(3, 1));
//! let archer = registry
//!     .spawn(Archetype::Archer, Team::Two, 1)
//!     .at(GridPos::new(3, 6));
//!
//! let report = simulate(&CombatConfig::default(), vec![warrior], vec![archer], Some(7)).unwrap();
//! assert!(report.frames > 0);
//! println!("{} after {} frames", report.outcome, report.frames);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::actions::{ActionKind, ActionTiming, PlannedAction};
use crate::battlefield::Battlefield;
use crate::combat::{Damage, DamageType, BASIC_ATTACK};
use crate::data::Archetype;
use crate::error::{BattleError, Result};
use crate::events::{CombatEvent, CombatEventKind};
use crate::grid::{Grid, GridPos, Topology};
use crate::math::{fixed_serde, percent, Fixed};
use crate::pathfinding::path_to_range;
use crate::spells::{CastContext, CritRoll};
use crate::targeting::find_target;
use crate::unit::{Team, Unit, UnitId};

/// Default frame cap.
pub const DEFAULT_MAX_FRAMES: u32 = 500;

/// Battle configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Board width in cells.
    pub width: i32,
    /// Board height in cells.
    pub height: i32,
    /// Board topology.
    pub topology: Topology,
    /// Frame cap.
    pub max_frames: u32,
    /// Action delays.
    pub timing: ActionTiming,
    /// Slack added to weapon range when deciding to attack.
    #[serde(with = "fixed_serde")]
    pub attack_range_tolerance: Fixed,
    /// Slack added to spell range when deciding to cast.
    #[serde(with = "fixed_serde")]
    pub spell_range_tolerance: Fixed,
    /// Steps within which a unit keeps its current target.
    #[serde(with = "fixed_serde")]
    pub retarget_tolerance: Fixed,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            width: 7,
            height: 8,
            topology: Topology::Square,
            max_frames: DEFAULT_MAX_FRAMES,
            timing: ActionTiming::default(),
            attack_range_tolerance: percent(66),
            spell_range_tolerance: percent(1),
            retarget_tolerance: percent(166),
        }
    }
}

impl CombatConfig {
    /// Default configuration on a board of the given shape.
    #[must_use]
    pub fn with_board(width: i32, height: i32, topology: Topology) -> Self {
        Self {
            width,
            height,
            topology,
            ..Self::default()
        }
    }

    /// Check that the configuration can run a battle.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidConfig`] for an empty board, a zero
    /// frame cap, zero move or wait delays, or negative tolerances.
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(BattleError::InvalidConfig(format!(
                "board must be at least 1x1, got {}x{}",
                self.width, self.height
            )));
        }
        if self.max_frames == 0 {
            return Err(BattleError::InvalidConfig(
                "max_frames must be positive".to_string(),
            ));
        }
        if self.timing.move_delay == 0 || self.timing.wait_delay == 0 {
            return Err(BattleError::InvalidConfig(
                "move and wait delays must be at least one frame".to_string(),
            ));
        }
        let tolerances = [
            ("attack_range_tolerance", self.attack_range_tolerance),
            ("spell_range_tolerance", self.spell_range_tolerance),
            ("retarget_tolerance", self.retarget_tolerance),
        ];
        for (name, value) in tolerances {
            if value < Fixed::ZERO {
                return Err(BattleError::InvalidConfig(format!(
                    "{name} must not be negative"
                )));
            }
        }
        Ok(())
    }

    /// An empty board of the configured shape.
    #[must_use]
    pub fn grid(&self) -> Grid {
        Grid::new(self.width, self.height, self.topology)
    }
}

/// How a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleOutcome {
    /// One side won.
    Victory(Team),
    /// Equal health at the frame cap, or mutual elimination.
    Draw,
}

impl BattleOutcome {
    /// Winner code: 1 or 2 for a team, 0 for a draw.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Victory(team) => team.number(),
            Self::Draw => 0,
        }
    }

    /// Winning team, if any.
    #[must_use]
    pub const fn winner(self) -> Option<Team> {
        match self {
            Self::Victory(team) => Some(team),
            Self::Draw => None,
        }
    }
}

impl fmt::Display for BattleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Victory(team) => write!(f, "{team} wins"),
            Self::Draw => write!(f, "draw"),
        }
    }
}

/// Result of a finished battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReport {
    /// How the battle ended.
    pub outcome: BattleOutcome,
    /// Frames executed.
    pub frames: u32,
    /// Seed the battle ran with.
    pub seed: u64,
    /// Full event log.
    pub events: Vec<CombatEvent>,
}

impl BattleReport {
    /// Winner code: 1, 2 or 0 for a draw.
    #[must_use]
    pub const fn winner(&self) -> u8 {
        self.outcome.code()
    }
}

/// Aggregate view of a battle in progress or finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSummary {
    /// Frames executed.
    pub frames: u32,
    /// Events logged.
    pub events: usize,
    /// Seed the battle runs with.
    pub seed: u64,
    /// Action delays.
    pub timing: ActionTiming,
    /// Actions still pending.
    pub pending_actions: usize,
    /// Living units on team one.
    pub team_one_alive: usize,
    /// Living units on team two.
    pub team_two_alive: usize,
    /// Outcome, once decided.
    pub outcome: Option<BattleOutcome>,
}

impl fmt::Display for BattleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} | {} events | seed {} | alive {}v{} | {} pending",
            self.frames,
            self.events,
            self.seed,
            self.team_one_alive,
            self.team_two_alive,
            self.pending_actions
        )?;
        if let Some(outcome) = self.outcome {
            write!(f, " | {outcome}")?;
        }
        Ok(())
    }
}

/// Observable state of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// Unit id.
    pub id: UnitId,
    /// Side.
    pub team: Team,
    /// Archetype.
    pub archetype: Archetype,
    /// Level.
    pub level: u32,
    /// Cell, `None` once dead.
    pub position: Option<GridPos>,
    /// Current health.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,
    /// Current mana.
    #[serde(with = "fixed_serde")]
    pub mana: Fixed,
    /// Current target.
    pub target: Option<UnitId>,
}

impl From<&Unit> for UnitSnapshot {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id(),
            team: unit.team(),
            archetype: unit.archetype(),
            level: unit.level(),
            position: unit.position(),
            health: unit.health(),
            mana: unit.mana(),
            target: unit.current_target(),
        }
    }
}

/// Observable state of a battle at one frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleSnapshot {
    /// Frames executed.
    pub frame: u32,
    /// Every unit in id order.
    pub units: Vec<UnitSnapshot>,
    /// Pending actions.
    pub pending: Vec<PlannedAction>,
}

/// One battle: configuration, battlefield, RNG and schedule.
#[derive(Debug, Clone)]
pub struct Battle {
    config: CombatConfig,
    field: Battlefield,
    rng: ChaCha8Rng,
    seed: u64,
    frame: u32,
    /// Living units in board order.
    active: Vec<UnitId>,
    pending: Vec<PlannedAction>,
    started: bool,
    outcome: Option<BattleOutcome>,
}

impl Battle {
    /// Create an empty battle.
    ///
    /// `seed = None` draws a fresh seed from entropy; it is still
    /// recorded so the battle can be replayed.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: CombatConfig, seed: Option<u64>) -> Result<Self> {
        config.validate()?;
        let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
        Ok(Self {
            field: Battlefield::new(config.grid()),
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            frame: 0,
            active: Vec::new(),
            pending: Vec::new(),
            started: false,
            outcome: None,
        })
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.started {
            Err(BattleError::AlreadyStarted(self.frame))
        } else {
            Ok(())
        }
    }

    /// Mark a cell as impassable before the battle starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the battle has started or the cell is out of
    /// bounds or not empty.
    pub fn add_obstacle(&mut self, pos: GridPos) -> Result<()> {
        self.ensure_not_started()?;
        self.field.grid.set_obstacle(pos)
    }

    /// Place a unit at `pos` in its team's starting half.
    ///
    /// # Errors
    ///
    /// Returns an error if the battle has started, the id is taken, or
    /// the cell is out of bounds, not empty or on the wrong half.
    pub fn deploy(&mut self, mut unit: Unit, pos: GridPos) -> Result<UnitId> {
        self.ensure_not_started()?;
        let grid = self.field.grid();
        if !grid.is_valid(pos) {
            return Err(BattleError::OutOfBounds {
                pos,
                width: grid.width(),
                height: grid.height(),
            });
        }
        if !grid.cell(pos).is_some_and(|cell| cell.is_empty()) {
            return Err(BattleError::CellNotEmpty(pos));
        }
        if !grid.in_starting_half(pos, unit.team()) {
            return Err(BattleError::WrongTeamHalf {
                pos,
                team: unit.team(),
            });
        }
        let id = unit.id();
        if self.field.unit(id).is_some() {
            return Err(BattleError::DuplicateUnit(id));
        }

        unit.position = Some(pos);
        unit.planned_position = None;
        self.field.insert_unit(unit);
        self.active.push(id);
        self.sort_active();
        Ok(id)
    }

    fn sort_active(&mut self) {
        let field = &self.field;
        self.active
            .sort_by_key(|id| field.unit(*id).and_then(Unit::position));
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Seed the battle runs with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Frames executed so far.
    #[must_use]
    pub const fn frame(&self) -> u32 {
        self.frame
    }

    /// Outcome, once decided.
    #[must_use]
    pub const fn outcome(&self) -> Option<BattleOutcome> {
        self.outcome
    }

    /// The battlefield.
    #[must_use]
    pub const fn battlefield(&self) -> &Battlefield {
        &self.field
    }

    /// The board.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        self.field.grid()
    }

    /// Look up a unit, alive or dead.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.field.unit(id)
    }

    /// All units in id order, dead ones included.
    pub fn units(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.field.units()
    }

    /// Living units in board order.
    pub fn living_units(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.active
            .iter()
            .filter_map(|id| self.field.unit(*id))
            .filter(|unit| unit.is_alive())
    }

    /// Actions waiting to resolve.
    #[must_use]
    pub fn pending_actions(&self) -> &[PlannedAction] {
        &self.pending
    }

    /// Events logged so far.
    #[must_use]
    pub fn events(&self) -> &[CombatEvent] {
        self.field.log().events()
    }

    /// Aggregate view of the battle.
    #[must_use]
    pub fn summary(&self) -> BattleSummary {
        BattleSummary {
            frames: self.frame,
            events: self.field.log().len(),
            seed: self.seed,
            timing: self.config.timing,
            pending_actions: self.pending.len(),
            team_one_alive: self.field.living_members(Team::One).len(),
            team_two_alive: self.field.living_members(Team::Two).len(),
            outcome: self.outcome,
        }
    }

    /// Observable state at the current frame.
    #[must_use]
    pub fn snapshot(&self) -> BattleSnapshot {
        BattleSnapshot {
            frame: self.frame,
            units: self.field.units().map(UnitSnapshot::from).collect(),
            pending: self.pending.clone(),
        }
    }

    /// The snapshot encoded with bincode.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.snapshot()).map_err(|e| BattleError::Snapshot(e.to_string()))
    }

    /// Hash of the current battle state.
    ///
    /// Two battles in the same state produce the same hash.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.frame.hash(&mut hasher);
        self.active.hash(&mut hasher);

        for unit in self.field.units() {
            unit.id().hash(&mut hasher);
            unit.team().hash(&mut hasher);
            unit.position().hash(&mut hasher);
            unit.planned_position().hash(&mut hasher);
            unit.current_target().hash(&mut hasher);
            unit.health().to_bits().hash(&mut hasher);
            unit.mana().to_bits().hash(&mut hasher);
            unit.attack_overflow().to_bits().hash(&mut hasher);
        }

        self.pending.hash(&mut hasher);
        self.field.log().len().hash(&mut hasher);

        hasher.finish()
    }

    /// Run until an outcome is reached.
    pub fn run(&mut self) -> BattleOutcome {
        loop {
            if let Some(outcome) = self.step() {
                return outcome;
            }
        }
    }

    /// Consume the battle into a report, running it to completion first.
    #[must_use]
    pub fn into_report(mut self) -> BattleReport {
        let outcome = self.run();
        BattleReport {
            outcome,
            frames: self.frame,
            seed: self.seed,
            events: self.field.log.into_events(),
        }
    }

    /// Advance one frame.
    ///
    /// Returns the outcome once the battle is over; further calls keep
    /// returning it without changing anything.
    pub fn step(&mut self) -> Option<BattleOutcome> {
        if let Some(outcome) = self.outcome {
            return Some(outcome);
        }
        if !self.started {
            self.start();
        }
        if let Some(outcome) = self.check_outcome() {
            self.finish(outcome);
            return Some(outcome);
        }

        self.frame += 1;
        self.resolve_actions();
        self.plan_actions();
        self.cleanup();

        #[cfg(feature = "debug-validation")]
        self.validate_occupancy();

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(frame = self.frame, state_hash = hash, "Battle state hash");
        }

        None
    }

    fn start(&mut self) {
        self.started = true;
        let timing = self.config.timing;
        self.field.record(CombatEvent::new(
            self.frame,
            CombatEventKind::BattleStarted,
            format!(
                "seed {} | {}x{} {:?} | delays attack {} move {} spell {} wait {} | {} units",
                self.seed,
                self.config.width,
                self.config.height,
                self.config.topology,
                timing.attack_delay,
                timing.move_delay,
                timing.spell_delay,
                timing.wait_delay,
                self.active.len()
            ),
        ));
    }

    fn check_outcome(&self) -> Option<BattleOutcome> {
        let one_alive = !self.field.living_members(Team::One).is_empty();
        let two_alive = !self.field.living_members(Team::Two).is_empty();

        match (one_alive, two_alive) {
            (false, false) => return Some(BattleOutcome::Draw),
            (true, false) => return Some(BattleOutcome::Victory(Team::One)),
            (false, true) => return Some(BattleOutcome::Victory(Team::Two)),
            (true, true) => {}
        }

        if self.frame < self.config.max_frames {
            return None;
        }

        let one = self.field.team_health(Team::One);
        let two = self.field.team_health(Team::Two);
        Some(match one.cmp(&two) {
            std::cmp::Ordering::Greater => BattleOutcome::Victory(Team::One),
            std::cmp::Ordering::Less => BattleOutcome::Victory(Team::Two),
            std::cmp::Ordering::Equal => BattleOutcome::Draw,
        })
    }

    fn finish(&mut self, outcome: BattleOutcome) {
        self.outcome = Some(outcome);
        self.field.record(
            CombatEvent::new(self.frame, CombatEventKind::BattleEnded, outcome.to_string())
                .with_amount(Fixed::from_num(outcome.code())),
        );
        tracing::info!(
            frame = self.frame,
            seed = self.seed,
            winner = outcome.code(),
            "Battle ended: {outcome}"
        );
    }

    /// Uniform fixed-point roll in `[0, 1)`.
    fn roll(&mut self) -> Fixed {
        Fixed::from_bits(i64::from(self.rng.next_u32()))
    }

    fn alive_snapshot(&self, actions: &[PlannedAction]) -> Vec<bool> {
        actions
            .iter()
            .map(|action| self.field.is_alive(action.unit))
            .collect()
    }

    // ------------------------------------------------------------------
    // Resolve
    // ------------------------------------------------------------------

    fn resolve_actions(&mut self) {
        let frame = self.frame;
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|action| action.is_due(frame));
        self.pending = waiting;

        let of_kind = |kind: ActionKind| -> Vec<PlannedAction> {
            due.iter().filter(|a| a.kind == kind).cloned().collect()
        };
        let attacks = of_kind(ActionKind::Attack);
        let casts = of_kind(ActionKind::CastSpell);
        let moves = of_kind(ActionKind::Move);

        self.resolve_attacks(&attacks);
        self.resolve_casts(&casts);
        self.resolve_moves(&moves);
    }

    fn resolve_attacks(&mut self, attacks: &[PlannedAction]) {
        let alive = self.alive_snapshot(attacks);

        for (action, attacker_alive) in attacks.iter().zip(alive) {
            if !attacker_alive {
                continue;
            }
            let Some(target) = action.target_unit else {
                continue;
            };

            if !self.field.is_alive(target) {
                self.field.record(
                    CombatEvent::new(
                        self.frame,
                        CombatEventKind::FailedAttack,
                        format!("unit {} attacks {target}, which is already dead", action.unit),
                    )
                    .with_source(action.unit)
                    .with_target(target),
                );
                continue;
            }

            let roll = self.roll();
            let Some(attacker) = self.field.unit_mut(action.unit) else {
                continue;
            };
            attacker.add_basic_attack_mana();
            let (amount, crit) = attacker.basic_attack_damage(roll);

            self.field.deal_damage(
                &Damage::new(amount, DamageType::Physical, self.frame)
                    .from_source(action.unit)
                    .to_target(target)
                    .with_spell(BASIC_ATTACK)
                    .with_crit(crit),
            );
        }
    }

    fn resolve_casts(&mut self, casts: &[PlannedAction]) {
        let alive = self.alive_snapshot(casts);
        let target_alive: Vec<bool> = casts
            .iter()
            .map(|action| action.target_unit.map_or(true, |id| self.field.is_alive(id)))
            .collect();

        for ((action, caster_alive), target_alive) in casts.iter().zip(alive).zip(target_alive) {
            if !caster_alive || !target_alive {
                continue;
            }

            let roll = self.roll();
            let Some(caster) = self.field.unit_mut(action.unit) else {
                continue;
            };
            let crit = CritRoll {
                rate: caster.crit_rate(),
                multiplier: caster.crit_damage(),
                enabled: caster.spell_crit(),
                roll,
            };
            let Some(mut spell) = caster.take_spell() else {
                continue;
            };

            let cast = CastContext {
                caster: action.unit,
                frame: self.frame,
                crit,
            };
            spell.execute(&cast, &mut self.field);
            let name = spell.name();
            let target = spell.target();
            if let Some(caster) = self.field.unit_mut(action.unit) {
                caster.restore_spell(spell);
            }

            let mut event = CombatEvent::new(
                self.frame,
                CombatEventKind::SpellExecuted,
                format!("unit {} casts {name}", action.unit),
            )
            .with_source(action.unit)
            .with_spell(name);
            if let Some(target) = target {
                event = event.with_target(target);
            }
            self.field.record(event);
        }
    }

    fn resolve_moves(&mut self, moves: &[PlannedAction]) {
        let alive = self.alive_snapshot(moves);

        for (action, mover_alive) in moves.iter().zip(alive) {
            if !mover_alive {
                continue;
            }
            let Some(dest) = action.target_cell else {
                continue;
            };

            if self.field.relocate(action.unit, dest) {
                self.field.record(
                    CombatEvent::new(
                        self.frame,
                        CombatEventKind::MoveExecuted,
                        format!("unit {} moves to {dest}", action.unit),
                    )
                    .with_source(action.unit)
                    .at(dest),
                );
            } else {
                self.field.record(
                    CombatEvent::new(
                        self.frame,
                        CombatEventKind::FailedMove,
                        format!("unit {} cannot enter {dest}", action.unit),
                    )
                    .with_source(action.unit)
                    .at(dest),
                );
                self.field.release_reservation(action.unit);
                for other in self.pending.iter_mut().filter(|a| a.unit == action.unit) {
                    other.convert_to_wait(other.resolution_frame);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Plan
    // ------------------------------------------------------------------

    fn plan_actions(&mut self) {
        let frame = self.frame;
        let busy: BTreeSet<UnitId> = self.pending.iter().map(|a| a.unit).collect();
        let mut claims: BTreeMap<GridPos, Vec<PlannedAction>> = BTreeMap::new();

        for id in self.active.clone() {
            if busy.contains(&id) || !self.field.is_alive(id) {
                continue;
            }
            let Some(action) = self.plan_unit(id) else {
                tracing::trace!(frame, unit = id.0, "No action available, idling");
                continue;
            };

            tracing::trace!(frame, unit = id.0, kind = ?action.kind, "Action planned");
            self.record_planned(&action);

            match (action.kind, action.target_cell) {
                (ActionKind::Move, Some(cell)) => claims.entry(cell).or_default().push(action),
                _ => self.pending.push(action),
            }
        }

        self.resolve_conflicts(claims);
    }

    fn record_planned(&mut self, action: &PlannedAction) {
        let detail = match action.kind {
            ActionKind::Move => action
                .target_cell
                .map_or_else(String::new, |cell| format!(" to {cell}")),
            ActionKind::Attack => action
                .target_unit
                .map_or_else(String::new, |target| format!(" on {target}")),
            ActionKind::CastSpell => format!(" {}", action.spell.as_deref().unwrap_or_default()),
            ActionKind::Wait => String::new(),
        };
        let mut event = CombatEvent::new(
            self.frame,
            CombatEventKind::ActionPlanned,
            format!(
                "unit {} plans {:?}{detail}, resolving at frame {}",
                action.unit, action.kind, action.resolution_frame
            ),
        )
        .with_source(action.unit);
        if let Some(target) = action.target_unit {
            event = event.with_target(target);
        }
        if let Some(spell) = &action.spell {
            event = event.with_spell(spell.clone());
        }
        if let Some(cell) = action.target_cell.or(action.start_position) {
            event = event.at(cell);
        }
        self.field.record(event);
    }

    /// Pick the next action for an idle unit. `None` means idle this frame.
    fn plan_unit(&mut self, id: UnitId) -> Option<PlannedAction> {
        let unit = self.field.unit(id)?;
        let origin = unit.position()?;
        let ready = unit.has_full_mana();
        let ranged_spell = unit.spell().map(|spell| spell.is_ranged());

        if ready && ranged_spell == Some(false) {
            if let Some(cast) = self.try_cast(id, origin) {
                return Some(cast);
            }
        }

        let target = find_target(
            &self.field,
            id,
            &self.active,
            self.config.retarget_tolerance,
            &mut self.rng,
        );
        if let Some(unit) = self.field.unit_mut(id) {
            unit.current_target = target;
        }
        let target = target?;
        let target_pos = self.field.unit(target)?.position()?;
        let spread = self.field.grid().l2_distance_squared(origin, target_pos);

        if ready && ranged_spell == Some(true) {
            let spell_range = self
                .field
                .unit(id)
                .and_then(Unit::spell)
                .map_or(Fixed::ZERO, |spell| spell.range());
            let reach = spell_range + self.config.spell_range_tolerance;
            if spread <= reach.saturating_mul(reach) {
                if let Some(cast) = self.try_cast(id, origin) {
                    return Some(cast);
                }
            }
        }

        let weapon_range = self.field.unit(id)?.weapon_range();
        let reach = weapon_range + self.config.attack_range_tolerance;
        if spread <= reach.saturating_mul(reach) {
            let delay = Fixed::from_num(self.config.timing.delay_for(ActionKind::Attack));
            let frames = self.field.unit_mut(id)?.schedule_attack(delay);
            return Some(
                PlannedAction::attack(id, target, self.frame, frames).from_position(Some(origin)),
            );
        }

        let path = path_to_range(self.field.grid(), origin, target_pos, weapon_range)?;
        let step = *path.get(1)?;
        if !self.field.grid().cell(step).is_some_and(|cell| cell.is_empty()) {
            return None;
        }
        Some(
            PlannedAction::movement(
                id,
                step,
                self.frame,
                self.config.timing.delay_for(ActionKind::Move),
            )
                .from_position(Some(origin)),
        )
    }

    /// Prepare the unit's spell and, if valid, pay for it.
    fn try_cast(&mut self, id: UnitId, origin: GridPos) -> Option<PlannedAction> {
        let mut spell = self.field.unit_mut(id)?.take_spell()?;
        let valid = self
            .field
            .unit(id)
            .is_some_and(|caster| spell.prepare(caster, &self.field));

        let action = valid.then(|| {
            let delay = spell
                .delay()
                .unwrap_or_else(|| self.config.timing.delay_for(ActionKind::CastSpell));
            PlannedAction::cast(id, spell.target(), spell.name(), self.frame, delay)
                .from_position(Some(origin))
        });

        if let Some(caster) = self.field.unit_mut(id) {
            if action.is_some() {
                caster.spend_mana();
            }
            caster.restore_spell(spell);
        }
        action
    }

    fn resolve_conflicts(&mut self, claims: BTreeMap<GridPos, Vec<PlannedAction>>) {
        let frame = self.frame;
        let wait_until = frame + self.config.timing.delay_for(ActionKind::Move);

        for (cell, mut claimants) in claims {
            let free = self.field.grid().cell(cell).is_some_and(|c| c.is_empty());
            if claimants.len() == 1 && free {
                let action = claimants.remove(0);
                self.field.reserve(action.unit, cell);
                self.pending.push(action);
                continue;
            }

            let winner = if free {
                Some(self.rng.gen_range(0..claimants.len()))
            } else {
                None
            };
            tracing::debug!(
                frame,
                x = cell.x,
                y = cell.y,
                claimants = claimants.len(),
                "Resolving move conflict"
            );

            for (index, mut action) in claimants.into_iter().enumerate() {
                let won = winner == Some(index);
                self.field.record(
                    CombatEvent::new(
                        frame,
                        CombatEventKind::ConflictResolved,
                        format!(
                            "unit {} {} the claim on {cell}",
                            action.unit,
                            if won { "wins" } else { "loses" }
                        ),
                    )
                    .with_source(action.unit)
                    .at(cell),
                );
                if won {
                    self.field.reserve(action.unit, cell);
                } else {
                    action.convert_to_wait(wait_until);
                }
                self.pending.push(action);
            }
        }
    }

    // ------------------------------------------------------------------
    // Cleanup
    // ------------------------------------------------------------------

    fn cleanup(&mut self) {
        let dead: Vec<UnitId> = self
            .active
            .iter()
            .copied()
            .filter(|id| !self.field.is_alive(*id))
            .collect();

        for id in dead {
            let position = self.field.unit(id).and_then(Unit::position);
            tracing::debug!(frame = self.frame, unit = id.0, "Unit died");
            let mut event = CombatEvent::new(
                self.frame,
                CombatEventKind::UnitDied,
                format!("unit {id} died"),
            )
            .with_source(id);
            if let Some(pos) = position {
                event = event.at(pos);
            }
            self.field.record(event);
            self.field.remove_from_board(id);
            self.pending.retain(|action| action.unit != id);
        }

        let field = &self.field;
        self.active.retain(|id| field.is_alive(*id));
        self.sort_active();
    }

    /// Panic if the board and the unit records disagree.
    #[cfg(feature = "debug-validation")]
    fn validate_occupancy(&self) {
        for unit in self.field.units() {
            match unit.position() {
                Some(pos) => assert_eq!(
                    self.field.grid().occupant(pos),
                    Some(unit.id()),
                    "unit {} thinks it stands on {pos}",
                    unit.id()
                ),
                None => assert!(!unit.is_alive(), "living unit {} is off the board", unit.id()),
            }
        }
        for pos in self.field.grid().occupied_positions() {
            let occupant = self.field.grid().occupant(pos);
            assert!(
                occupant
                    .and_then(|id| self.field.unit(id))
                    .is_some_and(|unit| unit.position() == Some(pos)),
                "cell {pos} names a unit that is not there"
            );
        }
    }
}

/// Run a battle between two rosters.
///
/// Units in `team_a` fight for [`Team::One`] and units in `team_b` for
/// [`Team::Two`], regardless of the team they were created with. Every
/// unit must carry a position (see [`Unit::at`]).
///
/// # Errors
///
/// Returns an error if the configuration is invalid, a unit has no
/// position, or a placement is rejected by [`Battle::deploy`].
pub fn simulate(
    config: &CombatConfig,
    team_a: Vec<Unit>,
    team_b: Vec<Unit>,
    seed: Option<u64>,
) -> Result<BattleReport> {
    let mut battle = Battle::new(config.clone(), seed)?;

    let rosters = team_a
        .into_iter()
        .map(|unit| (unit, Team::One))
        .chain(team_b.into_iter().map(|unit| (unit, Team::Two)));
    for (mut unit, team) in rosters {
        let pos = unit.position().ok_or(BattleError::Unplaced(unit.id()))?;
        unit.team = team;
        battle.deploy(unit, pos)?;
    }

    Ok(battle.into_report())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellState;
    use crate::unit::UnitRegistry;

    fn pos(x: i32, y: i32) -> GridPos {
        GridPos::new(x, y)
    }

    fn battle_with(config: CombatConfig, seed: u64, levels: (u32, u32)) -> Battle {
        let mut registry = UnitRegistry::new();
        let mut battle = Battle::new(config, Some(seed)).unwrap();
        battle
            .deploy(registry.spawn(Archetype::Warrior, Team::One, levels.0), pos(3, 1))
            .unwrap();
        battle
            .deploy(registry.spawn(Archetype::Warrior, Team::Two, levels.1), pos(3, 6))
            .unwrap();
        battle
    }

    /// Level 2 warrior against a level 1 warrior.
    fn duel(seed: u64) -> Battle {
        battle_with(CombatConfig::default(), seed, (2, 1))
    }

    #[test]
    fn test_config_validation() {
        assert!(CombatConfig::default().validate().is_ok());

        let empty = CombatConfig::with_board(0, 8, Topology::Square);
        assert!(matches!(empty.validate(), Err(BattleError::InvalidConfig(_))));

        let mut no_frames = CombatConfig::default();
        no_frames.max_frames = 0;
        assert!(no_frames.validate().is_err());

        let mut negative = CombatConfig::default();
        negative.retarget_tolerance = -Fixed::ONE;
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_deploy_validation() {
        let mut registry = UnitRegistry::new();
        let mut battle = Battle::new(CombatConfig::default(), Some(1)).unwrap();

        let err = battle
            .deploy(registry.spawn(Archetype::Tank, Team::One, 1), pos(9, 9))
            .unwrap_err();
        assert!(matches!(err, BattleError::OutOfBounds { .. }));

        let err = battle
            .deploy(registry.spawn(Archetype::Tank, Team::One, 1), pos(3, 6))
            .unwrap_err();
        assert!(matches!(err, BattleError::WrongTeamHalf { .. }));

        battle
            .deploy(registry.spawn(Archetype::Tank, Team::One, 1), pos(3, 1))
            .unwrap();
        let err = battle
            .deploy(registry.spawn(Archetype::Tank, Team::One, 1), pos(3, 1))
            .unwrap_err();
        assert!(matches!(err, BattleError::CellNotEmpty(_)));
    }

    #[test]
    fn test_deploy_after_start_rejected() {
        let mut battle = duel(3);
        battle.step();
        let unit = UnitRegistry::new().spawn(Archetype::Tank, Team::One, 1);
        let err = battle.deploy(unit, pos(0, 0)).unwrap_err();
        assert!(matches!(err, BattleError::AlreadyStarted(_)));
    }

    #[test]
    fn test_first_frame_plans_moves() {
        let mut battle = duel(3);
        assert_eq!(battle.step(), None);
        assert_eq!(battle.frame(), 1);
        assert_eq!(battle.events()[0].kind, CombatEventKind::BattleStarted);

        let pending = battle.pending_actions();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|a| a.kind == ActionKind::Move));
        assert!(pending.iter().all(|a| a.resolution_frame == 5));
    }

    #[test]
    fn test_blocked_destination_fails_the_move() {
        let mut battle = duel(3);
        battle.step();
        let mover = UnitId(1);
        let dest = battle
            .pending_actions()
            .iter()
            .find(|a| a.unit == mover)
            .and_then(|a| a.target_cell)
            .unwrap();

        // Wall off the reserved cell behind the planner's back
        assert!(battle.field.grid.release(dest, mover));
        battle.field.grid.set_obstacle(dest).unwrap();

        while battle.frame() < 5 {
            battle.step();
        }
        let failed: Vec<&CombatEvent> = battle
            .events()
            .iter()
            .filter(|e| e.kind == CombatEventKind::FailedMove)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].source, Some(mover));
        assert_eq!(failed[0].frame, 5);

        let unit = battle.unit(mover).unwrap();
        assert_eq!(unit.position(), Some(pos(3, 1)));
        assert_ne!(unit.planned_position(), Some(dest));
        assert_eq!(battle.grid().state(dest), Some(CellState::Obstacle));
        assert!(battle
            .events()
            .iter()
            .all(|e| !(e.kind == CombatEventKind::MoveExecuted && e.source == Some(mover))));
    }

    #[test]
    fn test_duel_finishes_with_a_winner() {
        let mut battle = duel(11);
        let outcome = battle.run();
        assert_eq!(outcome, BattleOutcome::Victory(Team::One));
        assert!(battle.frame() < DEFAULT_MAX_FRAMES);

        let last = battle.events().last().unwrap();
        assert_eq!(last.kind, CombatEventKind::BattleEnded);
        assert_eq!(battle.living_units().count(), 1);
        // Outcome is sticky
        assert_eq!(battle.step(), Some(outcome));
    }

    #[test]
    fn test_frame_cap_compares_health() {
        let mut config = CombatConfig::default();
        config.max_frames = 3;
        let mut registry = UnitRegistry::new();
        let mut battle = Battle::new(config, Some(1)).unwrap();
        battle
            .deploy(registry.spawn(Archetype::Tank, Team::One, 1), pos(0, 0))
            .unwrap();
        battle
            .deploy(registry.spawn(Archetype::Archer, Team::Two, 1), pos(6, 7))
            .unwrap();

        // Nobody reaches anybody in three frames: 150 health beats 70
        assert_eq!(battle.run(), BattleOutcome::Victory(Team::One));
        assert_eq!(battle.frame(), 3);
    }

    #[test]
    fn test_equal_health_at_cap_is_draw() {
        let mut config = CombatConfig::default();
        config.max_frames = 2;
        let mut battle = battle_with(config, 5, (1, 1));
        assert_eq!(battle.run(), BattleOutcome::Draw);
    }

    #[test]
    fn test_same_seed_same_log() {
        let mut a = duel(42);
        let mut b = duel(42);
        a.run();
        b.run();
        assert_eq!(a.events(), b.events());
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_simulate_requires_positions() {
        let mut registry = UnitRegistry::new();
        let placed = registry.spawn(Archetype::Warrior, Team::One, 1).at(pos(3, 1));
        let unplaced = registry.spawn(Archetype::Warrior, Team::One, 1);
        let id = unplaced.id();
        let err = simulate(&CombatConfig::default(), vec![placed], vec![unplaced], Some(1))
            .unwrap_err();
        assert!(matches!(err, BattleError::Unplaced(unit) if unit == id));
    }

    #[test]
    fn test_simulate_reassigns_teams() {
        let mut registry = UnitRegistry::new();
        // Both created as team one; the second roster fights as team two
        let a = registry.spawn(Archetype::Warrior, Team::One, 1).at(pos(3, 1));
        let b = registry.spawn(Archetype::Warrior, Team::One, 2).at(pos(3, 6));
        let report = simulate(&CombatConfig::default(), vec![a], vec![b], Some(9)).unwrap();
        assert_eq!(report.winner(), 2);
        assert_eq!(report.seed, 9);
        assert_eq!(report.events.first().map(|e| e.kind), Some(CombatEventKind::BattleStarted));
    }

    #[test]
    fn test_snapshot_bytes_round_trip() {
        let mut battle = duel(2);
        battle.step();
        let bytes = battle.snapshot_bytes().unwrap();
        let decoded: BattleSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, battle.snapshot());
        assert_eq!(decoded.units.len(), 2);
    }

    #[test]
    fn test_summary() {
        let mut battle = duel(4);
        battle.step();
        let summary = battle.summary();
        assert_eq!(summary.frames, 1);
        assert_eq!(summary.team_one_alive, 1);
        assert_eq!(summary.team_two_alive, 1);
        assert_eq!(summary.pending_actions, 2);
        assert!(summary.to_string().contains("seed 4"));
    }
}
