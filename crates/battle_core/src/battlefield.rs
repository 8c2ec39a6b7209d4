//! Shared battle state: board, units and event log.
//!
//! The battlefield keeps the board and the unit records in sync. A
//! unit's stored position is `Some(pos)` exactly when `pos` is an
//! occupied cell naming that unit. Spells and the engine mutate the
//! world only through these methods.

use std::collections::BTreeMap;

use crate::combat::Damage;
use crate::events::{CombatEvent, CombatEventKind, CombatLog};
use crate::grid::{Grid, GridPos};
use crate::math::Fixed;
use crate::unit::{Team, Unit, UnitId};

/// Board, units and log of one battle.
#[derive(Debug, Clone, Default)]
pub struct Battlefield {
    pub(crate) grid: Grid,
    pub(crate) units: BTreeMap<UnitId, Unit>,
    pub(crate) log: CombatLog,
}

impl Battlefield {
    /// Create a battlefield on `grid` with no units.
    #[must_use]
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            units: BTreeMap::new(),
            log: CombatLog::new(),
        }
    }

    /// The board.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// The event log.
    #[must_use]
    pub const fn log(&self) -> &CombatLog {
        &self.log
    }

    /// Append an event.
    pub fn record(&mut self, event: CombatEvent) {
        self.log.push(event);
    }

    /// Look up a unit, alive or dead.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Mutable unit lookup.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    /// All units in id order, dead ones included.
    pub fn units(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.units.values()
    }

    /// True if the unit exists and has health left.
    #[must_use]
    pub fn is_alive(&self, id: UnitId) -> bool {
        self.units.get(&id).is_some_and(Unit::is_alive)
    }

    /// Living unit standing on `pos`.
    #[must_use]
    pub fn living_occupant(&self, pos: GridPos) -> Option<&Unit> {
        self.grid
            .occupant(pos)
            .and_then(|id| self.units.get(&id))
            .filter(|unit| unit.is_alive())
    }

    /// Ids of living units on `team`, in id order.
    #[must_use]
    pub fn living_members(&self, team: Team) -> Vec<UnitId> {
        self.units
            .values()
            .filter(|unit| unit.team() == team && unit.is_alive())
            .map(Unit::id)
            .collect()
    }

    /// Sum of current health on `team`.
    #[must_use]
    pub fn team_health(&self, team: Team) -> Fixed {
        self.units
            .values()
            .filter(|unit| unit.team() == team && unit.is_alive())
            .map(Unit::health)
            .sum()
    }

    /// Add a unit, occupying its stored position if it has one.
    ///
    /// # Panics
    ///
    /// Panics if the id is already taken or the position is not an empty
    /// cell.
    pub fn insert_unit(&mut self, unit: Unit) {
        assert!(
            !self.units.contains_key(&unit.id()),
            "Unit {} is already on the battlefield",
            unit.id()
        );
        if let Some(pos) = unit.position() {
            self.grid.place(pos, unit.id());
        }
        self.units.insert(unit.id(), unit);
    }

    /// Apply a damage packet to its target and log it.
    ///
    /// Returns the health actually removed; zero if the target is
    /// missing or already dead.
    pub fn deal_damage(&mut self, damage: &Damage) -> Fixed {
        let Some(target_id) = damage.target else {
            return Fixed::ZERO;
        };
        let Some(target) = self.units.get_mut(&target_id) else {
            return Fixed::ZERO;
        };
        if !target.is_alive() {
            return Fixed::ZERO;
        }

        let applied = target.take_damage(damage);
        let position = target.position();
        let health = target.health();

        let spell = damage.spell.clone().unwrap_or_default();
        let mut event = CombatEvent::new(
            damage.frame,
            CombatEventKind::DamageDealt,
            format!(
                "{} hits {target_id} with {spell} for {applied}{} ({health} left)",
                damage
                    .source
                    .map_or_else(|| "environment".to_string(), |id| format!("unit {id}")),
                if damage.crit { " (crit)" } else { "" },
            ),
        )
        .with_target(target_id)
        .with_spell(spell)
        .with_amount(applied)
        .with_crit(damage.crit);
        if let Some(source) = damage.source {
            event = event.with_source(source);
        }
        if let Some(pos) = position {
            event = event.at(pos);
        }
        self.log.push(event);
        applied
    }

    /// Apply a healing packet to its target and log it.
    ///
    /// Returns the health actually restored.
    pub fn apply_heal(&mut self, heal: &Damage) -> Fixed {
        let Some(target_id) = heal.target else {
            return Fixed::ZERO;
        };
        let Some(target) = self.units.get_mut(&target_id) else {
            return Fixed::ZERO;
        };
        if !target.is_alive() {
            return Fixed::ZERO;
        }

        let restored = target.heal(heal);
        let health = target.health();
        let mut event = CombatEvent::new(
            heal.frame,
            CombatEventKind::Healed,
            format!("unit {target_id} heals {restored} ({health} left)"),
        )
        .with_target(target_id)
        .with_amount(restored);
        if let Some(source) = heal.source {
            event = event.with_source(source);
        }
        if let Some(spell) = &heal.spell {
            event = event.with_spell(spell.clone());
        }
        self.log.push(event);
        restored
    }

    /// Move a unit to `to`.
    ///
    /// Succeeds if `to` is empty or reserved by the unit itself. On
    /// success the unit's position is updated and its planned position
    /// cleared. Returns false and changes nothing otherwise.
    pub fn relocate(&mut self, id: UnitId, to: GridPos) -> bool {
        let Some(from) = self.units.get(&id).and_then(Unit::position) else {
            return false;
        };
        if !self.grid.is_valid(to) || !self.grid.relocate(from, to) {
            return false;
        }
        if let Some(unit) = self.units.get_mut(&id) {
            unit.position = Some(to);
            unit.planned_position = None;
        }
        true
    }

    /// Claim `pos` as the unit's move destination.
    ///
    /// # Panics
    ///
    /// Panics if the cell is not empty.
    pub(crate) fn reserve(&mut self, id: UnitId, pos: GridPos) {
        self.grid.reserve(pos, id);
        if let Some(unit) = self.units.get_mut(&id) {
            unit.planned_position = Some(pos);
        }
    }

    /// Drop the unit's reservation, if any.
    pub(crate) fn release_reservation(&mut self, id: UnitId) {
        let Some(unit) = self.units.get_mut(&id) else {
            return;
        };
        if let Some(pos) = unit.planned_position.take() {
            self.grid.release(pos, id);
        }
    }

    /// Take a unit off the board, freeing its cell and reservation.
    ///
    /// The unit record stays, with no position.
    pub(crate) fn remove_from_board(&mut self, id: UnitId) {
        self.release_reservation(id);
        let Some(unit) = self.units.get_mut(&id) else {
            return;
        };
        if let Some(pos) = unit.position.take() {
            if self.grid.occupant(pos) == Some(id) {
                self.grid.remove(pos);
            }
        }
    }
}
