//! Spell contract and the built-in spells.
//!
//! A spell goes through two phases:
//!
//! 1. [`Spell::prepare`] runs at planning time against a read-only view
//!    of the battlefield. It picks a target and reports whether the cast
//!    is valid. An invalid cast costs nothing.
//! 2. [`Spell::execute`] runs when the cast resolves and applies its
//!    effects through the [`Battlefield`].
//!
//! Spells carry per-cast state (the chosen target, growing ranges), so
//! every unit owns its own boxed instance.
//!
//! # Determinism
//!
//! Spells never draw randomness themselves. Any crit roll is made by the
//! engine and passed in through [`CastContext`].

use std::fmt;

use crate::battlefield::Battlefield;
use crate::combat::{Damage, DamageType};
use crate::grid::{GridPos, Metric};
use crate::math::{percent, Fixed};
use crate::unit::{Buff, Unit, UnitId};

/// Pre-rolled crit data for one cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CritRoll {
    /// Crit chance of the caster.
    pub rate: Fixed,
    /// Crit multiplier of the caster.
    pub multiplier: Fixed,
    /// Whether this caster's spells may crit at all.
    pub enabled: bool,
    /// Uniform roll in `[0, 1)`.
    pub roll: Fixed,
}

impl CritRoll {
    /// A roll that never crits.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            rate: Fixed::ZERO,
            multiplier: Fixed::ONE,
            enabled: false,
            roll: Fixed::ONE,
        }
    }

    /// Scale `amount` if the roll crits.
    #[must_use]
    pub fn apply(&self, amount: Fixed) -> (Fixed, bool) {
        if self.enabled && self.roll < self.rate {
            (amount * self.multiplier, true)
        } else {
            (amount, false)
        }
    }
}

/// Everything a spell needs to know about the cast that is resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastContext {
    /// Casting unit.
    pub caster: UnitId,
    /// Current frame.
    pub frame: u32,
    /// Crit roll for this cast.
    pub crit: CritRoll,
}

/// Behaviour shared by all spells.
pub trait Spell: fmt::Debug + Send {
    /// Display name, also used in events.
    fn name(&self) -> &'static str;

    /// Cast time in frames. `None` uses the configured default.
    fn delay(&self) -> Option<u32> {
        None
    }

    /// Ranged spells are only cast once a target is within [`Spell::range`].
    fn is_ranged(&self) -> bool {
        false
    }

    /// Cast range for ranged spells.
    fn range(&self) -> Fixed {
        Fixed::ZERO
    }

    /// Target picked by the last successful [`Spell::prepare`].
    fn target(&self) -> Option<UnitId>;

    /// Pick a target. Returns false if the spell cannot be cast now.
    fn prepare(&mut self, caster: &Unit, field: &Battlefield) -> bool;

    /// Apply the spell's effects.
    fn execute(&mut self, cast: &CastContext, field: &mut Battlefield);

    /// Clone into a new box.
    fn boxed_clone(&self) -> Box<dyn Spell>;
}

impl Clone for Box<dyn Spell> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

fn living_position(field: &Battlefield, id: UnitId) -> Option<GridPos> {
    field
        .unit(id)
        .filter(|unit| unit.is_alive())
        .and_then(Unit::position)
}

fn spell_power(field: &Battlefield, id: UnitId) -> Fixed {
    field.unit(id).map_or(Fixed::ONE, Unit::spell_power)
}

/// Magical bolt at the current target that splashes onto its allies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fireball {
    target: Option<UnitId>,
    damage: Fixed,
    range: Fixed,
}

impl Fireball {
    /// Fireball with 250 base damage and range 5.
    #[must_use]
    pub fn new() -> Self {
        Self {
            target: None,
            damage: Fixed::from_num(250),
            range: Fixed::from_num(5),
        }
    }
}

impl Default for Fireball {
    fn default() -> Self {
        Self::new()
    }
}

impl Spell for Fireball {
    fn name(&self) -> &'static str {
        "Fireball"
    }

    fn delay(&self) -> Option<u32> {
        Some(2)
    }

    fn is_ranged(&self) -> bool {
        true
    }

    fn range(&self) -> Fixed {
        self.range
    }

    fn target(&self) -> Option<UnitId> {
        self.target
    }

    fn prepare(&mut self, caster: &Unit, _field: &Battlefield) -> bool {
        self.target = caster.current_target();
        self.target.is_some()
    }

    fn execute(&mut self, cast: &CastContext, field: &mut Battlefield) {
        let Some(target) = self.target else {
            return;
        };
        let Some(center) = living_position(field, target) else {
            return;
        };
        let Some(team) = field.unit(target).map(Unit::team) else {
            return;
        };

        let (amount, crit) = cast
            .crit
            .apply(self.damage * spell_power(field, cast.caster));
        let hit = |to: UnitId, amount: Fixed| {
            Damage::new(amount, DamageType::Magical, cast.frame)
                .from_source(cast.caster)
                .to_target(to)
                .with_spell(self.name())
                .with_crit(crit)
        };
        field.deal_damage(&hit(target, amount));

        let splashed: Vec<UnitId> = field
            .grid()
            .neighbors(center)
            .into_iter()
            .filter_map(|pos| field.living_occupant(pos))
            .filter(|unit| unit.team() == team && unit.id() != target)
            .map(Unit::id)
            .collect();
        for id in splashed {
            field.deal_damage(&hit(id, amount / Fixed::from_num(2)));
        }
    }

    fn boxed_clone(&self) -> Box<dyn Spell> {
        Box::new(self.clone())
    }
}

/// Physical hit on every adjacent enemy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinSlash {
    target: Option<UnitId>,
    damage: Fixed,
}

impl SpinSlash {
    /// Spin Slash with 100 base damage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            target: None,
            damage: Fixed::from_num(100),
        }
    }
}

impl Default for SpinSlash {
    fn default() -> Self {
        Self::new()
    }
}

impl Spell for SpinSlash {
    fn name(&self) -> &'static str {
        "Spin Slash"
    }

    fn delay(&self) -> Option<u32> {
        Some(2)
    }

    fn target(&self) -> Option<UnitId> {
        self.target
    }

    fn prepare(&mut self, caster: &Unit, _field: &Battlefield) -> bool {
        self.target = Some(caster.id());
        true
    }

    fn execute(&mut self, cast: &CastContext, field: &mut Battlefield) {
        let Some(center) = field.unit(cast.caster).and_then(Unit::position) else {
            return;
        };
        let Some(team) = field.unit(cast.caster).map(Unit::team) else {
            return;
        };

        let (amount, crit) = cast
            .crit
            .apply(self.damage * spell_power(field, cast.caster));
        let victims: Vec<UnitId> = field
            .grid()
            .neighbors(center)
            .into_iter()
            .filter_map(|pos| field.living_occupant(pos))
            .filter(|unit| unit.team() != team)
            .map(Unit::id)
            .collect();
        for id in victims {
            field.deal_damage(
                &Damage::new(amount, DamageType::Physical, cast.frame)
                    .from_source(cast.caster)
                    .to_target(id)
                    .with_spell(self.name())
                    .with_crit(crit),
            );
        }
    }

    fn boxed_clone(&self) -> Box<dyn Spell> {
        Box::new(self.clone())
    }
}

/// Heals the caster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfHeal {
    target: Option<UnitId>,
    amount: Fixed,
}

impl SelfHeal {
    /// Heal for 100 base health.
    #[must_use]
    pub fn new() -> Self {
        Self {
            target: None,
            amount: Fixed::from_num(100),
        }
    }
}

impl Default for SelfHeal {
    fn default() -> Self {
        Self::new()
    }
}

impl Spell for SelfHeal {
    fn name(&self) -> &'static str {
        "Heal"
    }

    fn delay(&self) -> Option<u32> {
        Some(1)
    }

    fn target(&self) -> Option<UnitId> {
        self.target
    }

    fn prepare(&mut self, caster: &Unit, _field: &Battlefield) -> bool {
        self.target = Some(caster.id());
        true
    }

    fn execute(&mut self, cast: &CastContext, field: &mut Battlefield) {
        let amount = self.amount * spell_power(field, cast.caster);
        field.apply_heal(
            &Damage::heal(amount, cast.frame)
                .from_source(cast.caster)
                .to_target(cast.caster)
                .with_spell(self.name()),
        );
    }

    fn boxed_clone(&self) -> Box<dyn Spell> {
        Box::new(self.clone())
    }
}

/// Teleports next to the weakest enemy in reach and strikes it.
///
/// Reach grows by one cell after every cast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssassinBlink {
    target: Option<UnitId>,
    damage: Fixed,
    range: u32,
}

impl AssassinBlink {
    /// Blink with 100 base damage and a reach of 3 steps.
    #[must_use]
    pub fn new() -> Self {
        Self {
            target: None,
            damage: Fixed::from_num(100),
            range: 3,
        }
    }

    /// Landing cells around `target`, furthest from `from` first.
    fn landing_cells(field: &Battlefield, from: GridPos, target: GridPos) -> Vec<GridPos> {
        let grid = field.grid();
        let usable = |pos: &GridPos| {
            *pos == from || grid.cell(*pos).is_some_and(|cell| cell.is_empty())
        };

        let mut cells: Vec<GridPos> = grid.neighbors(target).into_iter().filter(usable).collect();
        if cells.is_empty() {
            cells = grid
                .cells_within(target, Fixed::from_num(2), Metric::Steps)
                .into_iter()
                .filter(|pos| *pos != target)
                .filter(usable)
                .collect();
        }
        // Stable sort keeps neighbour order among equal distances.
        cells.sort_by(|a, b| grid.l1_distance(from, *b).cmp(&grid.l1_distance(from, *a)));
        cells
    }
}

impl Default for AssassinBlink {
    fn default() -> Self {
        Self::new()
    }
}

impl Spell for AssassinBlink {
    fn name(&self) -> &'static str {
        "Assassin Blink"
    }

    fn delay(&self) -> Option<u32> {
        Some(3)
    }

    fn is_ranged(&self) -> bool {
        true
    }

    fn range(&self) -> Fixed {
        Fixed::from_num(self.range)
    }

    fn target(&self) -> Option<UnitId> {
        self.target
    }

    fn prepare(&mut self, caster: &Unit, field: &Battlefield) -> bool {
        self.target = None;
        let Some(origin) = caster.position() else {
            return false;
        };

        let mut weakest: Option<&Unit> = None;
        for pos in field
            .grid()
            .cells_within(origin, self.range(), Metric::Steps)
        {
            let Some(unit) = field.living_occupant(pos) else {
                continue;
            };
            if unit.team() == caster.team() {
                continue;
            }
            if weakest.map_or(true, |best| unit.health() < best.health()) {
                weakest = Some(unit);
            }
        }

        self.target = weakest.map(Unit::id);
        self.target.is_some()
    }

    fn execute(&mut self, cast: &CastContext, field: &mut Battlefield) {
        self.strike(cast, field);
        self.range += 1;
    }

    fn boxed_clone(&self) -> Box<dyn Spell> {
        Box::new(self.clone())
    }
}

impl AssassinBlink {
    fn strike(&self, cast: &CastContext, field: &mut Battlefield) {
        let Some(target) = self.target else {
            return;
        };
        let Some(target_pos) = living_position(field, target) else {
            return;
        };
        // Relocation is best-effort: a boxed-in target is struck from afar.
        if let Some(from) = field.unit(cast.caster).and_then(Unit::position) {
            let landed = Self::landing_cells(field, from, target_pos)
                .into_iter()
                .any(|cell| field.relocate(cast.caster, cell));
            if !landed {
                tracing::trace!(caster = cast.caster.0, "No landing cell for blink");
            }
        }

        let amount = self.damage * spell_power(field, cast.caster);
        field.deal_damage(
            &Damage::new(amount, DamageType::Physical, cast.frame)
                .from_source(cast.caster)
                .to_target(target)
                .with_spell(self.name()),
        );
        if let Some(caster) = field.unit_mut(cast.caster) {
            caster.current_target = Some(target);
        }
    }
}

/// Raises the caster's attack speed by a quarter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackSpeedBuff {
    target: Option<UnitId>,
    amount: Fixed,
}

impl AttackSpeedBuff {
    /// +25% attack speed per cast.
    #[must_use]
    pub fn new() -> Self {
        Self {
            target: None,
            amount: percent(25),
        }
    }
}

impl Default for AttackSpeedBuff {
    fn default() -> Self {
        Self::new()
    }
}

impl Spell for AttackSpeedBuff {
    fn name(&self) -> &'static str {
        "Attack Speed Buff"
    }

    fn delay(&self) -> Option<u32> {
        Some(1)
    }

    fn target(&self) -> Option<UnitId> {
        self.target
    }

    fn prepare(&mut self, caster: &Unit, _field: &Battlefield) -> bool {
        self.target = Some(caster.id());
        true
    }

    fn execute(&mut self, cast: &CastContext, field: &mut Battlefield) {
        if let Some(caster) = field.unit_mut(cast.caster).filter(|unit| unit.is_alive()) {
            caster.add_buff(Buff::AttackSpeed, self.amount);
        }
    }

    fn boxed_clone(&self) -> Box<dyn Spell> {
        Box::new(self.clone())
    }
}
